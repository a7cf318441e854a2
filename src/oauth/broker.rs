use crate::config::Config;
use crate::db::models::{Service, TokenBundle};
use crate::db::store::UserStore;
use crate::error::AppError;
use crate::oauth::state::{OAuthState, StateSigner};
use chrono::{DateTime, Utc};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
    reqwest::async_http_client,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Authorization-code and refresh-token grants against the third-party
/// providers registered as services.
pub struct OAuthBroker {
    users: Arc<dyn UserStore>,
    signer: StateSigner,
    redirect_uri: String,
    /// Provider refresh endpoints keyed by lowercase service name
    refresh_endpoints: HashMap<String, String>,
    timeout: Duration,
}

impl OAuthBroker {
    pub fn new(config: &Config, users: Arc<dyn UserStore>) -> Self {
        let refresh_endpoints =
            HashMap::from([("spotify".to_string(), config.spotify_token_url.clone())]);

        Self {
            users,
            signer: StateSigner::new(config.state_secret()),
            redirect_uri: config.oauth_redirect_uri.clone(),
            refresh_endpoints,
            timeout: config.http_timeout(),
        }
    }

    /// Build the provider consent URL for `user_id`
    ///
    /// The `state` parameter carries a signed `(service_id, user_id)` pair so
    /// the callback can be correlated without a session store.
    pub fn authorization_url(&self, service: &Service, user_id: i64) -> Result<String, AppError> {
        let state = self.signer.sign(OAuthState {
            service_id: service.id,
            user_id,
        })?;

        let client = self.client(service, &service.token_url)?;
        let mut request = client.authorize_url(move || CsrfToken::new(state));
        if !service.scope.is_empty() {
            request = request.add_scope(Scope::new(service.scope.clone()));
        }
        let (url, _) = request.url();

        Ok(url.to_string())
    }

    pub fn verify_state(&self, raw: &str) -> Result<OAuthState, AppError> {
        self.signer.verify(raw)
    }

    /// Exchange an authorization code at `service.token_url`
    ///
    /// # Errors
    /// `OAuthExchangeFailed` when the provider answers with an error body,
    /// an unparseable body, or not at all within the timeout.
    pub async fn exchange_code(
        &self,
        service: &Service,
        code: &str,
    ) -> Result<TokenBundle, AppError> {
        tracing::info!(
            service_id = service.id,
            service = %service.name,
            "Exchanging authorization code"
        );

        let client = self.client(service, &service.token_url)?;
        let request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .add_extra_param("scope", service.scope.as_str())
            .request_async(async_http_client);

        let token = self.bounded(request).await.inspect_err(|e| {
            tracing::warn!(service_id = service.id, error = %e, "Code exchange failed");
        })?;

        Ok(TokenBundle {
            access_token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|t| t.secret().to_string()),
            expires_at: token.expires_in().and_then(expiry_after),
            service_id: Some(service.id),
        })
    }

    /// Exchange the code and store the bundle under `service.name`,
    /// replacing any previous one. Nothing is written when the exchange fails.
    pub async fn connect(
        &self,
        service: &Service,
        user_id: i64,
        code: &str,
    ) -> Result<TokenBundle, AppError> {
        let bundle = self.exchange_code(service, code).await?;

        if !self
            .users
            .set_service_tokens(user_id, &service.name, &bundle)
            .await?
        {
            return Err(AppError::NotFound("User"));
        }

        tracing::info!(
            user_id,
            service_id = service.id,
            service = %service.name,
            "Connected service"
        );

        Ok(bundle)
    }

    /// Trade a refresh token for a fresh access token.
    ///
    /// Known providers are refreshed at their own endpoint; anything else
    /// falls back to the registration's `token_url`.
    pub async fn refresh_access_token(
        &self,
        service: &Service,
        refresh_token: &str,
    ) -> Result<String, AppError> {
        let endpoint = self.refresh_endpoint(service);
        tracing::debug!(service_id = service.id, endpoint, "Refreshing access token");

        let client = self.client(service, endpoint)?;
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let request = client
            .exchange_refresh_token(&refresh_token)
            .request_async(async_http_client);

        let token = self.bounded(request).await.inspect_err(|e| {
            tracing::warn!(service_id = service.id, error = %e, "Token refresh failed");
        })?;

        Ok(token.access_token().secret().to_string())
    }

    fn refresh_endpoint<'a>(&'a self, service: &'a Service) -> &'a str {
        self.refresh_endpoints
            .get(&service.name.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&service.token_url)
    }

    fn client(&self, service: &Service, token_url: &str) -> Result<BasicClient, AppError> {
        let auth_url = AuthUrl::new(service.auth_url.clone())
            .map_err(|e| AppError::unprocessable(format!("Invalid auth_url: {}", e)))?;
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|e| AppError::unprocessable(format!("Invalid token_url: {}", e)))?;
        let redirect_url = RedirectUrl::new(self.redirect_uri.clone())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid redirect URI: {}", e)))?;

        Ok(BasicClient::new(
            ClientId::new(service.client_id.clone()),
            Some(ClientSecret::new(service.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(redirect_url))
    }

    async fn bounded<F, RE>(&self, request: F) -> Result<BasicTokenResponse, AppError>
    where
        F: Future<Output = Result<BasicTokenResponse, RequestTokenError<RE, BasicErrorResponse>>>,
        RE: std::error::Error + 'static,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(RequestTokenError::ServerResponse(response))) => {
                Err(AppError::OAuthExchangeFailed(response.to_string()))
            }
            Ok(Err(e)) => Err(AppError::OAuthExchangeFailed(e.to_string())),
            Err(_) => Err(AppError::OAuthExchangeFailed(format!(
                "token endpoint did not answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Absolute expiry for a provider `expires_in`; `None` when it does not fit a
/// timestamp
fn expiry_after(expires_in: Duration) -> Option<DateTime<Utc>> {
    let seconds = chrono::Duration::try_seconds(i64::try_from(expires_in.as_secs()).ok()?)?;
    Utc::now().checked_add_signed(seconds)
}
