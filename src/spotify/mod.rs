//! Spotify-backed triggers and actions.

pub mod automations;
pub mod client;
pub mod parser;

use crate::db::models::{ServiceTokenMap, TokenBundle};
use crate::db::store::ServiceStore;
use crate::error::AppError;
use crate::oauth::OAuthBroker;
use client::SpotifyClient;
use std::sync::Arc;

/// Key of the Spotify entry in a user's connected-service map
pub const SERVICE_NAME: &str = "spotify";

/// Player API access on behalf of a user, refreshing the access token
/// through the broker before every call
pub struct SpotifyIntegration {
    broker: Arc<OAuthBroker>,
    services: Arc<dyn ServiceStore>,
    api: SpotifyClient,
}

impl SpotifyIntegration {
    pub fn new(
        broker: Arc<OAuthBroker>,
        services: Arc<dyn ServiceStore>,
        api: SpotifyClient,
    ) -> Self {
        Self {
            broker,
            services,
            api,
        }
    }

    pub async fn is_playing(&self, tokens: &ServiceTokenMap) -> Result<bool, AppError> {
        let access_token = self.access_token(tokens).await?;
        self.api.is_playing(&access_token).await
    }

    pub async fn play(
        &self,
        tokens: &ServiceTokenMap,
        track_uri: Option<&str>,
    ) -> Result<(), AppError> {
        let access_token = self.access_token(tokens).await?;
        self.api.play(&access_token, track_uri).await
    }

    pub async fn queue(&self, tokens: &ServiceTokenMap, track_uri: &str) -> Result<(), AppError> {
        let access_token = self.access_token(tokens).await?;
        self.api.queue(&access_token, track_uri).await
    }

    /// Exchange the stored refresh token for a fresh access token
    ///
    /// # Errors
    /// - `ProviderApi` if Spotify is not connected or the bundle cannot be
    ///   refreshed
    /// - `NotFound` if the service registration was deleted
    /// - `OAuthExchangeFailed` if the provider rejects the refresh token
    async fn access_token(&self, tokens: &ServiceTokenMap) -> Result<String, AppError> {
        let bundle = connection(tokens)
            .ok_or_else(|| AppError::ProviderApi("Spotify is not connected".to_string()))?;

        let service_id = bundle.service_id.ok_or_else(|| {
            AppError::ProviderApi("Spotify connection has no service registration".to_string())
        })?;
        let refresh_token = bundle.refresh_token.as_deref().ok_or_else(|| {
            AppError::ProviderApi("Spotify connection has no refresh token".to_string())
        })?;

        let service = self
            .services
            .find(service_id)
            .await?
            .ok_or(AppError::NotFound("Service"))?;

        self.broker.refresh_access_token(&service, refresh_token).await
    }
}

/// The Spotify bundle, matching the service name case-insensitively
fn connection(tokens: &ServiceTokenMap) -> Option<&TokenBundle> {
    tokens
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(SERVICE_NAME))
        .map(|(_, bundle)| bundle)
}
