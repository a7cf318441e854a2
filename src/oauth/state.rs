use crate::error::AppError;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed `state` stays acceptable on the callback
pub const STATE_TTL_SECS: i64 = 10 * 60;

/// Identity carried through the provider round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OAuthState {
    pub service_id: i64,
    pub user_id: i64,
}

/// Signs and verifies the OAuth `state` parameter.
///
/// Format: `{service_id},{user_id},{issued_at},{nonce},{signature}` where the
/// signature is hex HMAC-SHA256 over the first four comma-joined fields.
#[derive(Clone)]
pub struct StateSigner {
    secret: Vec<u8>,
}

impl StateSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn sign(&self, state: OAuthState) -> Result<String, AppError> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.sign_with(state, Utc::now().timestamp(), &URL_SAFE_NO_PAD.encode(nonce))
    }

    fn sign_with(
        &self,
        state: OAuthState,
        issued_at: i64,
        nonce: &str,
    ) -> Result<String, AppError> {
        let payload = format!(
            "{},{},{},{}",
            state.service_id, state.user_id, issued_at, nonce
        );
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{},{}", payload, signature))
    }

    /// Verify a `state` string echoed back by the provider
    ///
    /// # Errors
    /// - `OAuthStateInvalid` if the string is malformed or the signature does
    ///   not match
    /// - `OAuthStateExpired` if it was issued more than ten minutes ago
    pub fn verify(&self, raw: &str) -> Result<OAuthState, AppError> {
        self.verify_at(raw, Utc::now().timestamp())
    }

    fn verify_at(&self, raw: &str, now: i64) -> Result<OAuthState, AppError> {
        let (payload, signature) = raw
            .rsplit_once(',')
            .ok_or_else(|| AppError::OAuthStateInvalid("missing signature".to_string()))?;

        let signature = hex::decode(signature)
            .map_err(|_| AppError::OAuthStateInvalid("signature is not hex".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature).map_err(|_| {
            tracing::warn!("OAuth state signature mismatch");
            AppError::OAuthStateInvalid("signature does not match".to_string())
        })?;

        let fields: Vec<&str> = payload.split(',').collect();
        let &[service_id, user_id, issued_at, _nonce] = fields.as_slice() else {
            return Err(AppError::OAuthStateInvalid(format!(
                "expected 4 fields, got {}",
                fields.len()
            )));
        };

        let parse = |field: &str, name: &str| {
            field
                .parse::<i64>()
                .map_err(|_| AppError::OAuthStateInvalid(format!("{} is not a number", name)))
        };
        let service_id = parse(service_id, "service_id")?;
        let user_id = parse(user_id, "user_id")?;
        let issued_at = parse(issued_at, "issued_at")?;

        if now - issued_at > STATE_TTL_SECS || issued_at - now > 60 {
            return Err(AppError::OAuthStateExpired);
        }

        Ok(OAuthState {
            service_id,
            user_id,
        })
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid state key: {}", e)))
    }
}
