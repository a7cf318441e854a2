use crate::db::models::User;
use crate::error::AppError;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    pub username: String,
    pub email: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Unauthorized("malformed subject claim".to_string()))
    }
}

/// HS256 signing material for session tokens
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Issue a session token for `user`
    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            exp: now + self.ttl_secs as i64,
            iat: now,
            username: user.username.clone(),
            email: user.email.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Validate signature and expiry
    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AccountType, ServiceTokenMap};

    fn user() -> User {
        User {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: None,
            services: ServiceTokenMap::new(),
            friends: vec![],
            account_type: AccountType::Default,
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let keys = JwtKeys::new("secret", 3600);
        let token = keys.issue(&user()).unwrap();

        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtKeys::new("secret", 3600).issue(&user()).unwrap();
        let result = JwtKeys::new("other", 3600).validate(&token);
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = JwtKeys::new("secret", 0);
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "42".to_string(),
            exp: now - 3600,
            iat: now - 7200,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();

        assert!(matches!(
            keys.validate(&token),
            Err(AppError::Unauthorized(_))
        ));
    }
}
