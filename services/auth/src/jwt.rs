//! JWT service for token generation, validation, and revocation
//!
//! Access and refresh credentials are signed JWTs. Production keys are RS256
//! key pairs; a shared HS256 secret is accepted for development and tests.
//! Revoked tokens are remembered in Redis by their `jti` until they would have
//! expired anyway.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use common::cache::RedisPool;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::info;
use uuid::Uuid;

use crate::models::User;

/// Key material used to sign and verify tokens
#[derive(Clone)]
pub enum SigningKeys {
    /// RS256 key pair in PEM format
    Rsa {
        private_key: String,
        public_key: String,
    },
    /// HS256 shared secret
    Shared(String),
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKeys::Rsa { .. } => f.write_str("Rsa(<redacted>)"),
            SigningKeys::Shared(_) => f.write_str("Shared(<redacted>)"),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub keys: SigningKeys,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

/// Read a PEM value, or the file it names (relative to the CWD, then the crate)
fn read_key(var: &str) -> Result<String> {
    let value =
        std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?;
    if value.starts_with("-----BEGIN") {
        return Ok(value);
    }

    let pem = std::fs::read_to_string(&value)
        .or_else(|_| {
            let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            path.push(&value);
            std::fs::read_to_string(path)
        })
        .map_err(|e| anyhow::anyhow!("Failed to read {} file: {}", var, e))?;
    Ok(pem.trim().to_string())
}

fn expiry_from_env(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY`: Private key for signing tokens (PEM format) or path to private key file
    /// - `JWT_PUBLIC_KEY`: Public key for verifying tokens (PEM format) or path to public key file
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        Ok(JwtConfig {
            keys: SigningKeys::Rsa {
                private_key: read_key("JWT_PRIVATE_KEY")?,
                public_key: read_key("JWT_PUBLIC_KEY")?,
            },
            access_token_expiry: expiry_from_env("JWT_ACCESS_TOKEN_EXPIRY", 900),
            refresh_token_expiry: expiry_from_env("JWT_REFRESH_TOKEN_EXPIRY", 604_800),
        })
    }

    /// Shared-secret configuration with the default expiries
    pub fn hs256(secret: impl Into<String>) -> Self {
        JwtConfig {
            keys: SigningKeys::Shared(secret.into()),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        }
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub email: String,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token ID, the revocation key
    pub jti: Uuid,
    pub token_type: TokenType,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.exp).unwrap_or(i64::MAX);
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Seconds until expiry, zero once expired
    pub fn remaining_secs(&self) -> u64 {
        self.exp.saturating_sub(unix_now())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A signed token together with its claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

fn revocation_key(jti: Uuid) -> String {
    format!("revoked_token:{}", jti)
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let (algorithm, encoding_key, decoding_key) = match &config.keys {
            SigningKeys::Rsa {
                private_key,
                public_key,
            } => (
                Algorithm::RS256,
                EncodingKey::from_rsa_pem(private_key.as_bytes())?,
                DecodingKey::from_rsa_pem(public_key.as_bytes())?,
            ),
            SigningKeys::Shared(secret) => (
                Algorithm::HS256,
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(JwtService {
            encoding_key,
            decoding_key,
            header: Header::new(algorithm),
            validation,
            config,
        })
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(encode(&self.header, claims, &self.encoding_key)?)
    }

    fn issue(&self, user: &User, token_type: TokenType, lifetime: u64) -> Result<IssuedToken> {
        let now = unix_now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            iat: now,
            exp: now + lifetime,
            jti: Uuid::new_v4(),
            token_type,
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            claims,
        })
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> Result<IssuedToken> {
        self.issue(user, TokenType::Access, self.config.access_token_expiry)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user: &User) -> Result<IssuedToken> {
        self.issue(user, TokenType::Refresh, self.config.refresh_token_expiry)
    }

    /// Validate signature and expiry of a token and return the claims
    pub fn validate_token(&self, token: &str) -> errors::Result<Claims> {
        Ok(decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims)
    }

    /// Validate the signature only; used to revoke tokens that already expired
    pub fn inspect_token(&self, token: &str) -> errors::Result<Claims> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Check if a token has been revoked
    pub async fn is_token_revoked(&self, redis_pool: &RedisPool, claims: &Claims) -> Result<bool> {
        redis_pool.exists(&revocation_key(claims.jti)).await
    }

    /// Revoke a token for the rest of its lifetime
    pub async fn revoke_token(&self, redis_pool: &RedisPool, claims: &Claims) -> Result<()> {
        let remaining = claims.remaining_secs();
        if remaining == 0 {
            return Ok(());
        }
        info!("Revoking {:?} token {} of user {}", claims.token_type, claims.jti, claims.sub);
        redis_pool
            .set(&revocation_key(claims.jti), "1", Some(remaining))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm::models::UserMetadata;
    use jsonwebtoken::errors::ErrorKind;
    use serial_test::serial;

    fn service() -> JwtService {
        JwtService::new(JwtConfig::hs256("test-secret")).expect("service")
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: String::new(),
            metadata: UserMetadata::default(),
            email_confirmed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service();
        let user = user();
        let issued = service.generate_access_token(&user).expect("token");

        let claims = service.validate_token(&issued.token).expect("valid");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, issued.claims.jti);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_tokens_are_unique() {
        let service = service();
        let user = user();
        let first = service.generate_refresh_token(&user).expect("token");
        let second = service.generate_refresh_token(&user).expect("token");
        assert_ne!(first.token, second.token);
        assert_ne!(first.claims.jti, second.claims.jti);
    }

    #[test]
    fn test_expired_token_is_rejected_but_inspectable() {
        let service = service();
        let mut claims = service.generate_access_token(&user()).expect("token").claims;
        claims.exp = unix_now() - 10;
        let token = service.sign(&claims).expect("sign");

        let err = service.validate_token(&token).expect_err("expired");
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
        assert_eq!(service.inspect_token(&token).expect("inspect").jti, claims.jti);
        assert_eq!(claims.remaining_secs(), 0);
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let issued = service().generate_access_token(&user()).expect("token");
        let other = JwtService::new(JwtConfig::hs256("other-secret")).expect("service");
        assert!(other.validate_token(&issued.token).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_requires_keys() {
        unsafe {
            std::env::remove_var("JWT_PRIVATE_KEY");
            std::env::remove_var("JWT_PUBLIC_KEY");
        }
        assert!(JwtConfig::from_env().is_err());
    }
}
