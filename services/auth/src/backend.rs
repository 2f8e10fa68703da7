//! PostgreSQL + Redis implementation of the CRM auth backend
//!
//! Users live in the `users` table with Argon2 password hashes. Sessions are
//! pairs of signed JWTs; revoked tokens are tracked in Redis. Sign-out and
//! refresh are broadcast to every subscriber so other clients sharing this
//! backend observe them.

use async_trait::async_trait;
use common::cache::RedisPool;
use crm::{
    backend::{AuthBackend, AuthError, AuthEvent},
    models::{AuthSession, AuthUser, Registration},
};
use jsonwebtoken::errors::ErrorKind;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    jwt::{Claims, JwtService, TokenType},
    models::{NewUser, User},
    rate_limiter::RateLimiter,
    repositories::UserRepository,
    validation::validate_registration,
};

const EVENT_CAPACITY: usize = 64;

fn backend_error(err: impl std::fmt::Display) -> AuthError {
    AuthError::Backend(err.to_string())
}

/// Auth backend storing users in PostgreSQL
#[derive(Clone)]
pub struct PgAuthBackend {
    users: UserRepository,
    jwt: JwtService,
    redis_pool: RedisPool,
    rate_limiter: RateLimiter,
    require_confirmation: bool,
    events: broadcast::Sender<AuthEvent>,
}

impl PgAuthBackend {
    pub fn new(pool: PgPool, redis_pool: RedisPool, jwt: JwtService) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            users: UserRepository::new(pool),
            jwt,
            redis_pool,
            rate_limiter: RateLimiter::default(),
            require_confirmation: false,
            events,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Withhold sessions from new users until their email is confirmed
    pub fn requiring_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Mark an email address as confirmed
    pub async fn confirm_email(&self, email: &str) -> Result<AuthUser, AuthError> {
        self.users
            .confirm_email(&email.to_lowercase())
            .await
            .map_err(backend_error)?
            .map(|user| user.to_auth_user())
            .ok_or(AuthError::InvalidCredentials)
    }

    fn issue_session(&self, user: &User) -> Result<AuthSession, AuthError> {
        let access = self.jwt.generate_access_token(user).map_err(backend_error)?;
        let refresh = self
            .jwt
            .generate_refresh_token(user)
            .map_err(backend_error)?;

        Ok(AuthSession {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.claims.expires_at(),
            user: user.to_auth_user(),
        })
    }

    fn notify(&self, event: AuthEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    async fn ensure_not_revoked(&self, claims: &Claims) -> Result<(), AuthError> {
        let revoked = self
            .jwt
            .is_token_revoked(&self.redis_pool, claims)
            .await
            .map_err(backend_error)?;
        if revoked {
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }

    async fn user_for(&self, claims: &Claims) -> Result<User, AuthError> {
        self.users
            .find_by_id(claims.sub)
            .await
            .map_err(backend_error)?
            .ok_or(AuthError::InvalidToken)
    }
}

#[async_trait]
impl AuthBackend for PgAuthBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = email.trim().to_lowercase();
        if !self.rate_limiter.is_allowed(&email).await {
            warn!("Sign-in rate limited for {}", email);
            return Err(AuthError::RateLimited);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(backend_error)?;
        let verified = match &user {
            Some(user) => self
                .users
                .verify_password(user, password)
                .map_err(backend_error)?,
            None => false,
        };
        let user = match user {
            Some(user) if verified => user,
            _ => {
                self.rate_limiter.record_failure(&email).await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if self.require_confirmation && !user.email_confirmed() {
            return Err(AuthError::Validation("Email not confirmed".to_string()));
        }

        self.rate_limiter.reset(&email).await;
        info!("User {} signed in", user.id);
        self.issue_session(&user)
    }

    async fn sign_up(&self, registration: &Registration) -> Result<Option<AuthSession>, AuthError> {
        validate_registration(registration).map_err(AuthError::Validation)?;

        let email = registration.email.trim().to_lowercase();
        let new_user = NewUser {
            email: email.clone(),
            password: registration.password.clone(),
            metadata: registration.metadata(),
            email_confirmed: !self.require_confirmation,
        };
        let user = self
            .users
            .create(&new_user)
            .await
            .map_err(backend_error)?
            .ok_or(AuthError::EmailTaken(email))?;

        if self.require_confirmation {
            info!("User {} registered, awaiting confirmation", user.id);
            return Ok(None);
        }
        self.issue_session(&user).map(Some)
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        for token in [&session.access_token, &session.refresh_token] {
            let claims = self
                .jwt
                .inspect_token(token)
                .map_err(|_| AuthError::InvalidToken)?;
            self.jwt
                .revoke_token(&self.redis_pool, &claims)
                .await
                .map_err(backend_error)?;
        }

        info!("User {} signed out", session.user.id);
        self.notify(AuthEvent::SignedOut {
            user_id: session.user.id,
        });
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        let claims = self
            .jwt
            .validate_token(refresh_token)
            .map_err(|_| AuthError::InvalidToken)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidToken);
        }
        self.ensure_not_revoked(&claims).await?;

        let user = self.user_for(&claims).await?;
        self.jwt
            .revoke_token(&self.redis_pool, &claims)
            .await
            .map_err(backend_error)?;

        let session = self.issue_session(&user)?;
        self.notify(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let claims = self
            .jwt
            .validate_token(access_token)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidToken);
        }
        self.ensure_not_revoked(&claims).await?;

        Ok(self.user_for(&claims).await?.to_auth_user())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
