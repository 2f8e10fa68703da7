//! PgAuthBackend against live PostgreSQL and Redis instances
//!
//! Ignored by default; run with `cargo test -- --ignored` once `DATABASE_URL`
//! and `REDIS_URL` point at disposable services.

use auth::{JwtConfig, JwtService, PgAuthBackend, RateLimiter, RateLimiterConfig};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, init_pool},
};
use crm::{
    backend::{AuthBackend, AuthError, AuthEvent, postgres::migrate},
    models::Registration,
};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

async fn backend() -> PgAuthBackend {
    let pool = init_pool(&DatabaseConfig::from_env().expect("database config"))
        .await
        .expect("pool");
    migrate(&pool).await.expect("migrations");
    let redis_pool = RedisPool::new(&RedisConfig::from_env().expect("redis config"))
        .await
        .expect("redis");
    let jwt = JwtService::new(JwtConfig::hs256("integration-secret")).expect("jwt");
    PgAuthBackend::new(pool, redis_pool, jwt)
}

fn registration() -> Registration {
    Registration {
        email: format!("user-{}@example.com", Uuid::new_v4()),
        password: "Secret123".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        organization_name: None,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_sign_up_sign_in_and_resolve_user() {
    let backend = backend().await;
    let registration = registration();

    let session = assert_ok!(backend.sign_up(&registration).await).expect("session");
    assert_eq!(session.user.email, registration.email);
    assert!(session.user.email_confirmed);
    assert_eq!(session.user.metadata.first_name.as_deref(), Some("Ada"));

    let signed_in = assert_ok!(backend.sign_in(&registration.email, "Secret123").await);
    let user = assert_ok!(backend.get_user(&signed_in.access_token).await);
    assert_eq!(user.id, session.user.id);

    let duplicate = backend.sign_up(&registration).await;
    assert!(matches!(duplicate, Err(AuthError::EmailTaken(_))));
}

#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_refresh_rotates_and_revokes() {
    let backend = backend().await;
    let mut events = backend.subscribe();
    let session = assert_ok!(backend.sign_up(&registration()).await).expect("session");

    let refreshed = assert_ok!(backend.refresh(&session.refresh_token).await);
    assert_ne!(refreshed.refresh_token, session.refresh_token);
    assert!(matches!(events.recv().await, Ok(AuthEvent::TokenRefreshed(_))));

    let reused = backend.refresh(&session.refresh_token).await;
    assert_eq!(reused.unwrap_err(), AuthError::InvalidToken);

    let wrong_type = backend.refresh(&refreshed.access_token).await;
    assert_eq!(wrong_type.unwrap_err(), AuthError::InvalidToken);
}

#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_sign_out_revokes_credentials() {
    let backend = backend().await;
    let mut events = backend.subscribe();
    let session = assert_ok!(backend.sign_up(&registration()).await).expect("session");

    assert_ok!(backend.sign_out(&session).await);
    match events.recv().await {
        Ok(AuthEvent::SignedOut { user_id }) => assert_eq!(user_id, session.user.id),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(
        backend.get_user(&session.access_token).await.unwrap_err(),
        AuthError::InvalidToken
    );
    assert_err!(backend.refresh(&session.refresh_token).await);
}

#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_confirmation_and_rate_limit() {
    let backend = backend()
        .await
        .requiring_confirmation()
        .with_rate_limiter(RateLimiter::new(RateLimiterConfig {
            max_attempts: 2,
            window_seconds: 300,
            ban_duration_seconds: 3600,
        }));
    let registration = registration();

    assert!(assert_ok!(backend.sign_up(&registration).await).is_none());
    assert!(matches!(
        backend.sign_in(&registration.email, "Secret123").await,
        Err(AuthError::Validation(_))
    ));

    assert_ok!(backend.confirm_email(&registration.email).await);
    assert_ok!(backend.sign_in(&registration.email, "Secret123").await);

    for _ in 0..2 {
        assert_eq!(
            backend.sign_in(&registration.email, "wrong").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }
    assert_eq!(
        backend.sign_in(&registration.email, "Secret123").await.unwrap_err(),
        AuthError::RateLimited
    );
}
