use arcus::{
    models::{generate_activation_token, hash_plaintext, NewUser, NotificationCommand},
    queue::{MemoryQueue, MessageQueue, QueueError},
    repositories::{SqliteTokenRepository, SqliteUserRepository, TokenRepository, UserRepository},
    services::{
        ActivationError, ActivationService, NotificationPublisher, PublishError,
        QueueNotificationPublisher, WELCOME_EMAIL_QUEUE,
    },
    test_utils::test_helpers,
};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    pool: SqlitePool,
    queue: Arc<MemoryQueue>,
    service: ActivationService,
}

async fn harness() -> Harness {
    let pool = test_helpers::create_test_db().await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let publisher = QueueNotificationPublisher::new(queue.clone()).await.unwrap();
    let service = service_with_publisher(&pool, Arc::new(publisher));

    Harness {
        pool,
        queue,
        service,
    }
}

fn service_with_publisher(
    pool: &SqlitePool,
    publisher: Arc<dyn NotificationPublisher>,
) -> ActivationService {
    ActivationService::new(
        Arc::new(SqliteUserRepository::new(pool.clone())),
        Arc::new(SqliteTokenRepository::new(pool.clone())),
        publisher,
        test_helpers::fast_password_hashing(),
        Duration::from_secs(2 * 60 * 60),
    )
    .unwrap()
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        name: "Ada Lovelace".to_string(),
        email: email.to_string(),
        password: "password123".to_string(),
    }
}

/// Pops the next welcome email command and returns the token it carries.
async fn next_welcome_token(queue: &MemoryQueue) -> String {
    let delivery = queue
        .next_delivery(WELCOME_EMAIL_QUEUE)
        .await
        .unwrap()
        .expect("a welcome email command to be queued");
    queue
        .ack(WELCOME_EMAIL_QUEUE, delivery.delivery_id)
        .await
        .unwrap();

    let command: NotificationCommand = serde_json::from_slice(&delivery.body).unwrap();
    command.template_data["token"]
        .as_str()
        .expect("token in template data")
        .to_string()
}

async fn is_activated(pool: &SqlitePool, user_id: i64) -> bool {
    SqliteUserRepository::new(pool.clone())
        .find_by_id(user_id)
        .await
        .unwrap()
        .activated
}

struct FailingPublisher;

#[async_trait]
impl NotificationPublisher for FailingPublisher {
    async fn publish(&self, _command: &NotificationCommand) -> Result<(), PublishError> {
        Err(PublishError::Queue(QueueError::NotDeclared(
            WELCOME_EMAIL_QUEUE.to_string(),
        )))
    }
}

#[tokio::test]
async fn test_register_creates_inactive_user() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    assert!(user_id > 0);

    let user = SqliteUserRepository::new(h.pool.clone())
        .find_by_id(user_id)
        .await
        .unwrap();
    assert_eq!(user.name, "Ada Lovelace");
    assert_eq!(user.email, "ada@example.com");
    assert!(!user.activated);
    assert_ne!(user.password_hash, "password123");
    let parsed = PasswordHash::new(&user.password_hash).unwrap();
    assert_eq!(parsed.algorithm, argon2::ARGON2ID_IDENT);
    assert!(Argon2::default()
        .verify_password(b"password123", &parsed)
        .is_ok());
    assert!(Argon2::default()
        .verify_password(b"password124", &parsed)
        .is_err());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let h = harness().await;

    h.service.register(new_user("dup@example.com")).await.unwrap();
    let second = h.service.register(new_user("dup@example.com")).await;

    assert!(matches!(second, Err(ActivationError::EmailAlreadyExists)));
    assert_eq!(
        test_helpers::count_users_with_email(&h.pool, "dup@example.com")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_issued_token_hashes_to_stored_hash() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let plaintext = next_welcome_token(&h.queue).await;

    assert_eq!(plaintext.len(), 36);
    assert!(plaintext.chars().all(|c| c.is_ascii_hexdigit()));

    let stored: Vec<u8> = sqlx::query_scalar("SELECT token_hash FROM tokens WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(hash_plaintext(&plaintext).unwrap(), stored);
}

#[tokio::test]
async fn test_unknown_token_mutates_nothing() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let unrelated = generate_activation_token(chrono::Duration::hours(2), user_id)
        .unwrap()
        .plaintext;

    let result = h.service.activate(&unrelated).await;

    assert!(matches!(result, Err(ActivationError::TokenNotFound)));
    assert!(!is_activated(&h.pool, user_id).await);
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_valid_token_activates_once() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let plaintext = next_welcome_token(&h.queue).await;

    h.service.activate(&plaintext).await.unwrap();

    assert!(is_activated(&h.pool, user_id).await);
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 0);
    assert!(matches!(
        h.service.activate(&plaintext).await,
        Err(ActivationError::TokenNotFound)
    ));
}

#[tokio::test]
async fn test_activation_deletes_every_token_of_the_user() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let plaintext = next_welcome_token(&h.queue).await;

    let tokens = SqliteTokenRepository::new(h.pool.clone());
    let extra = generate_activation_token(chrono::Duration::hours(2), user_id).unwrap();
    tokens.insert(&extra.token).await.unwrap();
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 2);

    h.service.activate(&plaintext).await.unwrap();

    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 0);
    assert!(matches!(
        h.service.activate(&extra.plaintext).await,
        Err(ActivationError::TokenNotFound)
    ));
}

#[tokio::test]
async fn test_expired_token_is_consumed_without_activation() {
    let h = harness().await;

    let user_id = SqliteUserRepository::new(h.pool.clone())
        .insert("Ada", "ada@example.com", "hash")
        .await
        .unwrap();
    let expired = generate_activation_token(chrono::Duration::seconds(-1), user_id).unwrap();
    SqliteTokenRepository::new(h.pool.clone())
        .insert(&expired.token)
        .await
        .unwrap();

    let result = h.service.activate(&expired.plaintext).await;

    assert!(matches!(result, Err(ActivationError::TokenExpired)));
    assert!(!is_activated(&h.pool, user_id).await);
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_token_issued_an_hour_ago_with_two_hour_ttl() {
    let h = harness().await;

    let user_id = SqliteUserRepository::new(h.pool.clone())
        .insert("Ada", "ada@example.com", "hash")
        .await
        .unwrap();
    // Issued at T0 with a 2h TTL and presented at T0+1h: one hour left
    let issued = generate_activation_token(chrono::Duration::hours(1), user_id).unwrap();
    SqliteTokenRepository::new(h.pool.clone())
        .insert(&issued.token)
        .await
        .unwrap();

    h.service.activate(&issued.plaintext).await.unwrap();
    assert!(is_activated(&h.pool, user_id).await);

    assert!(matches!(
        h.service.activate(&issued.plaintext).await,
        Err(ActivationError::TokenNotFound)
    ));
}

#[tokio::test]
async fn test_malformed_tokens_are_client_errors() {
    let h = harness().await;

    for token in ["zz", "abc", "0123456789abcdef"] {
        assert!(matches!(
            h.service.activate(token).await,
            Err(ActivationError::MalformedToken(_))
        ));
    }
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_registration() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service = service_with_publisher(&pool, Arc::new(FailingPublisher));

    let user_id = service.register(new_user("ada@example.com")).await.unwrap();

    assert!(user_id > 0);
    assert_eq!(
        test_helpers::count_users_with_email(&pool, "ada@example.com")
            .await
            .unwrap(),
        1
    );
    assert_eq!(test_helpers::count_tokens(&pool, user_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_resend_replaces_outstanding_token() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let first = next_welcome_token(&h.queue).await;

    h.service.resend_activation_token(user_id).await.unwrap();
    let second = next_welcome_token(&h.queue).await;

    assert_ne!(first, second);
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 1);
    assert!(matches!(
        h.service.activate(&first).await,
        Err(ActivationError::TokenNotFound)
    ));
    h.service.activate(&second).await.unwrap();
    assert!(is_activated(&h.pool, user_id).await);
}

#[tokio::test]
async fn test_resend_rejects_activated_and_unknown_users() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let token = next_welcome_token(&h.queue).await;
    h.service.activate(&token).await.unwrap();

    assert!(matches!(
        h.service.resend_activation_token(user_id).await,
        Err(ActivationError::AlreadyActivated)
    ));
    assert!(matches!(
        h.service.resend_activation_token(user_id + 100).await,
        Err(ActivationError::UserNotFound)
    ));
    assert_eq!(h.queue.ready_count(WELCOME_EMAIL_QUEUE).await, 0);
}

#[tokio::test]
async fn test_purge_expired_tokens_keeps_live_ones() {
    let h = harness().await;

    let user_id = h.service.register(new_user("ada@example.com")).await.unwrap();
    let expired = generate_activation_token(chrono::Duration::minutes(-5), user_id).unwrap();
    SqliteTokenRepository::new(h.pool.clone())
        .insert(&expired.token)
        .await
        .unwrap();
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 2);

    let removed = h.service.purge_expired_tokens().await.unwrap();

    assert_eq!(removed, 1);
    assert_eq!(test_helpers::count_tokens(&h.pool, user_id).await.unwrap(), 1);
}
