use crate::config::PasswordHashConfig;
use crate::models::{
    generate_activation_token, hash_plaintext, NewUser, NotificationCommand, Token, TokenError,
    TokenScope, UserWelcomeData,
};
use crate::repositories::{RepositoryError, TokenRepository, UserRepository};
use crate::services::notification_publisher::{NotificationPublisher, PublishError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("Email already registered")]
    EmailAlreadyExists,
    #[error("Activation token not found")]
    TokenNotFound,
    #[error("Activation token has expired")]
    TokenExpired,
    #[error("Malformed activation token: {0}")]
    MalformedToken(TokenError),
    #[error("User not found")]
    UserNotFound,
    #[error("User is already activated")]
    AlreadyActivated,
    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
    #[error("Token generation failed: {0}")]
    TokenGeneration(TokenError),
    #[error("Failed to publish notification: {0}")]
    Publish(#[from] PublishError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Activation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Registration and activation workflow.
///
/// Holds no state of its own beyond configuration; every call goes straight
/// to the injected stores and publisher, so one instance can serve any number
/// of concurrent requests.
pub struct ActivationService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    publisher: Arc<dyn NotificationPublisher>,
    hasher: Argon2<'static>,
    activation_token_ttl: chrono::Duration,
}

impl ActivationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        publisher: Arc<dyn NotificationPublisher>,
        password_hashing: PasswordHashConfig,
        activation_token_ttl: Duration,
    ) -> Result<Self, ActivationError> {
        let params = Params::new(
            password_hashing.memory_kib,
            password_hashing.iterations,
            password_hashing.parallelism,
            None,
        )
        .map_err(|e| ActivationError::Configuration(format!("Argon2 parameters: {}", e)))?;
        let activation_token_ttl = chrono::Duration::from_std(activation_token_ttl)
            .map_err(|e| ActivationError::Configuration(format!("Activation token TTL: {}", e)))?;

        Ok(Self {
            users,
            tokens,
            publisher,
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            activation_token_ttl,
        })
    }

    /// Creates the account and returns its id.
    ///
    /// Only hashing and the user insert can fail the call. Issuing the
    /// activation token and queueing the welcome email are best effort: their
    /// failures are logged and the new id is still returned.
    pub async fn register(&self, user: NewUser) -> Result<i64, ActivationError> {
        let password_hash = self.hash_password(&user.password)?;

        let user_id = match self
            .users
            .insert(&user.name, &user.email, &password_hash)
            .await
        {
            Ok(id) => id,
            Err(RepositoryError::AlreadyExists) => return Err(ActivationError::EmailAlreadyExists),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create new user");
                return Err(e.into());
            }
        };
        tracing::info!(user_id, "New user registered");

        if let Err(e) = self
            .issue_activation_token(user_id, &user.email, &user.name)
            .await
        {
            tracing::error!(
                user_id,
                error = %e,
                "Failed to issue activation token, registration kept"
            );
        }

        Ok(user_id)
    }

    /// Consumes an activation token and activates its owner.
    ///
    /// Once the token is found, every activation token of that user is
    /// deleted, whether activation then succeeds, finds the token expired, or
    /// hits a store error.
    pub async fn activate(&self, plaintext: &str) -> Result<(), ActivationError> {
        let hash = hash_plaintext(plaintext).map_err(ActivationError::MalformedToken)?;

        let token = match self
            .tokens
            .find_by_hash(&hash, TokenScope::Activation)
            .await
        {
            Ok(token) => token,
            Err(RepositoryError::NotFound) => return Err(ActivationError::TokenNotFound),
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up activation token");
                return Err(e.into());
            }
        };

        let users = Arc::clone(&self.users);
        let tokens = Arc::clone(&self.tokens);

        // Detached so the cleanup still runs if the caller's future is dropped
        tokio::spawn(async move {
            let outcome = consume_activation_token(users.as_ref(), &token).await;

            if let Err(e) = tokens
                .delete_all_for_user(token.user_id, TokenScope::Activation)
                .await
            {
                tracing::error!(
                    user_id = token.user_id,
                    error = %e,
                    "Failed to delete activation tokens"
                );
            }

            outcome
        })
        .await?
    }

    /// Replaces a user's outstanding activation tokens with a fresh one and
    /// queues a new welcome email. Unlike registration, every step here must
    /// succeed.
    pub async fn resend_activation_token(&self, user_id: i64) -> Result<(), ActivationError> {
        let user = match self.users.find_by_id(user_id).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => return Err(ActivationError::UserNotFound),
            Err(e) => return Err(e.into()),
        };

        if user.activated {
            return Err(ActivationError::AlreadyActivated);
        }

        self.tokens
            .delete_all_for_user(user.id, TokenScope::Activation)
            .await?;
        self.issue_activation_token(user.id, &user.email, &user.name)
            .await?;

        tracing::info!(user_id, "Activation token re-sent");
        Ok(())
    }

    /// Deletes tokens whose expiry has passed. Returns how many were removed.
    pub async fn purge_expired_tokens(&self) -> Result<u64, ActivationError> {
        let removed = self.tokens.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired tokens");
        }
        Ok(removed)
    }

    fn hash_password(&self, password: &str) -> Result<String, ActivationError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ActivationError::PasswordHashing(e.to_string()))
    }

    async fn issue_activation_token(
        &self,
        user_id: i64,
        email: &str,
        name: &str,
    ) -> Result<(), ActivationError> {
        let generated = generate_activation_token(self.activation_token_ttl, user_id)
            .map_err(ActivationError::TokenGeneration)?;

        self.tokens.insert(&generated.token).await?;

        let command = NotificationCommand::user_welcome(
            email,
            UserWelcomeData {
                name: name.to_string(),
                token: generated.plaintext,
            },
        )
        .map_err(PublishError::from)?;
        self.publisher.publish(&command).await?;

        Ok(())
    }
}

async fn consume_activation_token(
    users: &dyn UserRepository,
    token: &Token,
) -> Result<(), ActivationError> {
    if token.is_expired_at(Utc::now()) {
        tracing::info!(user_id = token.user_id, "Activation token has expired");
        return Err(ActivationError::TokenExpired);
    }

    match users.activate(token.user_id).await {
        Ok(()) => {
            tracing::info!(user_id = token.user_id, "User activated");
            Ok(())
        }
        Err(RepositoryError::NotFound) => Err(ActivationError::UserNotFound),
        Err(e) => {
            tracing::error!(user_id = token.user_id, error = %e, "Failed to activate user");
            Err(e.into())
        }
    }
}
