use crate::error::{AppError, Result};
use crate::models::{NewUser, TOKEN_PLAINTEXT_LENGTH};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_NAME_LENGTH: usize = 500;
const MAX_EMAIL_LENGTH: usize = 255;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub activated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResendActivationRequest {
    pub user_id: i64,
}

/// Collects per-field validation messages, keeping the first one per field.
#[derive(Debug, Default)]
struct Validator {
    errors: BTreeMap<&'static str, String>,
}

impl Validator {
    fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.errors
                .entry(field)
                .or_insert_with(|| message.to_string());
        }
    }

    fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

impl RegisterRequest {
    fn into_new_user(self) -> Result<NewUser> {
        let user = NewUser {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.trim().to_string(),
        };

        let mut v = Validator::default();
        v.check(!user.name.is_empty(), "name", "must be provided");
        v.check(
            user.name.chars().count() <= MAX_NAME_LENGTH,
            "name",
            "must not be more than 500 characters long",
        );
        v.check(!user.email.is_empty(), "email", "must be provided");
        v.check(
            user.email.contains('@'),
            "email",
            "must be a valid email address",
        );
        v.check(
            user.email.chars().count() <= MAX_EMAIL_LENGTH,
            "email",
            "must not be more than 255 characters long",
        );
        v.check(!user.password.is_empty(), "password", "must be provided");
        v.check(
            user.password.chars().count() >= MIN_PASSWORD_LENGTH,
            "password",
            "must be at least 8 characters long",
        );
        v.check(
            user.password.chars().count() <= MAX_PASSWORD_LENGTH,
            "password",
            "must not be more than 72 characters long",
        );
        v.finish()?;

        Ok(user)
    }
}

/// POST /auth/register
pub async fn register_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response> {
    let user = json_body(body)?.into_new_user()?;
    let user_id = state.activation_service.register(user).await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })).into_response())
}

/// PUT /auth/activate
pub async fn activate_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;
    let token = request.token.trim();

    let mut v = Validator::default();
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_PLAINTEXT_LENGTH,
        "token",
        "must be 36 characters long",
    );
    v.finish()?;

    state.activation_service.activate(token).await?;

    Ok((StatusCode::OK, Json(ActivateResponse { activated: true })).into_response())
}

/// POST /auth/resend-activation-token
pub async fn resend_activation_token_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<ResendActivationRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;

    let mut v = Validator::default();
    v.check(request.user_id > 0, "user_id", "must be a positive integer");
    v.finish()?;

    state
        .activation_service
        .resend_activation_token(request.user_id)
        .await?;

    Ok(StatusCode::CREATED.into_response())
}
