//! Admin authentication handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use pupstar_common::{auth::LoginResponse, errors::Result};

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasscodeRequest {
    #[validate(length(min = 1, message = "Passcode is required"))]
    pub passcode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(alias = "passcode")]
    pub security_code: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Serialize)]
pub struct PasscodeResponse {
    pub verified: bool,
}

#[derive(Serialize)]
pub struct UpdatePasswordResponse {
    pub success: bool,
}

/// Exchange admin credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    request.validate()?;
    Ok(Json(state.auth.login(&request.username, &request.password).await?))
}

/// Check the security code before a password reset
pub async fn verify_passcode(
    State(state): State<AppState>,
    Json(request): Json<PasscodeRequest>,
) -> Result<Json<PasscodeResponse>> {
    request.validate()?;
    state.auth.verify_passcode(&request.passcode).await?;
    Ok(Json(PasscodeResponse { verified: true }))
}

/// Replace the admin password
pub async fn update_password(
    State(state): State<AppState>,
    Json(request): Json<UpdatePasswordRequest>,
) -> Result<Json<UpdatePasswordResponse>> {
    state
        .auth
        .update_password(
            &request.security_code,
            &request.new_password,
            &request.confirm_password,
        )
        .await?;
    Ok(Json(UpdatePasswordResponse { success: true }))
}
