use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{Duration, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::ReturnDocument,
    Collection,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::database::{is_duplicate_key, USERS};
use crate::dtos::auth_dtos::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest,
    RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, VerifyEmailRequest,
};
use crate::errors::{AppError, Result};
use crate::middleware::auth::{ensure_account_usable, CurrentUser};
use crate::middleware::extract::AppJson;
use crate::middleware::request_meta::ClientInfo;
use crate::models::audit_log::{AuditAction, AuditLog, AuditResource};
use crate::models::common::now_bson;
use crate::models::user::{User, UserResponse};
use crate::services::audit;
use crate::services::password::{
    digest_token, generate_one_time_token, hash_blocking, verify_blocking,
};
use crate::state::AppState;

const RESET_TOKEN_TTL_MINUTES: i64 = 10;
const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(USERS)
}

pub(crate) async fn find_user(state: &AppState, id: &ObjectId) -> Result<User> {
    users(state)
        .find_one(doc! { "_id": *id })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

fn expires_in(duration: Duration) -> BsonDateTime {
    BsonDateTime::from_chrono(Utc::now() + duration)
}

fn user_audit(client: &ClientInfo, action: AuditAction, user_id: ObjectId) -> AuditLog {
    client.audit(AuditLog::new(action, AuditResource::User).by(Some(user_id)).on(user_id))
}

pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    let role = payload.role.unwrap_or_default();
    if !role.self_assignable() {
        return Err(AppError::invalid_data("Invalid role specified"));
    }

    let email = payload.email.trim().to_lowercase();
    let collection = users(&state);
    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::Conflict("User already exists with this email".into()));
    }

    let password_hash = hash_blocking(payload.password).await?;
    let mut user = User::new(payload.name.trim().to_string(), email.clone(), password_hash, role);

    // TODO: email the raw verification token once an outbound mail transport is configured.
    let verification = generate_one_time_token();
    user.email_verification_token = Some(verification.digest);
    user.email_verification_expires = Some(expires_in(Duration::hours(VERIFICATION_TOKEN_TTL_HOURS)));

    let inserted = collection.insert_one(&user).await.map_err(|err| {
        if is_duplicate_key(&err) {
            AppError::Conflict("User already exists with this email".into())
        } else {
            AppError::from(err)
        }
    })?;
    let user_id = inserted
        .inserted_id
        .as_object_id()
        .ok_or_else(|| AppError::Internal("insert returned a non-ObjectId key".into()))?;
    user.id = Some(user_id);

    let tokens = state.tokens.issue_pair(&user_id, role)?;
    audit::record(
        &state.db,
        user_audit(&client, AuditAction::UserCreated, user_id)
            .details(json!({ "role": role, "email": email })),
    )
    .await;

    tracing::info!(user = %user_id, %role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new("User registered successfully", user.into(), tokens)),
    ))
}

fn invalid_credentials() -> AppError {
    AppError::unauthorized("Invalid credentials")
}

/// Checks a login attempt against the account found for its email. The
/// password is verified before account state so a ban or deactivation is
/// only revealed to someone who knows the password.
async fn check_credentials(user: Option<User>, password: String) -> Result<ObjectId> {
    let user = user.ok_or_else(invalid_credentials)?;
    if !verify_blocking(password, user.password_hash.clone()).await? {
        tracing::warn!(email = %user.email, "login rejected: wrong password");
        return Err(invalid_credentials());
    }
    ensure_account_usable(&user)?;
    user.id.ok_or_else(invalid_credentials)
}

fn login_update(now: BsonDateTime) -> Document {
    doc! {
        "$set": { "lastLogin": now, "updatedAt": now },
        "$inc": { "loginCount": 1 },
    }
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let collection = users(&state);
    let found = collection.find_one(doc! { "email": &email }).await?;
    let user_id = check_credentials(found, payload.password).await?;

    let user = collection
        .find_one_and_update(doc! { "_id": user_id }, login_update(BsonDateTime::now()))
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(invalid_credentials)?;

    let tokens = state.tokens.issue_pair(&user_id, user.role)?;
    audit::record(
        &state.db,
        user_audit(&client, AuditAction::UserLogin, user_id).details(json!({ "email": email })),
    )
    .await;

    Ok(Json(AuthResponse::new("Login successful", user.into(), tokens)))
}

pub async fn logout(
    State(state): State<AppState>,
    client: ClientInfo,
    current: CurrentUser,
) -> Result<Json<Value>> {
    audit::record(&state.db, user_audit(&client, AuditAction::UserLogout, current.id)).await;
    Ok(Json(json!({ "success": true, "message": "Logout successful" })))
}

pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<Json<Value>> {
    let token = payload
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::unauthorized("Refresh token required"))?;

    let invalid = || AppError::unauthorized("Invalid refresh token");
    let claims = state.tokens.verify_refresh(&token).map_err(|_| invalid())?;
    let user_id = claims.user_id().map_err(|_| invalid())?;

    let user = users(&state)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(invalid)?;
    ensure_account_usable(&user).map_err(|_| invalid())?;

    let tokens = state.tokens.issue_pair(&user_id, user.role)?;
    Ok(Json(json!({
        "success": true,
        "token": tokens.token,
        "refreshToken": tokens.refresh_token,
        "expiresIn": tokens.expires_in,
    })))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let reset = generate_one_time_token();
    let updated = users(&state)
        .update_one(
            doc! { "email": &email, "isActive": true },
            doc! { "$set": {
                "passwordResetToken": &reset.digest,
                "passwordResetExpires": expires_in(Duration::minutes(RESET_TOKEN_TTL_MINUTES)),
                "updatedAt": now_bson(),
            }},
        )
        .await?;

    if updated.matched_count > 0 {
        // TODO: email the reset link carrying `reset.raw` once an outbound mail transport is configured.
        tracing::info!("password reset token issued");
    }

    // Same answer whether or not the account exists.
    Ok(Json(json!({
        "success": true,
        "message": "If an account with that email exists, a password reset link has been sent.",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let password_hash = hash_blocking(payload.password).await?;

    // Matching on the digest and clearing it in one write makes the token single-use.
    let user = users(&state)
        .find_one_and_update(
            doc! {
                "passwordResetToken": digest_token(payload.token.trim()),
                "passwordResetExpires": { "$gt": now_bson() },
            },
            doc! {
                "$set": { "passwordHash": password_hash, "updatedAt": now_bson() },
                "$unset": { "passwordResetToken": "", "passwordResetExpires": "" },
            },
        )
        .await?
        .ok_or_else(|| AppError::invalid_data("Invalid or expired reset token"))?;

    if let Some(user_id) = user.id {
        audit::record(
            &state.db,
            user_audit(&client, AuditAction::PasswordChanged, user_id)
                .details(json!({ "method": "reset" })),
        )
        .await;
    }
    Ok(Json(json!({ "success": true, "message": "Password reset successfully" })))
}

pub async fn verify_email(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let user = users(&state)
        .find_one_and_update(
            doc! {
                "emailVerificationToken": digest_token(payload.token.trim()),
                "emailVerificationExpires": { "$gt": now_bson() },
            },
            doc! {
                "$set": { "isEmailVerified": true, "updatedAt": now_bson() },
                "$unset": { "emailVerificationToken": "", "emailVerificationExpires": "" },
            },
        )
        .await?
        .ok_or_else(|| AppError::invalid_data("Invalid or expired verification token"))?;

    if let Some(user_id) = user.id {
        audit::record(&state.db, user_audit(&client, AuditAction::EmailVerified, user_id)).await;
    }
    Ok(Json(json!({ "success": true, "message": "Email verified successfully" })))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Value>> {
    let user = find_user(&state, &current.id).await?;
    if user.is_email_verified {
        return Err(AppError::invalid_data("Email is already verified"));
    }

    // TODO: email the raw verification token once an outbound mail transport is configured.
    let verification = generate_one_time_token();
    users(&state)
        .update_one(
            doc! { "_id": current.id },
            doc! { "$set": {
                "emailVerificationToken": verification.digest,
                "emailVerificationExpires": expires_in(Duration::hours(VERIFICATION_TOKEN_TTL_HOURS)),
                "updatedAt": now_bson(),
            }},
        )
        .await?;

    Ok(Json(json!({ "success": true, "message": "Verification email sent" })))
}

pub async fn me(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Value>> {
    let user = find_user(&state, &current.id).await?;
    Ok(Json(json!({ "success": true, "user": UserResponse::from(user) })))
}

fn profile_update(payload: &UpdateProfileRequest) -> Document {
    let mut set = Document::new();
    if let Some(name) = &payload.name {
        set.insert("name", name.trim());
    }
    for (key, value) in [
        ("profile.bio", &payload.bio),
        ("profile.phone", &payload.phone),
        ("profile.avatar", &payload.avatar),
        ("profile.location", &payload.location),
    ] {
        if let Some(value) = value {
            set.insert(key, value.as_str());
        }
    }
    if let Some(prefs) = &payload.preferences {
        if let Some(email) = prefs.email_notifications {
            set.insert("preferences.emailNotifications", email);
        }
        if let Some(currency) = prefs.currency {
            set.insert("preferences.currency", currency.code());
        }
        if let Some(categories) = &prefs.preferred_categories {
            let values: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
            set.insert("preferences.preferredCategories", values);
        }
    }
    set
}

pub async fn update_me(
    State(state): State<AppState>,
    client: ClientInfo,
    current: CurrentUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let mut set = profile_update(&payload);
    if set.is_empty() {
        return Err(AppError::invalid_data("No profile fields supplied"));
    }
    let updated_fields: Vec<String> = set.keys().cloned().collect();
    set.insert("updatedAt", now_bson());

    let user = users(&state)
        .find_one_and_update(doc! { "_id": current.id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    audit::record(
        &state.db,
        user_audit(&client, AuditAction::UserUpdated, current.id)
            .details(json!({ "updatedFields": updated_fields })),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": UserResponse::from(user),
    })))
}

pub async fn delete_me(
    State(state): State<AppState>,
    client: ClientInfo,
    current: CurrentUser,
) -> Result<Json<Value>> {
    users(&state)
        .update_one(
            doc! { "_id": current.id },
            doc! { "$set": { "isActive": false, "updatedAt": now_bson() } },
        )
        .await?;
    audit::record(&state.db, user_audit(&client, AuditAction::UserDeleted, current.id)).await;

    tracing::info!(user = %current.id, "account deactivated by owner");
    Ok(Json(json!({ "success": true, "message": "Account deleted successfully" })))
}

pub async fn change_password(
    State(state): State<AppState>,
    client: ClientInfo,
    current: CurrentUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let user = find_user(&state, &current.id).await?;

    if !verify_blocking(payload.current_password, user.password_hash).await? {
        return Err(AppError::invalid_data("Current password is incorrect"));
    }
    let password_hash = hash_blocking(payload.new_password).await?;

    users(&state)
        .update_one(
            doc! { "_id": current.id },
            doc! {
                "$set": { "passwordHash": password_hash, "updatedAt": now_bson() },
                "$unset": { "passwordResetToken": "", "passwordResetExpires": "" },
            },
        )
        .await?;
    audit::record(&state.db, user_audit(&client, AuditAction::PasswordChanged, current.id)).await;

    Ok(Json(json!({ "success": true, "message": "Password changed successfully" })))
}

pub async fn check(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Value>> {
    let user = find_user(&state, &current.id).await?;
    Ok(Json(json!({
        "success": true,
        "isAuthenticated": true,
        "user": UserResponse::from(user),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::auth_dtos::PreferencesUpdate;
    use crate::models::common::{Category, Currency};
    use crate::models::user::Role;

    fn account(password: &str) -> User {
        let hash = bcrypt::hash(password, 4).unwrap();
        let mut user = User::new("Ada".into(), "ada@example.org".into(), hash, Role::Donor);
        user.id = Some(ObjectId::new());
        user
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_credentials() {
        let err = check_credentials(None, "whatever1".into()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let err = check_credentials(Some(account("correct-horse")), "battery".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn deactivated_account_is_refused_after_the_password_check() {
        let mut user = account("correct-horse");
        user.is_active = false;
        let err = check_credentials(Some(user.clone()), "correct-horse".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Account is deactivated"));

        let err = check_credentials(Some(user), "nope".into()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn banned_account_reports_the_reason() {
        let mut user = account("correct-horse");
        user.is_banned = true;
        user.ban_reason = Some("chargebacks".into());
        let err = check_credentials(Some(user), "correct-horse".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountBanned { reason: Some(ref r) } if r == "chargebacks"));
    }

    #[tokio::test]
    async fn valid_credentials_yield_the_account_id() {
        let user = account("correct-horse");
        let id = user.id.unwrap();
        assert_eq!(check_credentials(Some(user), "correct-horse".into()).await.unwrap(), id);
    }

    #[test]
    fn login_stamps_last_login_and_counts() {
        let now = BsonDateTime::now();
        let update = login_update(now);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_datetime("lastLogin").unwrap(), &now);
        assert_eq!(set.get_datetime("updatedAt").unwrap(), &now);
        assert_eq!(update.get_document("$inc").unwrap().get_i32("loginCount").unwrap(), 1);
    }

    #[test]
    fn profile_update_uses_dotted_paths() {
        let payload = UpdateProfileRequest {
            name: Some(" Ada ".into()),
            bio: Some("Builder".into()),
            preferences: Some(PreferencesUpdate {
                currency: Some(Currency::Lkr),
                preferred_categories: Some(vec![Category::Health, Category::Animals]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let set = profile_update(&payload);
        assert_eq!(set.get_str("name").unwrap(), "Ada");
        assert_eq!(set.get_str("profile.bio").unwrap(), "Builder");
        assert_eq!(set.get_str("preferences.currency").unwrap(), "LKR");
        assert_eq!(set.get_array("preferences.preferredCategories").unwrap().len(), 2);
        assert!(!set.contains_key("profile.phone"));
        assert!(!set.contains_key("preferences.emailNotifications"));
    }

    #[test]
    fn empty_profile_update_sets_nothing() {
        assert!(profile_update(&UpdateProfileRequest::default()).is_empty());
    }
}
