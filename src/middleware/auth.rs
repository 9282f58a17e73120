use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use mongodb::bson::{doc, oid::ObjectId};

use crate::database::USERS;
use crate::errors::{AppError, Result};
use crate::models::user::{Role, User};
use crate::state::AppState;

/// The authenticated principal, attached to the request by [`authenticate`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: ObjectId,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may manage a resource.
    pub fn can_manage(&self, owner: &ObjectId) -> bool {
        self.is_admin() || &self.id == owner
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        CurrentUser {
            id: user.id.unwrap_or_default(),
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Access denied. No token provided."))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects accounts that may not act, even with a valid token.
pub fn ensure_account_usable(user: &User) -> Result<()> {
    if !user.is_active {
        return Err(AppError::unauthorized("Account is deactivated"));
    }
    if user.is_banned {
        return Err(AppError::AccountBanned {
            reason: user.ban_reason.clone(),
        });
    }
    Ok(())
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::unauthorized("Access denied. No token provided."))?;

    let claims = state.tokens.verify_access(token)?;
    let user_id = claims.user_id()?;

    let user = state
        .db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid token. User not found."))?;
    ensure_account_usable(&user)?;

    request.extensions_mut().insert(CurrentUser::from(&user));
    Ok(next.run(request).await)
}

/// 403 unless the principal holds one of `allowed`.
pub fn authorize(user: &CurrentUser, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        tracing::warn!(user = %user.id, role = %user.role, "role not permitted");
        Err(AppError::forbidden(
            "Access denied. Insufficient permissions.",
        ))
    }
}

async fn require(allowed: &[Role], request: Request, next: Next) -> Result<Response> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::unauthorized("Access denied. No token provided."))?;
    authorize(user, allowed)?;
    Ok(next.run(request).await)
}

pub async fn admin_only(request: Request, next: Next) -> Result<Response> {
    require(&[Role::Admin], request, next).await
}

pub async fn leader_or_admin(request: Request, next: Next) -> Result<Response> {
    require(&[Role::CampaignLeader, Role::Admin], request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn principal(role: Role) -> CurrentUser {
        CurrentUser {
            id: ObjectId::new(),
            role,
            name: "Ada".into(),
            email: "ada@example.org".into(),
        }
    }

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn role_gate() {
        let leader = principal(Role::CampaignLeader);
        assert!(authorize(&leader, &[Role::CampaignLeader, Role::Admin]).is_ok());
        assert!(matches!(
            authorize(&leader, &[Role::Admin]),
            Err(AppError::Forbidden(_))
        ));
        assert!(authorize(&principal(Role::Public), &[Role::Donor]).is_err());
    }

    #[test]
    fn ownership() {
        let owner = principal(Role::CampaignLeader);
        assert!(owner.can_manage(&owner.id));
        assert!(!owner.can_manage(&ObjectId::new()));
        assert!(principal(Role::Admin).can_manage(&ObjectId::new()));
    }

    #[test]
    fn unusable_accounts() {
        let mut user = User::new("Bo".into(), "bo@example.org".into(), "hash".into(), Role::Donor);
        assert!(ensure_account_usable(&user).is_ok());

        user.is_banned = true;
        user.ban_reason = Some("chargebacks".into());
        match ensure_account_usable(&user) {
            Err(AppError::AccountBanned { reason }) => assert_eq!(reason.as_deref(), Some("chargebacks")),
            other => panic!("expected ban, got {:?}", other),
        }

        user.is_active = false;
        assert!(matches!(ensure_account_usable(&user), Err(AppError::Unauthorized(_))));
    }
}
