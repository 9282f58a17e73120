use axum::{
    extract::State,
    response::Json,
};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    options::ReturnDocument,
    Collection,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::database::{AUDIT_LOGS, CAMPAIGNS, SETTINGS, USERS};
use crate::dtos::admin_dtos::{
    AccountStatus, AuditLogQuery, CampaignListQuery, PeriodQuery, PlatformSettings,
    UpdateSettingsRequest, UserListQuery, UserRoleRequest, UserStatusRequest,
};
use crate::dtos::campaign_dtos::PageQuery;
use crate::errors::{AppError, Result};
use crate::handlers::analytics::{financial_report_data, platform_stats_data};
use crate::handlers::donations::donation_totals;
use crate::middleware::auth::CurrentUser;
use crate::middleware::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::request_meta::ClientInfo;
use crate::models::audit_log::{AuditAction, AuditLog, AuditLogResponse, AuditResource};
use crate::models::campaign::{Campaign, CampaignResponse, CampaignStatus};
use crate::models::common::{now_bson, parse_object_id, Pagination, Period};
use crate::models::user::{Role, User, UserResponse};
use crate::services::audit;
use crate::state::AppState;

const SETTINGS_KEY: &str = "platform";

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(USERS)
}

fn campaigns(state: &AppState) -> Collection<Campaign> {
    state.db.collection(CAMPAIGNS)
}

fn admin_audit(client: &ClientInfo, action: AuditAction, admin: &CurrentUser, target: ObjectId) -> AuditLog {
    client.audit(
        AuditLog::new(action, AuditResource::User)
            .by(Some(admin.id))
            .on(target),
    )
}

/// Admins act on other accounts only; changing your own status or role
/// could lock the platform out of its last administrator.
fn other_user(admin: &CurrentUser, raw_id: &str) -> Result<ObjectId> {
    let id = parse_object_id(raw_id, "user")?;
    if id == admin.id {
        return Err(AppError::invalid_data("You cannot perform this action on your own account"));
    }
    Ok(id)
}

pub async fn list_users(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<UserListQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request();
    let filter = query.filter();
    let collection = users(&state);

    let total = collection.count_documents(filter.clone()).await?;
    let found: Vec<User> = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(request.skip())
        .limit(request.limit as i64)
        .await?
        .try_collect()
        .await?;
    let users: Vec<UserResponse> = found.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "success": true,
        "users": users,
        "pagination": Pagination::new(request, total),
    })))
}

pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "user")?;
    let user = users(&state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let campaigns_created = campaigns(&state).count_documents(doc! { "creator": id }).await?;
    let (donations, donated, _) =
        donation_totals(&state, doc! { "donorEmail": &user.email }).await?;

    Ok(Json(json!({
        "success": true,
        "user": UserResponse::from(user),
        "activity": {
            "campaignsCreated": campaigns_created,
            "donations": donations,
            "totalDonated": donated,
        },
    })))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<UserStatusRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let id = other_user(&admin, &id)?;
    let reason = payload.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    if payload.status == AccountStatus::Banned && reason.is_none() {
        return Err(AppError::invalid_data("A reason is required to ban a user"));
    }

    let mut update = payload.status.update_document(reason);
    let set = update
        .get_document_mut("$set")
        .map_err(|_| AppError::Internal("status update has no $set".into()))?;
    set.insert("updatedAt", now_bson());

    let user = users(&state)
        .find_one_and_update(doc! { "_id": id }, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    audit::record(
        &state.db,
        admin_audit(&client, AuditAction::UserStatusUpdated, &admin, id)
            .details(json!({ "status": payload.status, "reason": reason })),
    )
    .await;
    tracing::info!(user = %id, status = payload.status.as_str(), "account status changed");

    Ok(Json(json!({
        "success": true,
        "message": format!("User status updated to {}", payload.status.as_str()),
        "user": UserResponse::from(user),
    })))
}

pub async fn update_user_role(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<UserRoleRequest>,
) -> Result<Json<Value>> {
    let id = other_user(&admin, &id)?;
    if payload.role == Role::Public {
        return Err(AppError::invalid_data("Invalid role specified"));
    }

    let previous = users(&state)
        .find_one_and_update(
            doc! { "_id": id },
            doc! { "$set": { "role": payload.role.as_str(), "updatedAt": now_bson() } },
        )
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    audit::record(
        &state.db,
        admin_audit(&client, AuditAction::UserRoleUpdated, &admin, id)
            .details(json!({ "from": previous.role, "to": payload.role })),
    )
    .await;
    tracing::info!(user = %id, from = %previous.role, to = %payload.role, "role changed");

    Ok(Json(json!({
        "success": true,
        "message": format!("User role updated to {}", payload.role),
    })))
}

/// Accounts are deactivated, never removed, so donations and audit entries
/// keep resolving to a user.
pub async fn delete_user(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = other_user(&admin, &id)?;
    let result = users(&state)
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "isActive": false, "updatedAt": now_bson() } },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("User not found"));
    }

    audit::record(
        &state.db,
        admin_audit(&client, AuditAction::UserDeleted, &admin, id)
            .details(json!({ "soft": true })),
    )
    .await;
    Ok(Json(json!({ "success": true, "message": "User deactivated successfully" })))
}

async fn campaign_page(
    state: &AppState,
    filter: Document,
    request: crate::models::common::PageRequest,
) -> Result<Json<Value>> {
    let collection = campaigns(state);
    let total = collection.count_documents(filter.clone()).await?;
    let found: Vec<Campaign> = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(request.skip())
        .limit(request.limit as i64)
        .projection(doc! { "updates": 0, "impactReports": 0 })
        .await?
        .try_collect()
        .await?;
    let campaigns: Vec<CampaignResponse> = found.into_iter().map(CampaignResponse::summary).collect();

    Ok(Json(json!({
        "success": true,
        "campaigns": campaigns,
        "pagination": Pagination::new(request, total),
    })))
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<CampaignListQuery>,
) -> Result<Json<Value>> {
    campaign_page(&state, query.filter(), query.page_request()).await
}

pub async fn pending_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Value>> {
    campaign_page(
        &state,
        doc! { "status": CampaignStatus::Pending.as_str() },
        query.page_request(20),
    )
    .await
}

pub async fn reconcile_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "campaign")?;
    let totals = state.donations.reconcile_campaign(&id).await?;

    audit::record(
        &state.db,
        client.audit(
            AuditLog::new(AuditAction::AdminAction, AuditResource::Campaign)
                .by(Some(admin.id))
                .on(id)
                .details(json!({
                    "operation": "reconcile",
                    "raised": totals.raised,
                    "donationCount": totals.donation_count,
                })),
        ),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Campaign totals reconciled",
        "totals": { "raised": totals.raised, "donationCount": totals.donation_count },
    })))
}

pub async fn audit_logs(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<AuditLogQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request();
    let filter = query.filter();
    let collection = state.db.collection::<AuditLog>(AUDIT_LOGS);

    let total = collection.count_documents(filter.clone()).await?;
    let found: Vec<AuditLog> = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(request.skip())
        .limit(request.limit as i64)
        .await?
        .try_collect()
        .await?;
    let logs: Vec<AuditLogResponse> = found.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "success": true,
        "logs": logs,
        "pagination": Pagination::new(request, total),
    })))
}

pub async fn financial_overview(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Value>> {
    let period = Period::parse(query.period.as_deref())?;
    let overview = financial_report_data(&state, period).await?;
    Ok(Json(json!({ "success": true, "overview": overview, "period": period })))
}

pub async fn platform_stats(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(json!({ "success": true, "stats": platform_stats_data(&state).await? })))
}

async fn load_settings(state: &AppState) -> Result<PlatformSettings> {
    let stored = state
        .db
        .collection::<Document>(SETTINGS)
        .find_one(doc! { "_id": SETTINGS_KEY })
        .await?;
    match stored.as_ref().and_then(|d| d.get_document("settings").ok()) {
        Some(settings) => bson::from_document(settings.clone())
            .map_err(|e| AppError::Internal(format!("stored settings are malformed: {}", e))),
        None => Ok(PlatformSettings::default()),
    }
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Value>> {
    let settings = load_settings(&state).await?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppJson(payload): AppJson<UpdateSettingsRequest>,
) -> Result<Json<Value>> {
    payload.settings.validate_values().map_err(AppError::invalid_data)?;
    let previous = load_settings(&state).await?;

    state
        .db
        .collection::<Document>(SETTINGS)
        .update_one(
            doc! { "_id": SETTINGS_KEY },
            doc! { "$set": {
                "settings": bson::to_document(&payload.settings)?,
                "updatedBy": admin.id,
                "updatedAt": now_bson(),
            }},
        )
        .upsert(true)
        .await?;

    audit::record(
        &state.db,
        client.audit(
            AuditLog::new(AuditAction::SettingsChanged, AuditResource::System)
                .by(Some(admin.id))
                .details(json!({ "previous": previous, "current": payload.settings })),
        ),
    )
    .await;
    tracing::info!(admin = %admin.id, "platform settings updated");

    Ok(Json(json!({
        "success": true,
        "message": "Settings updated successfully",
        "settings": payload.settings,
    })))
}
