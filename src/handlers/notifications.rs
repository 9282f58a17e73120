use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection, Database,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::database::{NOTIFICATIONS, USERS};
use crate::dtos::notification_dtos::{
    BroadcastRequest, NotificationPreferencesRequest, NotificationQuery, SendNotificationRequest,
};
use crate::errors::{AppError, Result};
use crate::handlers::auth::find_user;
use crate::middleware::auth::CurrentUser;
use crate::middleware::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::request_meta::ClientInfo;
use crate::models::audit_log::{AuditAction, AuditLog, AuditResource};
use crate::models::common::{now_bson, parse_object_id, Pagination};
use crate::models::notification::{Notification, NotificationResponse, NotificationType};
use crate::models::user::User;
use crate::services::audit;
use crate::state::AppState;

fn notifications(state: &AppState) -> Collection<Notification> {
    state.db.collection(NOTIFICATIONS)
}

/// Stores notifications produced as a side effect of another operation.
/// Failures are logged; the triggering request still succeeds.
pub(crate) async fn deliver(db: &Database, batch: Vec<Notification>) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    if let Err(err) = db
        .collection::<Notification>(NOTIFICATIONS)
        .insert_many(batch)
        .await
    {
        tracing::error!(count, "failed to store notifications: {}", err);
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<NotificationQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request();
    let mut filter = doc! { "recipient": user.id };
    if query.unread == Some(true) {
        filter.insert("isRead", false);
    }

    let collection = notifications(&state);
    let total = collection.count_documents(filter.clone()).await?;
    let unread_count = collection
        .count_documents(doc! { "recipient": user.id, "isRead": false })
        .await?;
    let found: Vec<Notification> = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(request.skip())
        .limit(request.limit as i64)
        .await?
        .try_collect()
        .await?;
    let notifications: Vec<NotificationResponse> = found.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "success": true,
        "notifications": notifications,
        "unreadCount": unread_count,
        "pagination": Pagination::new(request, total),
    })))
}

pub async fn unread_count(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let count = notifications(&state)
        .count_documents(doc! { "recipient": user.id, "isRead": false })
        .await?;
    Ok(Json(json!({ "success": true, "unreadCount": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "notification")?;
    let updated = notifications(&state)
        .find_one_and_update(
            doc! { "_id": id, "recipient": user.id },
            doc! { "$set": { "isRead": true, "readAt": now_bson() } },
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Notification not found"))?;

    Ok(Json(json!({
        "success": true,
        "notification": NotificationResponse::from(updated),
    })))
}

pub async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let result = notifications(&state)
        .update_many(
            doc! { "recipient": user.id, "isRead": false },
            doc! { "$set": { "isRead": true, "readAt": now_bson() } },
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "All notifications marked as read",
        "modifiedCount": result.modified_count,
    })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "notification")?;
    let result = notifications(&state)
        .delete_one(doc! { "_id": id, "recipient": user.id })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Notification not found"));
    }
    Ok(Json(json!({ "success": true, "message": "Notification deleted" })))
}

pub async fn clear_all(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let result = notifications(&state)
        .delete_many(doc! { "recipient": user.id })
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "All notifications cleared",
        "deletedCount": result.deleted_count,
    })))
}

pub async fn get_preferences(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let user = find_user(&state, &user.id).await?;
    Ok(Json(json!({
        "success": true,
        "preferences": { "emailNotifications": user.preferences.email_notifications },
    })))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(payload): AppJson<NotificationPreferencesRequest>,
) -> Result<Json<Value>> {
    let result = state
        .db
        .collection::<User>(USERS)
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": {
                "preferences.emailNotifications": payload.email_notifications,
                "updatedAt": now_bson(),
            }},
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("User not found"));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Notification preferences updated",
        "preferences": { "emailNotifications": payload.email_notifications },
    })))
}

fn parse_recipients(raw: &[String]) -> Result<Vec<ObjectId>> {
    raw.iter().map(|id| parse_object_id(id, "recipient")).collect()
}

pub async fn send_notification(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppJson(payload): AppJson<SendNotificationRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    payload.validate()?;
    let recipients = parse_recipients(&payload.recipients)?;
    let kind = payload.notification_type.unwrap_or(NotificationType::SystemAlert);

    let batch: Vec<Notification> = recipients
        .iter()
        .map(|recipient| {
            Notification::new(*recipient, kind, payload.title.clone(), payload.message.clone())
                .from_sender(admin.id)
                .with_data(payload.data.clone())
                .with_action(payload.action_url.clone(), payload.action_text.clone())
        })
        .collect();
    let inserted = notifications(&state).insert_many(batch).await?;

    audit::record(
        &state.db,
        client.audit(
            AuditLog::new(AuditAction::AdminAction, AuditResource::Notification)
                .by(Some(admin.id))
                .details(json!({ "operation": "send", "recipients": recipients.len() })),
        ),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Notifications sent",
            "count": inserted.inserted_ids.len(),
        })),
    ))
}

pub async fn broadcast(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppJson(payload): AppJson<BroadcastRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    payload.validate()?;
    let kind = payload.notification_type.unwrap_or(NotificationType::SystemAnnouncement);

    let recipients: Vec<Document> = state
        .db
        .collection::<Document>(USERS)
        .find(doc! { "isActive": true })
        .projection(doc! { "_id": 1 })
        .await?
        .try_collect()
        .await?;
    let batch: Vec<Notification> = recipients
        .iter()
        .filter_map(|u| u.get_object_id("_id").ok())
        .map(|recipient| {
            Notification::new(recipient, kind, payload.title.clone(), payload.message.clone())
                .from_sender(admin.id)
                .with_data(payload.data.clone())
                .with_action(payload.action_url.clone(), payload.action_text.clone())
        })
        .collect();

    let count = batch.len();
    if count > 0 {
        notifications(&state).insert_many(batch).await?;
    }

    audit::record(
        &state.db,
        client.audit(
            AuditLog::new(AuditAction::AdminAction, AuditResource::Notification)
                .by(Some(admin.id))
                .details(json!({ "operation": "broadcast", "recipients": count })),
        ),
    )
    .await;
    tracing::info!(recipients = count, "broadcast delivered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Broadcast sent to {} users", count),
            "count": count,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_must_all_be_object_ids() {
        let good = ObjectId::new().to_hex();
        assert_eq!(parse_recipients(&[good.clone()]).unwrap().len(), 1);
        let err = parse_recipients(&[good, "nope".into()]).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
