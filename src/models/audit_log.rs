use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserCreated,
    UserUpdated,
    UserDeleted,
    UserLogin,
    UserLogout,
    PasswordChanged,
    EmailVerified,
    UserStatusUpdated,
    UserRoleUpdated,
    CampaignCreated,
    CampaignUpdated,
    CampaignDeleted,
    CampaignApproved,
    CampaignRejected,
    CampaignSuspended,
    DonationMade,
    DonationRefunded,
    PaymentProcessed,
    PaymentFailed,
    AdminAction,
    DataExport,
    SettingsChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResource {
    User,
    Campaign,
    Donation,
    Notification,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    #[default]
    Success,
    Failure,
}

/// Append-only record of a sensitive operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ObjectId>,
    pub action: AuditAction,
    pub resource: AuditResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ObjectId>,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub outcome: AuditOutcome,
    pub created_at: BsonDateTime,
}

impl AuditLog {
    pub fn new(action: AuditAction, resource: AuditResource) -> Self {
        AuditLog {
            id: None,
            user: None,
            action,
            resource,
            resource_id: None,
            details: serde_json::Value::Null,
            ip_address: None,
            user_agent: None,
            outcome: AuditOutcome::Success,
            created_at: BsonDateTime::now(),
        }
    }

    pub fn by(mut self, user: Option<ObjectId>) -> Self {
        self.user = user;
        self
    }

    pub fn on(mut self, resource_id: ObjectId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn from_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn failed(mut self) -> Self {
        self.outcome = AuditOutcome::Failure;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub action: AuditAction,
    pub resource: AuditResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub outcome: AuditOutcome,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(log: AuditLog) -> Self {
        AuditLogResponse {
            id: log.id.map(|id| id.to_hex()).unwrap_or_default(),
            user: log.user.map(|u| u.to_hex()),
            action: log.action,
            resource: log.resource,
            resource_id: log.resource_id.map(|r| r.to_hex()),
            details: log.details,
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            outcome: log.outcome,
            created_at: log.created_at.to_chrono(),
        }
    }
}
