use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DonationReceived,
    CampaignUpdate,
    CampaignApproved,
    CampaignRejected,
    CampaignCompleted,
    SystemAlert,
    SystemAnnouncement,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipient: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ObjectId>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_text: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
}

impl Notification {
    pub fn new(
        recipient: ObjectId,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Notification {
            id: None,
            recipient,
            sender: None,
            notification_type,
            title: title.into(),
            message: message.into(),
            data: serde_json::Value::Null,
            action_url: None,
            action_text: None,
            is_read: false,
            read_at: None,
            created_at: BsonDateTime::now(),
        }
    }

    pub fn from_sender(mut self, sender: ObjectId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_action(mut self, url: Option<String>, text: Option<String>) -> Self {
        self.action_url = url;
        self.action_text = text;
        self
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_text: Option<String>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            id: n.id.map(|id| id.to_hex()).unwrap_or_default(),
            notification_type: n.notification_type,
            title: n.title,
            message: n.message,
            data: n.data,
            sender: n.sender.map(|s| s.to_hex()),
            action_url: n.action_url,
            action_text: n.action_text,
            is_read: n.is_read,
            read_at: n.read_at.map(|d| d.to_chrono()),
            created_at: n.created_at.to_chrono(),
        }
    }
}
