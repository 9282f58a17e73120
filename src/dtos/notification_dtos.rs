use serde::Deserialize;
use validator::Validate;

use crate::models::common::PageRequest;
use crate::models::notification::NotificationType;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub unread: Option<bool>,
}

impl NotificationQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, 20)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    #[validate(length(min = 1, max = 500, message = "Recipients array is required"))]
    pub recipients: Vec<String>,

    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,

    #[validate(length(min = 1, max = 150, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, max = 2000, message = "Message is required"))]
    pub message: String,

    #[serde(default)]
    pub data: serde_json::Value,

    pub action_url: Option<String>,

    pub action_text: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,

    #[validate(length(min = 1, max = 150, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, max = 2000, message = "Message is required"))]
    pub message: String,

    #[serde(default)]
    pub data: serde_json::Value,

    pub action_url: Option<String>,

    pub action_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferencesRequest {
    pub email_notifications: bool,
}
