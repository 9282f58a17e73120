use mongodb::bson::{doc, Document, Regex};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::dtos::campaign_dtos::escape_regex;
use crate::models::campaign::CampaignStatus;
use crate::models::common::PageRequest;
use crate::models::user::Role;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl UserListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, 20)
    }

    pub fn filter(&self) -> Document {
        let mut filter = Document::new();
        if let Some(role) = self.role {
            filter.insert("role", role.as_str());
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = Regex {
                pattern: escape_regex(search),
                options: "i".to_string(),
            };
            filter.insert(
                "$or",
                vec![doc! { "name": pattern.clone() }, doc! { "email": pattern }],
            );
        }
        filter
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<CampaignStatus>,
}

impl CampaignListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, 20)
    }

    pub fn filter(&self) -> Document {
        match self.status {
            Some(status) => doc! { "status": status.as_str() },
            None => Document::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub action: Option<String>,
    pub resource: Option<String>,
}

impl AuditLogQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, 50)
    }

    pub fn filter(&self) -> Document {
        let mut filter = Document::new();
        if let Some(action) = self.action.as_deref().filter(|a| !a.is_empty()) {
            filter.insert("action", action);
        }
        if let Some(resource) = self.resource.as_deref().filter(|r| !r.is_empty()) {
            filter.insert("resource", resource);
        }
        filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
        }
    }

    /// Update applied to the user document for this status.
    pub fn update_document(self, reason: Option<&str>) -> Document {
        match self {
            AccountStatus::Active => doc! {
                "$set": { "isActive": true, "isBanned": false },
                "$unset": { "banReason": "" },
            },
            AccountStatus::Suspended => doc! {
                "$set": { "isActive": false, "isBanned": false },
                "$unset": { "banReason": "" },
            },
            AccountStatus::Banned => {
                let mut set = doc! { "isBanned": true };
                if let Some(reason) = reason {
                    set.insert("banReason", reason);
                }
                doc! { "$set": set }
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UserStatusRequest {
    pub status: AccountStatus,
    #[validate(length(max = 500, message = "Reason cannot be more than 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    pub platform: PlatformSection,
    pub donations: DonationSection,
    pub campaigns: CampaignSection,
    pub notifications: NotificationSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSection {
    pub name: String,
    pub description: String,
    pub maintenance_mode: bool,
    pub registration_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DonationSection {
    pub minimum_amount: f64,
    pub maximum_amount: f64,
    pub platform_fee_percentage: f64,
    pub allow_anonymous_donations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSection {
    pub require_approval: bool,
    pub maximum_duration: u32,
    pub allow_image_uploads: bool,
    pub maximum_images: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSection {
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        PlatformSettings {
            platform: PlatformSection {
                name: "ImpactHub".into(),
                description: "A platform for charitable campaigns".into(),
                maintenance_mode: false,
                registration_enabled: true,
            },
            donations: DonationSection {
                minimum_amount: crate::models::donation::MIN_DONATION,
                maximum_amount: crate::models::donation::MAX_DONATION,
                platform_fee_percentage: 5.0,
                allow_anonymous_donations: true,
            },
            campaigns: CampaignSection {
                require_approval: true,
                maximum_duration: 365,
                allow_image_uploads: true,
                maximum_images: 10,
            },
            notifications: NotificationSection {
                email_enabled: true,
                sms_enabled: false,
                push_enabled: true,
            },
        }
    }
}

impl PlatformSettings {
    pub fn validate_values(&self) -> Result<(), String> {
        let d = &self.donations;
        if d.minimum_amount <= 0.0 || d.maximum_amount < d.minimum_amount {
            return Err("Donation limits must satisfy 0 < minimum <= maximum".into());
        }
        if !(0.0..=100.0).contains(&d.platform_fee_percentage) {
            return Err("Platform fee must be between 0 and 100 percent".into());
        }
        if self.campaigns.maximum_duration == 0 {
            return Err("Maximum campaign duration must be at least one day".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub settings: PlatformSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_filter_searches_name_and_email() {
        let query = UserListQuery {
            role: Some(Role::CampaignLeader),
            search: Some("ada".into()),
            ..Default::default()
        };
        let filter = query.filter();
        assert_eq!(filter.get_str("role").unwrap(), "campaign-leader");
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
        assert!(UserListQuery::default().filter().is_empty());
    }

    #[test]
    fn account_status_updates() {
        let banned = AccountStatus::Banned.update_document(Some("fraud"));
        let set = banned.get_document("$set").unwrap();
        assert!(set.get_bool("isBanned").unwrap());
        assert_eq!(set.get_str("banReason").unwrap(), "fraud");

        let active = AccountStatus::Active.update_document(None);
        assert!(active.get_document("$set").unwrap().get_bool("isActive").unwrap());
        assert!(active.get_document("$unset").unwrap().contains_key("banReason"));

        let suspended = AccountStatus::Suspended.update_document(None);
        assert!(!suspended.get_document("$set").unwrap().get_bool("isActive").unwrap());
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = PlatformSettings::default();
        assert!(settings.validate_values().is_ok());

        let mut bad = settings.clone();
        bad.donations.maximum_amount = 0.5;
        assert!(bad.validate_values().is_err());

        let mut bad = settings;
        bad.donations.platform_fee_percentage = 150.0;
        assert!(bad.validate_values().is_err());
    }
}
