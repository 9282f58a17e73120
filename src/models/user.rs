use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::common::{Category, Currency};

/// Single role definition shared by the user schema and route authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    Donor,
    CampaignLeader,
    Admin,
    Public,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::CampaignLeader => "campaign-leader",
            Role::Admin => "admin",
            Role::Public => "public",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "donor" => Some(Role::Donor),
            "campaign-leader" => Some(Role::CampaignLeader),
            "admin" => Some(Role::Admin),
            "public" => Some(Role::Public),
            _ => None,
        }
    }

    /// Roles a visitor may pick for themselves at registration.
    pub fn self_assignable(self) -> bool {
        matches!(self, Role::Donor | Role::CampaignLeader)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DonorLevel {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl DonorLevel {
    /// Lower bound of `totalDonated` for each tier, highest first.
    pub const THRESHOLDS: [(f64, DonorLevel); 4] = [
        (500_000.0, DonorLevel::Diamond),
        (100_000.0, DonorLevel::Platinum),
        (50_000.0, DonorLevel::Gold),
        (10_000.0, DonorLevel::Silver),
    ];

    pub fn from_total(total_donated: f64) -> DonorLevel {
        DonorLevel::THRESHOLDS
            .iter()
            .find(|(min, _)| total_donated >= *min)
            .map(|(_, level)| *level)
            .unwrap_or(DonorLevel::Bronze)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DonorLevel::Bronze => "Bronze",
            DonorLevel::Silver => "Silver",
            DonorLevel::Gold => "Gold",
            DonorLevel::Platinum => "Platinum",
            DonorLevel::Diamond => "Diamond",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStats {
    #[serde(default)]
    pub total_donated: f64,
    #[serde(default)]
    pub donation_count: i64,
    #[serde(default)]
    pub campaigns_supported: i64,
    #[serde(default)]
    pub supported_campaign_ids: Vec<ObjectId>,
    #[serde(default)]
    pub donor_level: DonorLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub preferred_categories: Vec<Category>,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            email_notifications: true,
            currency: Currency::default(),
            preferred_categories: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_banned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_reason: Option<String>,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verification_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verification_expires: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_expires: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<BsonDateTime>,
    #[serde(default)]
    pub login_count: i64,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub donation_stats: DonationStats,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        let now = BsonDateTime::now();
        User {
            id: None,
            name,
            email,
            password_hash,
            role,
            is_active: true,
            is_banned: false,
            ban_reason: None,
            is_email_verified: false,
            email_verification_token: None,
            email_verification_expires: None,
            password_reset_token: None,
            password_reset_expires: None,
            last_login: None,
            login_count: 0,
            profile: Profile::default(),
            preferences: Preferences::default(),
            donation_stats: DonationStats::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public view of a user; never carries the password hash or token hashes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub is_banned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_reason: Option<String>,
    pub is_email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub login_count: i64,
    pub profile: Profile,
    pub preferences: Preferences,
    pub donation_stats: DonationStatsView,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStatsView {
    pub total_donated: f64,
    pub donation_count: i64,
    pub campaigns_supported: i64,
    pub donor_level: DonorLevel,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let stats = user.donation_stats;
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            is_banned: user.is_banned,
            ban_reason: user.ban_reason,
            is_email_verified: user.is_email_verified,
            last_login: user.last_login.map(|d| d.to_chrono()),
            login_count: user.login_count,
            profile: user.profile,
            preferences: user.preferences,
            donation_stats: DonationStatsView {
                total_donated: stats.total_donated,
                donation_count: stats.donation_count,
                campaigns_supported: stats.campaigns_supported,
                donor_level: DonorLevel::from_total(stats.total_donated),
            },
            created_at: user.created_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_spelling_is_shared() {
        for role in [Role::Donor, Role::CampaignLeader, Role::Admin, Role::Public] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("organization"), None);
        assert!(!Role::Admin.self_assignable());
        assert!(Role::CampaignLeader.self_assignable());
    }

    #[test]
    fn donor_level_thresholds() {
        assert_eq!(DonorLevel::from_total(0.0), DonorLevel::Bronze);
        assert_eq!(DonorLevel::from_total(9_999.99), DonorLevel::Bronze);
        assert_eq!(DonorLevel::from_total(10_000.0), DonorLevel::Silver);
        assert_eq!(DonorLevel::from_total(50_000.0), DonorLevel::Gold);
        assert_eq!(DonorLevel::from_total(100_000.0), DonorLevel::Platinum);
        assert_eq!(DonorLevel::from_total(750_000.0), DonorLevel::Diamond);
    }

    #[test]
    fn response_hides_credentials() {
        let mut user = User::new(
            "Ada".into(),
            "ada@example.com".into(),
            "$2b$10$hash".into(),
            Role::Donor,
        );
        user.password_reset_token = Some("abc".into());
        user.donation_stats.total_donated = 12_000.0;

        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("passwordResetToken").is_none());
        assert_eq!(json["donationStats"]["donorLevel"], "Silver");
        assert_eq!(json["role"], "donor");
    }
}
