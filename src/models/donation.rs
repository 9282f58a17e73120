use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::models::common::Currency;

pub const MIN_DONATION: f64 = 1.0;
pub const MAX_DONATION: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl DonationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Completed => "completed",
            DonationStatus::Failed => "failed",
            DonationStatus::Cancelled => "cancelled",
            DonationStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, DonationStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGatewayKind {
    #[default]
    Stripe,
    Payhere,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_id: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub processing_fee: f64,
    #[serde(default)]
    pub net_amount: f64,
    #[serde(default)]
    pub payment_gateway: PaymentGatewayKind,
}

fn default_payment_method() -> String {
    "card".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurring {
    pub frequency: RecurringFrequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "web".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub amount: f64,
    #[serde(default)]
    pub currency: Currency,
    pub campaign: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor: Option<ObjectId>,
    pub donor_email: String,
    pub donor_name: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub payment: Payment,
    #[serde(default)]
    pub status: DonationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
    #[serde(default)]
    pub metadata: DonationMetadata,
    /// Set once the campaign totals include this donation.
    #[serde(default)]
    pub campaign_credited: bool,
    /// Set once the donor's statistics include this donation.
    #[serde(default)]
    pub donor_credited: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl Donation {
    /// Name safe to show publicly.
    pub fn display_name(&self) -> &str {
        if self.is_anonymous {
            "Anonymous"
        } else {
            &self.donor_name
        }
    }
}

/// `RCP-<unix millis>-<9 uppercase alphanumerics>`.
pub fn generate_receipt_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("RCP-{}-{}", now.timestamp_millis(), suffix)
}

/// Donation as shown to its donor or an admin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationResponse {
    pub id: String,
    pub amount: f64,
    pub currency: Currency,
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_title: Option<String>,
    pub donor_name: String,
    pub donor_email: String,
    pub is_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: DonationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DonationResponse {
    pub fn new(donation: Donation, campaign_title: Option<String>) -> Self {
        DonationResponse {
            id: donation.id.map(|id| id.to_hex()).unwrap_or_default(),
            amount: donation.amount,
            currency: donation.currency,
            campaign_id: donation.campaign.to_hex(),
            campaign_title,
            donor_name: donation.donor_name,
            donor_email: donation.donor_email,
            is_anonymous: donation.is_anonymous,
            message: donation.message,
            status: donation.status,
            receipt_number: donation.receipt_number,
            completed_at: donation.completed_at.map(|d| d.to_chrono()),
            created_at: donation.created_at.to_chrono(),
        }
    }
}

/// Donation as shown on public pages: no email, anonymity honoured.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDonation {
    pub id: String,
    pub donor_name: String,
    pub amount: f64,
    pub currency: Currency,
    pub is_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PublicDonation {
    pub fn new(donation: Donation, campaign_title: Option<String>) -> Self {
        PublicDonation {
            id: donation.id.map(|id| id.to_hex()).unwrap_or_default(),
            donor_name: donation.display_name().to_string(),
            amount: donation.amount,
            currency: donation.currency,
            is_anonymous: donation.is_anonymous,
            message: donation.message,
            campaign_id: donation.campaign.to_hex(),
            campaign_title,
            created_at: donation.created_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donation(is_anonymous: bool) -> Donation {
        let now = BsonDateTime::now();
        Donation {
            id: Some(ObjectId::new()),
            amount: 25.0,
            currency: Currency::Usd,
            campaign: ObjectId::new(),
            donor: None,
            donor_email: "kim@example.com".into(),
            donor_name: "Kim".into(),
            is_anonymous,
            message: None,
            payment: Payment {
                payment_id: "pi_1".into(),
                payment_method: default_payment_method(),
                processing_fee: 0.0,
                net_amount: 25.0,
                payment_gateway: PaymentGatewayKind::Stripe,
            },
            status: DonationStatus::Pending,
            failure_reason: None,
            completed_at: None,
            receipt_number: None,
            recurring: None,
            metadata: DonationMetadata::default(),
            campaign_credited: false,
            donor_credited: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn anonymous_donors_are_hidden() {
        let public = PublicDonation::new(donation(true), None);
        assert_eq!(public.donor_name, "Anonymous");
        let public = PublicDonation::new(donation(false), None);
        assert_eq!(public.donor_name, "Kim");
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("donorEmail").is_none());
    }

    #[test]
    fn receipt_number_format() {
        let now = Utc::now();
        let receipt = generate_receipt_number(now);
        let parts: Vec<&str> = receipt.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RCP");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn only_pending_is_open() {
        assert!(!DonationStatus::Pending.is_terminal());
        for status in [
            DonationStatus::Completed,
            DonationStatus::Failed,
            DonationStatus::Cancelled,
            DonationStatus::Refunded,
        ] {
            assert!(status.is_terminal());
        }
    }
}
