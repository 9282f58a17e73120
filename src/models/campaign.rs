use chrono::{DateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};

use crate::models::common::{Category, Currency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    #[default]
    Pending,
    Active,
    Completed,
    Suspended,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Pending => "pending",
            CampaignStatus::Active => "active",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Suspended => "suspended",
            CampaignStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub donor_count: i64,
    #[serde(default)]
    pub average_donation: f64,
    #[serde(default)]
    pub top_donation: f64,
    #[serde(default)]
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignUpdate {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ObjectId>,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub report_date: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    pub goal: f64,
    #[serde(default)]
    pub raised: f64,
    #[serde(default)]
    pub currency: Currency,
    pub category: Category,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub creator: ObjectId,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    pub start_date: BsonDateTime,
    pub end_date: BsonDateTime,
    #[serde(default)]
    pub donation_count: i64,
    #[serde(default)]
    pub updates: Vec<CampaignUpdate>,
    #[serde(default)]
    pub impact_reports: Vec<ImpactReport>,
    #[serde(default)]
    pub analytics: Analytics,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// `min(round(raised / goal * 100), 100)`, or 0 for a non-positive goal.
pub fn progress_percentage(raised: f64, goal: f64) -> f64 {
    if goal <= 0.0 {
        return 0.0;
    }
    (raised / goal * 100.0).round().clamp(0.0, 100.0)
}

/// Whole days until `end`, rounded up, never negative.
pub fn days_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 86_399) / 86_400
}

const VIEW_WEIGHT: f64 = 0.3;
const DONOR_WEIGHT: f64 = 0.4;
const SHARE_WEIGHT: f64 = 0.3;

/// Weighted popularity used by the trending listing, as an aggregation
/// expression over a campaign document. Missing counters count as zero.
pub fn trending_score_expr() -> Document {
    let weighted = |path: &str, weight: f64| doc! { "$multiply": [{ "$ifNull": [path, 0] }, weight] };
    doc! {
        "$add": [
            weighted("$analytics.views", VIEW_WEIGHT),
            weighted("$analytics.donorCount", DONOR_WEIGHT),
            weighted("$analytics.shares", SHARE_WEIGHT),
        ]
    }
}

impl Campaign {
    pub fn progress_percentage(&self) -> f64 {
        progress_percentage(self.raised, self.goal)
    }

    pub fn days_remaining(&self) -> i64 {
        days_remaining(self.end_date.to_chrono(), Utc::now())
    }

    pub fn accepts_donations(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignUpdateView {
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReportView {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub report_date: DateTime<Utc>,
}

impl From<CampaignUpdate> for CampaignUpdateView {
    fn from(update: CampaignUpdate) -> Self {
        CampaignUpdateView {
            title: update.title,
            content: update.content,
            created_at: update.created_at.to_chrono(),
        }
    }
}

impl From<ImpactReport> for ImpactReportView {
    fn from(report: ImpactReport) -> Self {
        ImpactReportView {
            title: report.title,
            description: report.description,
            attachment_url: report.attachment_url,
            report_date: report.report_date.to_chrono(),
        }
    }
}

/// Campaign as returned by the API, with derived fields filled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub goal: f64,
    pub raised: f64,
    pub currency: Currency,
    pub category: Category,
    pub organization_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub creator: String,
    pub status: CampaignStatus,
    pub approval_status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub donation_count: i64,
    pub analytics: Analytics,
    pub progress_percentage: f64,
    pub days_remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<CampaignUpdateView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_reports: Option<Vec<ImpactReportView>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignResponse {
    /// Listing view: embedded updates and impact reports are left out.
    pub fn summary(campaign: Campaign) -> Self {
        Self::build(campaign, false)
    }

    pub fn detail(campaign: Campaign) -> Self {
        Self::build(campaign, true)
    }

    fn build(campaign: Campaign, with_embedded: bool) -> Self {
        let progress = campaign.progress_percentage();
        let days = campaign.days_remaining();
        let (updates, impact_reports) = if with_embedded {
            (
                Some(campaign.updates.into_iter().map(Into::into).collect()),
                Some(campaign.impact_reports.into_iter().map(Into::into).collect()),
            )
        } else {
            (None, None)
        };

        CampaignResponse {
            id: campaign.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: campaign.title,
            description: campaign.description,
            short_description: campaign.short_description,
            goal: campaign.goal,
            raised: campaign.raised,
            currency: campaign.currency,
            category: campaign.category,
            organization_name: campaign.organization_name,
            image_url: campaign.image_url,
            creator: campaign.creator.to_hex(),
            status: campaign.status,
            approval_status: campaign.approval_status,
            rejection_reason: campaign.rejection_reason,
            suspension_reason: campaign.suspension_reason,
            start_date: campaign.start_date.to_chrono(),
            end_date: campaign.end_date.to_chrono(),
            donation_count: campaign.donation_count,
            analytics: campaign.analytics,
            progress_percentage: progress,
            days_remaining: days,
            updates,
            impact_reports,
            created_at: campaign.created_at.to_chrono(),
            updated_at: campaign.updated_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn progress_is_rounded_and_capped() {
        assert_eq!(progress_percentage(15_750.0, 50_000.0), 32.0);
        assert_eq!(progress_percentage(58_250.0, 50_000.0), 100.0);
        assert_eq!(progress_percentage(1.0, 3.0), 33.0);
        assert_eq!(progress_percentage(100.0, 0.0), 0.0);
    }

    #[test]
    fn days_remaining_rounds_up_and_floors_at_zero() {
        let now = Utc::now();
        assert_eq!(days_remaining(now + Duration::hours(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(3), now), 3);
        assert_eq!(days_remaining(now + Duration::days(3) + Duration::seconds(1), now), 4);
        assert_eq!(days_remaining(now - Duration::days(2), now), 0);
    }

    #[test]
    fn trending_weights() {
        let expr = trending_score_expr();
        let terms: Vec<(String, f64)> = expr
            .get_array("$add")
            .unwrap()
            .iter()
            .filter_map(|term| term.as_document()?.get_array("$multiply").ok())
            .map(|factors| {
                let path = factors[0]
                    .as_document()
                    .and_then(|d| d.get_array("$ifNull").ok())
                    .and_then(|a| a[0].as_str())
                    .unwrap()
                    .to_string();
                (path, factors[1].as_f64().unwrap())
            })
            .collect();
        assert_eq!(
            terms,
            [
                ("$analytics.views".to_string(), 0.3),
                ("$analytics.donorCount".to_string(), 0.4),
                ("$analytics.shares".to_string(), 0.3),
            ]
        );
    }

    #[test]
    fn status_spelling() {
        assert_eq!(
            serde_json::to_string(&CampaignStatus::Suspended).unwrap(),
            "\"suspended\""
        );
        assert_eq!(CampaignStatus::Active.as_str(), "active");
    }
}
