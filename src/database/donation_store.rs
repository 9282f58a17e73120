//! Persistence for the donation lifecycle.
//!
//! Every state transition is a conditional single-document write, so a
//! donation can move out of `pending` at most once no matter how many
//! confirmation calls and webhook deliveries race on it. Crediting the
//! campaign and donor is claimed per target through a flag on the donation,
//! so a credit that failed after completion is retried by the next
//! confirmation or webhook replay instead of being lost.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    options::ReturnDocument,
    Collection, Database,
};

use crate::database::{
    is_duplicate_key, number, AUDIT_LOGS, CAMPAIGNS, DONATIONS, NOTIFICATIONS, USERS,
};
use crate::errors::{AppError, Result};
use crate::models::{
    audit_log::AuditLog,
    campaign::{Campaign, CampaignStatus},
    donation::{Donation, DonationStatus},
    notification::Notification,
    user::{DonorLevel, User},
};

/// Result of adding one completed donation to a campaign.
#[derive(Debug, Clone)]
pub struct CampaignContribution {
    /// Campaign as it was immediately before the increment.
    pub previous: Campaign,
    pub goal_reached: bool,
}

impl CampaignContribution {
    pub fn new(previous: Campaign, amount: f64) -> Self {
        let goal_reached =
            previous.status == CampaignStatus::Active && previous.raised + amount >= previous.goal;
        CampaignContribution {
            previous,
            goal_reached,
        }
    }
}

/// Aggregate a completed donation is folded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditTarget {
    Campaign,
    Donor,
}

impl CreditTarget {
    pub fn field(self) -> &'static str {
        match self {
            CreditTarget::Campaign => "campaignCredited",
            CreditTarget::Donor => "donorCredited",
        }
    }

    pub fn is_credited(self, donation: &Donation) -> bool {
        match self {
            CreditTarget::Campaign => donation.campaign_credited,
            CreditTarget::Donor => donation.donor_credited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CampaignTotals {
    pub raised: f64,
    pub donation_count: i64,
}

impl CampaignTotals {
    pub fn average(&self) -> f64 {
        if self.donation_count > 0 {
            self.raised / self.donation_count as f64
        } else {
            0.0
        }
    }
}

#[async_trait]
pub trait DonationStore: Send + Sync {
    async fn find_campaign(&self, id: &ObjectId) -> Result<Option<Campaign>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn insert_donation(&self, donation: Donation) -> Result<Donation>;

    async fn find_donation_by_payment_id(&self, payment_id: &str) -> Result<Option<Donation>>;

    /// `pending -> completed`. Returns the updated donation only to the caller
    /// that performed the transition; `None` means it was not pending.
    async fn complete_if_pending(
        &self,
        payment_id: &str,
        receipt_number: &str,
        completed_at: BsonDateTime,
    ) -> Result<Option<Donation>>;

    /// `pending -> failed`, same contract as [`DonationStore::complete_if_pending`].
    async fn fail_if_pending(
        &self,
        payment_id: &str,
        reason: Option<String>,
    ) -> Result<Option<Donation>>;

    /// `false -> true` on the credit flag for `target` of a completed
    /// donation. Only one caller wins; records written before the flag
    /// existed have no field and are never claimed.
    async fn claim_credit(&self, payment_id: &str, target: CreditTarget) -> Result<bool>;

    /// Hands a claimed credit back after the increment failed.
    async fn release_credit(&self, payment_id: &str, target: CreditTarget) -> Result<()>;

    /// Atomically folds one completed donation into the campaign totals and
    /// flips an active campaign to completed once `raised >= goal`.
    async fn apply_campaign_contribution(
        &self,
        campaign_id: &ObjectId,
        amount: f64,
    ) -> Result<Option<CampaignContribution>>;

    /// Atomically folds one completed donation into the donor's statistics.
    /// Returns false when no user owns `email`.
    async fn apply_donor_contribution(
        &self,
        email: &str,
        campaign_id: &ObjectId,
        amount: f64,
    ) -> Result<bool>;

    /// Recomputes `raised`, `donationCount` and the donation analytics from
    /// completed donations, completing an active campaign whose goal is met.
    async fn reconcile_campaign(&self, campaign_id: &ObjectId) -> Result<Option<CampaignTotals>>;

    async fn record_audit(&self, entry: AuditLog) -> Result<()>;

    async fn insert_notification(&self, notification: Notification) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoDonationStore {
    campaigns: Collection<Campaign>,
    users: Collection<User>,
    donations: Collection<Donation>,
    audit_logs: Collection<AuditLog>,
    notifications: Collection<Notification>,
}

impl MongoDonationStore {
    pub fn new(db: &Database) -> Self {
        MongoDonationStore {
            campaigns: db.collection(CAMPAIGNS),
            users: db.collection(USERS),
            donations: db.collection(DONATIONS),
            audit_logs: db.collection(AUDIT_LOGS),
            notifications: db.collection(NOTIFICATIONS),
        }
    }
}

/// `$ifNull` guard so increments work on documents missing the field.
fn or_zero(path: &str) -> Bson {
    Bson::Document(doc! { "$ifNull": [path, 0] })
}

/// `completed` for an active campaign whose `raised` has met its goal,
/// otherwise the current status. Evaluated after `raised` is updated.
fn goal_status() -> Bson {
    Bson::Document(doc! {
        "$cond": [
            { "$and": [
                { "$eq": ["$status", CampaignStatus::Active.as_str()] },
                { "$gte": ["$raised", "$goal"] },
            ]},
            CampaignStatus::Completed.as_str(),
            "$status",
        ]
    })
}

pub(crate) fn campaign_contribution_pipeline(amount: f64, now: BsonDateTime) -> Vec<Document> {
    vec![
        doc! {
            "$set": {
                "raised": { "$add": [or_zero("$raised"), amount] },
                "donationCount": { "$add": [or_zero("$donationCount"), 1] },
                "analytics.donorCount": { "$add": [or_zero("$analytics.donorCount"), 1] },
                "analytics.topDonation": { "$max": [or_zero("$analytics.topDonation"), amount] },
                "updatedAt": now,
            }
        },
        doc! {
            "$set": {
                "analytics.averageDonation": {
                    "$cond": [
                        { "$gt": ["$donationCount", 0] },
                        { "$divide": ["$raised", "$donationCount"] },
                        0,
                    ]
                },
                "status": goal_status(),
            }
        },
    ]
}

pub(crate) fn reconcile_pipeline(
    totals: &CampaignTotals,
    top_donation: f64,
    now: BsonDateTime,
) -> Vec<Document> {
    vec![
        doc! {
            "$set": {
                "raised": totals.raised,
                "donationCount": totals.donation_count,
                "analytics.donorCount": totals.donation_count,
                "analytics.averageDonation": totals.average(),
                "analytics.topDonation": top_donation,
                "updatedAt": now,
            }
        },
        doc! { "$set": { "status": goal_status() } },
    ]
}

pub(crate) fn donor_contribution_pipeline(
    campaign_id: &ObjectId,
    amount: f64,
    now: BsonDateTime,
) -> Vec<Document> {
    let branches: Vec<Document> = DonorLevel::THRESHOLDS
        .iter()
        .map(|(min, level)| {
            doc! {
                "case": { "$gte": ["$donationStats.totalDonated", *min] },
                "then": level.as_str(),
            }
        })
        .collect();

    vec![
        doc! {
            "$set": {
                "donationStats.totalDonated": {
                    "$add": [or_zero("$donationStats.totalDonated"), amount]
                },
                "donationStats.donationCount": {
                    "$add": [or_zero("$donationStats.donationCount"), 1]
                },
                "donationStats.supportedCampaignIds": {
                    "$setUnion": [
                        { "$ifNull": ["$donationStats.supportedCampaignIds", []] },
                        [*campaign_id],
                    ]
                },
                "updatedAt": now,
            }
        },
        doc! {
            "$set": {
                "donationStats.campaignsSupported": {
                    "$size": "$donationStats.supportedCampaignIds"
                },
                "donationStats.donorLevel": {
                    "$switch": {
                        "branches": branches,
                        "default": DonorLevel::Bronze.as_str(),
                    }
                },
            }
        },
    ]
}

#[async_trait]
impl DonationStore for MongoDonationStore {
    async fn find_campaign(&self, id: &ObjectId) -> Result<Option<Campaign>> {
        Ok(self.campaigns.find_one(doc! { "_id": id }).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .find_one(doc! { "email": email.to_lowercase() })
            .await?)
    }

    async fn insert_donation(&self, mut donation: Donation) -> Result<Donation> {
        let result = self.donations.insert_one(&donation).await.map_err(|err| {
            if is_duplicate_key(&err) {
                AppError::Conflict("A donation already exists for this payment".into())
            } else {
                AppError::from(err)
            }
        })?;
        donation.id = result.inserted_id.as_object_id();
        Ok(donation)
    }

    async fn find_donation_by_payment_id(&self, payment_id: &str) -> Result<Option<Donation>> {
        Ok(self
            .donations
            .find_one(doc! { "payment.paymentId": payment_id })
            .await?)
    }

    async fn complete_if_pending(
        &self,
        payment_id: &str,
        receipt_number: &str,
        completed_at: BsonDateTime,
    ) -> Result<Option<Donation>> {
        let filter = doc! {
            "payment.paymentId": payment_id,
            "status": DonationStatus::Pending.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": DonationStatus::Completed.as_str(),
                "completedAt": completed_at,
                "receiptNumber": receipt_number,
                "updatedAt": completed_at,
            }
        };

        Ok(self
            .donations
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn fail_if_pending(
        &self,
        payment_id: &str,
        reason: Option<String>,
    ) -> Result<Option<Donation>> {
        let filter = doc! {
            "payment.paymentId": payment_id,
            "status": DonationStatus::Pending.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": DonationStatus::Failed.as_str(),
                "failureReason": reason,
                "updatedAt": BsonDateTime::now(),
            }
        };

        Ok(self
            .donations
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn claim_credit(&self, payment_id: &str, target: CreditTarget) -> Result<bool> {
        let result = self
            .donations
            .update_one(
                doc! {
                    "payment.paymentId": payment_id,
                    "status": DonationStatus::Completed.as_str(),
                    target.field(): false,
                },
                doc! { "$set": { target.field(): true } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn release_credit(&self, payment_id: &str, target: CreditTarget) -> Result<()> {
        self.donations
            .update_one(
                doc! { "payment.paymentId": payment_id, target.field(): true },
                doc! { "$set": { target.field(): false } },
            )
            .await?;
        Ok(())
    }

    async fn apply_campaign_contribution(
        &self,
        campaign_id: &ObjectId,
        amount: f64,
    ) -> Result<Option<CampaignContribution>> {
        let previous = self
            .campaigns
            .find_one_and_update(
                doc! { "_id": campaign_id },
                campaign_contribution_pipeline(amount, BsonDateTime::now()),
            )
            .return_document(ReturnDocument::Before)
            .await?;

        Ok(previous.map(|campaign| CampaignContribution::new(campaign, amount)))
    }

    async fn apply_donor_contribution(
        &self,
        email: &str,
        campaign_id: &ObjectId,
        amount: f64,
    ) -> Result<bool> {
        let result = self
            .users
            .update_one(
                doc! { "email": email.to_lowercase() },
                donor_contribution_pipeline(campaign_id, amount, BsonDateTime::now()),
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn reconcile_campaign(&self, campaign_id: &ObjectId) -> Result<Option<CampaignTotals>> {
        let pipeline = vec![
            doc! { "$match": {
                "campaign": campaign_id,
                "status": DonationStatus::Completed.as_str(),
            }},
            doc! { "$group": {
                "_id": Bson::Null,
                "raised": { "$sum": "$amount" },
                "count": { "$sum": 1 },
                "top": { "$max": "$amount" },
            }},
        ];

        let rows: Vec<Document> = self
            .donations
            .clone_with_type::<Document>()
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;
        let row = rows.into_iter().next().unwrap_or_default();

        let totals = CampaignTotals {
            raised: number(&row, "raised"),
            donation_count: number(&row, "count") as i64,
        };

        let result = self
            .campaigns
            .update_one(
                doc! { "_id": campaign_id },
                reconcile_pipeline(&totals, number(&row, "top"), BsonDateTime::now()),
            )
            .await?;

        Ok((result.matched_count > 0).then_some(totals))
    }

    async fn record_audit(&self, entry: AuditLog) -> Result<()> {
        self.audit_logs.insert_one(entry).await?;
        Ok(())
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        self.notifications.insert_one(notification).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::Category;

    fn campaign(status: CampaignStatus, goal: f64, raised: f64) -> Campaign {
        let now = BsonDateTime::now();
        Campaign {
            id: Some(ObjectId::new()),
            title: "Clean water".into(),
            description: "Wells".into(),
            short_description: String::new(),
            goal,
            raised,
            currency: Default::default(),
            category: Category::Health,
            organization_name: String::new(),
            image_url: None,
            creator: ObjectId::new(),
            status,
            approval_status: Default::default(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            suspension_reason: None,
            start_date: now,
            end_date: now,
            donation_count: 0,
            updates: Vec::new(),
            impact_reports: Vec::new(),
            analytics: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn goal_reached_only_for_active_campaigns_crossing_the_goal() {
        assert!(!CampaignContribution::new(campaign(CampaignStatus::Active, 50_000.0, 15_750.0), 2_500.0).goal_reached);
        assert!(CampaignContribution::new(campaign(CampaignStatus::Active, 50_000.0, 18_250.0), 40_000.0).goal_reached);
        assert!(!CampaignContribution::new(campaign(CampaignStatus::Completed, 50_000.0, 58_250.0), 10.0).goal_reached);
    }

    #[test]
    fn donor_pipeline_checks_tiers_highest_first() {
        let pipeline = donor_contribution_pipeline(&ObjectId::new(), 10.0, BsonDateTime::now());
        assert_eq!(pipeline.len(), 2);
        let branches = pipeline[1]
            .get_document("$set")
            .and_then(|s| s.get_document("donationStats.donorLevel"))
            .and_then(|l| l.get_document("$switch"))
            .and_then(|s| s.get_array("branches"))
            .unwrap();
        let levels: Vec<&str> = branches
            .iter()
            .filter_map(|b| b.as_document())
            .filter_map(|b| b.get_str("then").ok())
            .collect();
        assert_eq!(levels, ["Diamond", "Platinum", "Gold", "Silver"]);
    }

    #[test]
    fn reconcile_pipeline_rewrites_analytics_and_checks_the_goal() {
        let totals = CampaignTotals { raised: 90.0, donation_count: 3 };
        let pipeline = reconcile_pipeline(&totals, 50.0, BsonDateTime::now());
        let first = pipeline[0].get_document("$set").unwrap();
        assert_eq!(first.get_f64("raised").unwrap(), 90.0);
        assert_eq!(first.get_i64("donationCount").unwrap(), 3);
        assert_eq!(first.get_f64("analytics.averageDonation").unwrap(), 30.0);
        assert_eq!(first.get_f64("analytics.topDonation").unwrap(), 50.0);
        assert!(pipeline[1].get_document("$set").unwrap().contains_key("status"));
    }

    #[test]
    fn credit_targets_map_to_donation_flags() {
        assert_eq!(CreditTarget::Campaign.field(), "campaignCredited");
        assert_eq!(CreditTarget::Donor.field(), "donorCredited");
    }

    #[test]
    fn campaign_pipeline_flips_status_in_the_same_update() {
        let pipeline = campaign_contribution_pipeline(25.0, BsonDateTime::now());
        let second = pipeline[1].get_document("$set").unwrap();
        assert!(second.contains_key("status"));
        assert!(second.contains_key("analytics.averageDonation"));
    }
}
