//! In-process ledger store for exercising the donation lifecycle in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};

use crate::database::donation_store::{
    CampaignContribution, CampaignTotals, CreditTarget, DonationStore,
};
use crate::errors::{AppError, Result};
use crate::models::{
    audit_log::AuditLog,
    campaign::{Campaign, CampaignStatus},
    donation::{Donation, DonationStatus},
    notification::Notification,
    user::{DonorLevel, User},
};

#[derive(Default)]
struct Tables {
    campaigns: Vec<Campaign>,
    users: Vec<User>,
    donations: Vec<Donation>,
    audit_logs: Vec<AuditLog>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Makes the next campaign increment fail, as a dropped connection would.
    pub fail_next_campaign_credit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn add_campaign(&self, mut campaign: Campaign) -> ObjectId {
        let id = *campaign.id.get_or_insert_with(ObjectId::new);
        self.lock().campaigns.push(campaign);
        id
    }

    pub fn add_user(&self, mut user: User) -> ObjectId {
        let id = *user.id.get_or_insert_with(ObjectId::new);
        self.lock().users.push(user);
        id
    }

    pub fn campaign(&self, id: &ObjectId) -> Option<Campaign> {
        self.lock().campaigns.iter().find(|c| c.id.as_ref() == Some(id)).cloned()
    }

    pub fn user(&self, email: &str) -> Option<User> {
        self.lock().users.iter().find(|u| u.email == email).cloned()
    }

    pub fn donations(&self) -> Vec<Donation> {
        self.lock().donations.clone()
    }

    pub fn audit_logs(&self) -> Vec<AuditLog> {
        self.lock().audit_logs.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    /// Overwrites campaign totals, e.g. to simulate increments lost in a crash.
    pub fn set_campaign_raised(&self, id: &ObjectId, raised: f64, donation_count: i64) {
        let mut tables = self.lock();
        if let Some(c) = tables.campaigns.iter_mut().find(|c| c.id.as_ref() == Some(id)) {
            c.raised = raised;
            c.donation_count = donation_count;
        }
    }

    pub fn set_campaign_status(&self, id: &ObjectId, status: CampaignStatus) {
        let mut tables = self.lock();
        if let Some(c) = tables.campaigns.iter_mut().find(|c| c.id.as_ref() == Some(id)) {
            c.status = status;
        }
    }

    fn credit_flag(donation: &mut Donation, target: CreditTarget) -> &mut bool {
        match target {
            CreditTarget::Campaign => &mut donation.campaign_credited,
            CreditTarget::Donor => &mut donation.donor_credited,
        }
    }

    fn transition(
        &self,
        payment_id: &str,
        apply: impl FnOnce(&mut Donation),
    ) -> Option<Donation> {
        let mut tables = self.lock();
        let donation = tables.donations.iter_mut().find(|d| {
            d.payment.payment_id == payment_id && d.status == DonationStatus::Pending
        })?;
        apply(donation);
        Some(donation.clone())
    }
}

#[async_trait]
impl DonationStore for MemoryStore {
    async fn find_campaign(&self, id: &ObjectId) -> Result<Option<Campaign>> {
        Ok(self.campaign(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.user(&email.to_lowercase()))
    }

    async fn insert_donation(&self, mut donation: Donation) -> Result<Donation> {
        let mut tables = self.lock();
        if tables
            .donations
            .iter()
            .any(|d| d.payment.payment_id == donation.payment.payment_id)
        {
            return Err(AppError::Conflict("duplicate payment id".into()));
        }
        donation.id = Some(ObjectId::new());
        tables.donations.push(donation.clone());
        Ok(donation)
    }

    async fn find_donation_by_payment_id(&self, payment_id: &str) -> Result<Option<Donation>> {
        Ok(self
            .lock()
            .donations
            .iter()
            .find(|d| d.payment.payment_id == payment_id)
            .cloned())
    }

    async fn complete_if_pending(
        &self,
        payment_id: &str,
        receipt_number: &str,
        completed_at: BsonDateTime,
    ) -> Result<Option<Donation>> {
        Ok(self.transition(payment_id, |d| {
            d.status = DonationStatus::Completed;
            d.completed_at = Some(completed_at);
            d.receipt_number = Some(receipt_number.to_string());
            d.updated_at = completed_at;
        }))
    }

    async fn fail_if_pending(
        &self,
        payment_id: &str,
        reason: Option<String>,
    ) -> Result<Option<Donation>> {
        Ok(self.transition(payment_id, |d| {
            d.status = DonationStatus::Failed;
            d.failure_reason = reason;
        }))
    }

    async fn claim_credit(&self, payment_id: &str, target: CreditTarget) -> Result<bool> {
        let mut tables = self.lock();
        let Some(donation) = tables.donations.iter_mut().find(|d| {
            d.payment.payment_id == payment_id && d.status == DonationStatus::Completed
        }) else {
            return Ok(false);
        };
        let flag = Self::credit_flag(donation, target);
        if *flag {
            return Ok(false);
        }
        *flag = true;
        Ok(true)
    }

    async fn release_credit(&self, payment_id: &str, target: CreditTarget) -> Result<()> {
        let mut tables = self.lock();
        if let Some(donation) = tables
            .donations
            .iter_mut()
            .find(|d| d.payment.payment_id == payment_id)
        {
            *Self::credit_flag(donation, target) = false;
        }
        Ok(())
    }

    async fn apply_campaign_contribution(
        &self,
        campaign_id: &ObjectId,
        amount: f64,
    ) -> Result<Option<CampaignContribution>> {
        if self.fail_next_campaign_credit.swap(false, Ordering::SeqCst) {
            return Err(AppError::Internal("campaign store unavailable".into()));
        }
        let mut tables = self.lock();
        let Some(campaign) = tables
            .campaigns
            .iter_mut()
            .find(|c| c.id.as_ref() == Some(campaign_id))
        else {
            return Ok(None);
        };

        let previous = campaign.clone();
        campaign.raised += amount;
        campaign.donation_count += 1;
        campaign.analytics.donor_count += 1;
        campaign.analytics.top_donation = campaign.analytics.top_donation.max(amount);
        campaign.analytics.average_donation = campaign.raised / campaign.donation_count as f64;
        if campaign.status == CampaignStatus::Active && campaign.raised >= campaign.goal {
            campaign.status = CampaignStatus::Completed;
        }

        Ok(Some(CampaignContribution::new(previous, amount)))
    }

    async fn apply_donor_contribution(
        &self,
        email: &str,
        campaign_id: &ObjectId,
        amount: f64,
    ) -> Result<bool> {
        let email = email.to_lowercase();
        let mut tables = self.lock();
        let Some(user) = tables.users.iter_mut().find(|u| u.email == email) else {
            return Ok(false);
        };

        let stats = &mut user.donation_stats;
        stats.total_donated += amount;
        stats.donation_count += 1;
        if !stats.supported_campaign_ids.contains(campaign_id) {
            stats.supported_campaign_ids.push(*campaign_id);
        }
        stats.campaigns_supported = stats.supported_campaign_ids.len() as i64;
        stats.donor_level = DonorLevel::from_total(stats.total_donated);
        Ok(true)
    }

    async fn reconcile_campaign(&self, campaign_id: &ObjectId) -> Result<Option<CampaignTotals>> {
        let mut tables = self.lock();
        let completed: Vec<f64> = tables
            .donations
            .iter()
            .filter(|d| &d.campaign == campaign_id && d.status == DonationStatus::Completed)
            .map(|d| d.amount)
            .collect();
        let totals = CampaignTotals {
            raised: completed.iter().sum(),
            donation_count: completed.len() as i64,
        };
        let top_donation = completed.iter().copied().fold(0.0, f64::max);

        let Some(campaign) = tables
            .campaigns
            .iter_mut()
            .find(|c| c.id.as_ref() == Some(campaign_id))
        else {
            return Ok(None);
        };
        campaign.raised = totals.raised;
        campaign.donation_count = totals.donation_count;
        campaign.analytics.donor_count = totals.donation_count;
        campaign.analytics.average_donation = totals.average();
        campaign.analytics.top_donation = top_donation;
        if campaign.status == CampaignStatus::Active && campaign.raised >= campaign.goal {
            campaign.status = CampaignStatus::Completed;
        }
        Ok(Some(totals))
    }

    async fn record_audit(&self, entry: AuditLog) -> Result<()> {
        self.lock().audit_logs.push(entry);
        Ok(())
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        self.lock().notifications.push(notification);
        Ok(())
    }
}
