//! Donation lifecycle: payment intent, confirmation and webhook settlement.
//!
//! A donation leaves `pending` through a single conditional write in the
//! store. Whichever path wins that swap (client confirmation or gateway
//! webhook) reports the completion. The campaign and donor increments are
//! each claimed through a flag on the donation before they are applied, and
//! a claim is handed back when its increment fails, so a later confirmation
//! or webhook replay finishes the credit exactly once.

use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde_json::json;

use crate::database::donation_store::{
    CampaignContribution, CampaignTotals, CreditTarget, DonationStore,
};
use crate::errors::{AppError, Result};
use crate::models::{
    audit_log::{AuditAction, AuditLog, AuditResource},
    common::{parse_object_id, Currency},
    donation::{
        generate_receipt_number, Donation, DonationMetadata, DonationStatus, Payment,
        PaymentGatewayKind, MAX_DONATION, MIN_DONATION,
    },
    notification::{Notification, NotificationType},
};
use crate::services::payment_gateway::{
    parse_event, to_minor_units, verify_webhook_signature, GatewayEvent, IntentRequest,
    IntentStatus, PaymentGateway,
};

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub campaign_id: String,
    pub amount: f64,
    pub currency: Currency,
    pub donor_email: String,
    pub donor_name: String,
    pub message: Option<String>,
    pub is_anonymous: bool,
    pub metadata: DonationMetadata,
}

#[derive(Debug, Clone)]
pub struct PaymentIntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub donation: Donation,
}

#[derive(Debug, Clone)]
pub enum Confirmation {
    /// This call moved the donation to `completed` and applied the totals.
    Completed(Donation),
    /// The donation had already been settled by an earlier call.
    AlreadyConfirmed(Donation),
}

impl Confirmation {
    pub fn donation(&self) -> &Donation {
        match self {
            Confirmation::Completed(d) | Confirmation::AlreadyConfirmed(d) => d,
        }
    }

    pub fn into_donation(self) -> Donation {
        match self {
            Confirmation::Completed(d) | Confirmation::AlreadyConfirmed(d) => d,
        }
    }

    pub fn already_confirmed(&self) -> bool {
        matches!(self, Confirmation::AlreadyConfirmed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Completed,
    AlreadySettled,
    Failed,
    UnknownIntent,
    Ignored(String),
}

pub struct DonationService {
    store: Arc<dyn DonationStore>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: String,
}

impl DonationService {
    pub fn new(
        store: Arc<dyn DonationStore>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        DonationService {
            store,
            gateway,
            webhook_secret: webhook_secret.into(),
        }
    }

    pub async fn create_payment_intent(&self, request: NewDonation) -> Result<PaymentIntentCreated> {
        validate_new_donation(&request)?;
        let campaign_id = parse_object_id(&request.campaign_id, "campaign")?;

        let campaign = self
            .store
            .find_campaign(&campaign_id)
            .await?
            .ok_or_else(|| AppError::not_found("Campaign not found"))?;
        if !campaign.accepts_donations() {
            return Err(AppError::InvalidState(
                "Campaign is not accepting donations".into(),
            ));
        }

        let donor_email = request.donor_email.trim().to_lowercase();
        let intent = self
            .gateway
            .create_intent(&IntentRequest {
                amount_minor: to_minor_units(request.amount),
                currency: request.currency,
                campaign_id: campaign_id.to_hex(),
                donor_email: donor_email.clone(),
                donor_name: request.donor_name.clone(),
                is_anonymous: request.is_anonymous,
                message: request.message.clone(),
            })
            .await?;
        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| AppError::external_service("payment intent has no client secret"))?;

        let donor = self
            .store
            .find_user_by_email(&donor_email)
            .await?
            .and_then(|u| u.id);

        let now = BsonDateTime::now();
        let donation = Donation {
            id: None,
            amount: request.amount,
            currency: request.currency,
            campaign: campaign_id,
            donor,
            donor_email,
            donor_name: request.donor_name.trim().to_string(),
            is_anonymous: request.is_anonymous,
            message: request.message.filter(|m| !m.trim().is_empty()),
            payment: Payment {
                payment_id: intent.id.clone(),
                payment_method: "card".to_string(),
                processing_fee: 0.0,
                net_amount: request.amount,
                payment_gateway: PaymentGatewayKind::Stripe,
            },
            status: DonationStatus::Pending,
            failure_reason: None,
            completed_at: None,
            receipt_number: None,
            recurring: None,
            metadata: request.metadata,
            campaign_credited: false,
            donor_credited: false,
            created_at: now,
            updated_at: now,
        };
        let donation = self.store.insert_donation(donation).await?;

        tracing::info!(
            intent = %intent.id,
            campaign = %campaign_id,
            amount = request.amount,
            "pending donation recorded"
        );

        Ok(PaymentIntentCreated {
            client_secret,
            payment_intent_id: intent.id,
            donation,
        })
    }

    /// Client-side confirmation. The gateway is asked for the authoritative
    /// intent status before anything is settled.
    pub async fn confirm_donation(&self, payment_intent_id: &str) -> Result<Confirmation> {
        let payment_intent_id = payment_intent_id.trim();
        if payment_intent_id.is_empty() {
            return Err(AppError::invalid_data("Payment intent ID is required"));
        }

        let intent = self.gateway.retrieve_intent(payment_intent_id).await?;
        if intent.status != IntentStatus::Succeeded {
            tracing::warn!(intent = %payment_intent_id, status = intent.status.as_str(), "confirmation before payment settled");
            return Err(AppError::PaymentIncomplete(intent.status.as_str().to_string()));
        }

        match self.settle(payment_intent_id).await? {
            Some(confirmation) => Ok(confirmation),
            None => Err(AppError::not_found("Donation record not found")),
        }
    }

    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let signature = signature
            .ok_or_else(|| AppError::WebhookSignature("missing signature header".into()))?;
        if let Err(err) =
            verify_webhook_signature(payload, signature, &self.webhook_secret, Utc::now().timestamp())
        {
            tracing::warn!("webhook signature verification failed: {}", err);
            return Err(err);
        }

        match parse_event(payload)? {
            GatewayEvent::PaymentSucceeded(intent) => match self.settle(&intent.id).await? {
                Some(Confirmation::Completed(_)) => Ok(WebhookOutcome::Completed),
                Some(Confirmation::AlreadyConfirmed(_)) => Ok(WebhookOutcome::AlreadySettled),
                None => {
                    tracing::warn!(intent = %intent.id, "webhook for unknown payment intent");
                    Ok(WebhookOutcome::UnknownIntent)
                }
            },
            GatewayEvent::PaymentFailed(intent) => {
                let reason = intent.failure_message();
                match self.store.fail_if_pending(&intent.id, reason.clone()).await? {
                    Some(donation) => {
                        tracing::info!(intent = %intent.id, "donation marked failed");
                        let entry = AuditLog::new(AuditAction::PaymentFailed, AuditResource::Donation)
                            .by(donation.donor)
                            .details(json!({
                                "paymentId": intent.id,
                                "reason": reason,
                                "amount": donation.amount,
                            }))
                            .failed();
                        let entry = match donation.id {
                            Some(id) => entry.on(id),
                            None => entry,
                        };
                        if let Err(err) = self.store.record_audit(entry).await {
                            tracing::error!("failed to audit payment failure: {}", err);
                        }
                        Ok(WebhookOutcome::Failed)
                    }
                    None => Ok(WebhookOutcome::AlreadySettled),
                }
            }
            GatewayEvent::Ignored(event_type) => {
                tracing::info!(event = %event_type, "unhandled webhook event type");
                Ok(WebhookOutcome::Ignored(event_type))
            }
        }
    }

    /// Recomputes a campaign's totals from its completed donations.
    pub async fn reconcile_campaign(&self, campaign_id: &ObjectId) -> Result<CampaignTotals> {
        let totals = self
            .store
            .reconcile_campaign(campaign_id)
            .await?
            .ok_or_else(|| AppError::not_found("Campaign not found"))?;
        tracing::info!(
            campaign = %campaign_id,
            raised = totals.raised,
            donations = totals.donation_count,
            "campaign totals reconciled"
        );
        Ok(totals)
    }

    /// Runs the `pending -> completed` swap, then any credit still owed.
    /// `None` when no donation carries the intent id. An increment failure
    /// is returned so the caller (or the gateway) retries.
    async fn settle(&self, payment_id: &str) -> Result<Option<Confirmation>> {
        let completed_at = BsonDateTime::now();
        let receipt = generate_receipt_number(completed_at.to_chrono());

        if let Some(donation) = self
            .store
            .complete_if_pending(payment_id, &receipt, completed_at)
            .await?
        {
            tracing::info!(intent = %payment_id, receipt = %receipt, "donation completed");
            self.audit_completion(&donation).await;
            self.credit(&donation).await?;
            return Ok(Some(Confirmation::Completed(donation)));
        }

        let Some(existing) = self.store.find_donation_by_payment_id(payment_id).await? else {
            return Ok(None);
        };
        match existing.status {
            DonationStatus::Completed => {
                if existing.campaign_credited && existing.donor_credited {
                    tracing::info!(intent = %payment_id, "donation already confirmed, skipping totals");
                } else {
                    tracing::warn!(intent = %payment_id, "completed donation has credits outstanding");
                    self.credit(&existing).await?;
                }
                Ok(Some(Confirmation::AlreadyConfirmed(existing)))
            }
            status => Err(AppError::InvalidState(format!(
                "Donation is {} and cannot be completed",
                status.as_str()
            ))),
        }
    }

    /// Claims `target` for a completed donation. A lost claim means another
    /// caller has applied, or is applying, the increment.
    async fn claim(&self, donation: &Donation, target: CreditTarget) -> Result<bool> {
        if target.is_credited(donation) {
            return Ok(false);
        }
        self.store.claim_credit(&donation.payment.payment_id, target).await
    }

    async fn release(&self, donation: &Donation, target: CreditTarget) {
        if let Err(err) = self
            .store
            .release_credit(&donation.payment.payment_id, target)
            .await
        {
            tracing::error!(
                intent = %donation.payment.payment_id,
                target = target.field(),
                "failed to release credit claim, reconcile required: {}",
                err
            );
        }
    }

    /// Folds the donation into the campaign totals and the donor's stats.
    async fn credit(&self, donation: &Donation) -> Result<()> {
        if self.claim(donation, CreditTarget::Campaign).await? {
            match self
                .store
                .apply_campaign_contribution(&donation.campaign, donation.amount)
                .await
            {
                Ok(Some(contribution)) => self.notify_creator(donation, &contribution).await,
                Ok(None) => {
                    tracing::error!(campaign = %donation.campaign, "completed donation references missing campaign");
                }
                Err(err) => {
                    tracing::error!(campaign = %donation.campaign, "failed to update campaign totals: {}", err);
                    self.release(donation, CreditTarget::Campaign).await;
                    return Err(err);
                }
            }
        }

        if self.claim(donation, CreditTarget::Donor).await? {
            match self
                .store
                .apply_donor_contribution(&donation.donor_email, &donation.campaign, donation.amount)
                .await
            {
                Ok(true) => {}
                Ok(false) => tracing::debug!("donor has no account, stats not tracked"),
                Err(err) => {
                    tracing::error!("failed to update donor stats: {}", err);
                    self.release(donation, CreditTarget::Donor).await;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn audit_completion(&self, donation: &Donation) {
        let mut audit = AuditLog::new(AuditAction::DonationMade, AuditResource::Donation)
            .by(donation.donor)
            .details(json!({
                "amount": donation.amount,
                "currency": donation.currency,
                "campaignId": donation.campaign.to_hex(),
                "paymentId": donation.payment.payment_id,
                "receiptNumber": donation.receipt_number,
            }));
        if let Some(id) = donation.id {
            audit = audit.on(id);
        }
        if let Err(err) = self.store.record_audit(audit).await {
            tracing::error!("failed to audit donation: {}", err);
        }
    }

    async fn notify_creator(&self, donation: &Donation, contribution: &CampaignContribution) {
        let campaign = &contribution.previous;
        let data = json!({
            "donationId": donation.id.map(|id| id.to_hex()),
            "campaignId": donation.campaign.to_hex(),
            "amount": donation.amount,
        });

        let received = Notification::new(
            campaign.creator,
            NotificationType::DonationReceived,
            "New donation received",
            format!(
                "{} donated {:.2} {} to {}",
                donation.display_name(),
                donation.amount,
                donation.currency.code(),
                campaign.title
            ),
        )
        .with_data(data.clone())
        .with_action(
            Some(format!("/campaigns/{}", donation.campaign.to_hex())),
            Some("View campaign".into()),
        );
        if let Err(err) = self.store.insert_notification(received).await {
            tracing::error!("failed to notify campaign creator: {}", err);
        }

        if contribution.goal_reached {
            tracing::info!(campaign = %donation.campaign, "campaign reached its goal");
            let completed = Notification::new(
                campaign.creator,
                NotificationType::CampaignCompleted,
                "Campaign goal reached",
                format!("{} has reached its fundraising goal", campaign.title),
            )
            .with_data(data);
            if let Err(err) = self.store.insert_notification(completed).await {
                tracing::error!("failed to send goal notification: {}", err);
            }
        }
    }
}

fn validate_new_donation(request: &NewDonation) -> Result<()> {
    if request.campaign_id.trim().is_empty()
        || request.donor_email.trim().is_empty()
        || request.donor_name.trim().is_empty()
    {
        return Err(AppError::invalid_data(
            "Missing required fields: campaignId, amount, donorEmail, donorName",
        ));
    }
    if !request.amount.is_finite() || request.amount < MIN_DONATION {
        return Err(AppError::invalid_data(format!(
            "Minimum donation amount is {}",
            MIN_DONATION
        )));
    }
    if request.amount > MAX_DONATION {
        return Err(AppError::invalid_data(format!(
            "Maximum donation amount is {}",
            MAX_DONATION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::database::memory::MemoryStore;
    use crate::models::campaign::{Campaign, CampaignStatus};
    use crate::models::common::Category;
    use crate::models::user::{DonorLevel, Role, User};
    use crate::services::payment_gateway::{scripted::ScriptedGateway, signature_header};

    const WEBHOOK_SECRET: &str = "whsec_test_0123456789";

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<ScriptedGateway>,
        service: Arc<DonationService>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let service = Arc::new(DonationService::new(
            store.clone(),
            gateway.clone(),
            WEBHOOK_SECRET,
        ));
        Harness {
            store,
            gateway,
            service,
        }
    }

    fn campaign(status: CampaignStatus, goal: f64, raised: f64) -> Campaign {
        let now = BsonDateTime::now();
        Campaign {
            id: None,
            title: "School library".into(),
            description: "Books for the village school".into(),
            short_description: "Books".into(),
            goal,
            raised,
            currency: Currency::Usd,
            category: Category::Education,
            organization_name: "Readers".into(),
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

    fn new_donation(campaign_id: &ObjectId, amount: f64) -> NewDonation {
        NewDonation {
            campaign_id: campaign_id.to_hex(),
            amount,
            currency: Currency::Usd,
            donor_email: "Donor@Example.com".into(),
            donor_name: "Dana".into(),
            message: None,
            is_anonymous: false,
            metadata: DonationMetadata::default(),
        }
    }

    async fn paid_intent(h: &Harness, campaign_id: &ObjectId, amount: f64) -> String {
        let created = h
            .service
            .create_payment_intent(new_donation(campaign_id, amount))
            .await
            .unwrap();
        h.gateway
            .settle(&created.payment_intent_id, IntentStatus::Succeeded);
        created.payment_intent_id
    }

    fn webhook(event_type: &str, intent_id: &str) -> (Vec<u8>, String) {
        let body = json!({
            "id": "evt_test",
            "type": event_type,
            "data": { "object": {
                "id": intent_id,
                "status": "succeeded",
                "last_payment_error": { "message": "Your card was declined." },
            }},
        })
        .to_string()
        .into_bytes();
        let header = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &body);
        (body, header)
    }

    #[tokio::test]
    async fn below_minimum_amount_creates_nothing() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 1_000.0, 0.0));

        let err = h
            .service
            .create_payment_intent(new_donation(&campaign_id, 0.5))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(h.store.donations().is_empty());
        assert_eq!(h.gateway.intent_count(), 0);
    }

    #[tokio::test]
    async fn rejects_missing_and_inactive_campaigns() {
        let h = harness();
        let err = h
            .service
            .create_payment_intent(new_donation(&ObjectId::new(), 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let suspended = h.store.add_campaign(campaign(CampaignStatus::Suspended, 1_000.0, 0.0));
        let err = h
            .service
            .create_payment_intent(new_donation(&suspended, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(h.store.donations().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_leaves_no_donation() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 1_000.0, 0.0));
        h.gateway.unavailable.store(true, Ordering::SeqCst);

        let err = h
            .service
            .create_payment_intent(new_donation(&campaign_id, 10.0))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalService(_)));
        assert!(h.store.donations().is_empty());
    }

    #[tokio::test]
    async fn pending_donation_links_known_donor() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 1_000.0, 0.0));
        let user_id = h.store.add_user(User::new(
            "Dana".into(),
            "donor@example.com".into(),
            "hash".into(),
            Role::Donor,
        ));

        let created = h
            .service
            .create_payment_intent(new_donation(&campaign_id, 12.34))
            .await
            .unwrap();

        assert_eq!(created.client_secret, format!("{}_secret", created.payment_intent_id));
        let donation = &h.store.donations()[0];
        assert_eq!(donation.status, DonationStatus::Pending);
        assert_eq!(donation.donor, Some(user_id));
        assert_eq!(donation.donor_email, "donor@example.com");
        assert_eq!(donation.payment.payment_id, created.payment_intent_id);
    }

    #[tokio::test]
    async fn confirmation_requires_settled_payment() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 1_000.0, 0.0));
        let created = h
            .service
            .create_payment_intent(new_donation(&campaign_id, 10.0))
            .await
            .unwrap();

        let err = h
            .service
            .confirm_donation(&created.payment_intent_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentIncomplete(s) if s == "requires_payment_method"));
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 0.0);
    }

    #[tokio::test]
    async fn campaign_completes_on_the_donation_that_reaches_the_goal() {
        let h = harness();
        let campaign_id = h
            .store
            .add_campaign(campaign(CampaignStatus::Active, 50_000.0, 15_750.0));

        let first = paid_intent(&h, &campaign_id, 2_500.0).await;
        let confirmation = h.service.confirm_donation(&first).await.unwrap();
        assert!(!confirmation.already_confirmed());

        let after_first = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(after_first.raised, 18_250.0);
        assert_eq!(after_first.status, CampaignStatus::Active);

        let second = paid_intent(&h, &campaign_id, 40_000.0).await;
        h.service.confirm_donation(&second).await.unwrap();

        let after_second = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(after_second.raised, 58_250.0);
        assert_eq!(after_second.donation_count, 2);
        assert_eq!(after_second.status, CampaignStatus::Completed);
        assert_eq!(after_second.analytics.top_donation, 40_000.0);

        let kinds: Vec<NotificationType> = h
            .store
            .notifications()
            .iter()
            .map(|n| n.notification_type)
            .collect();
        assert_eq!(
            kinds,
            [
                NotificationType::DonationReceived,
                NotificationType::DonationReceived,
                NotificationType::CampaignCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn replayed_confirmation_does_not_recount() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 100_000.0, 0.0));
        h.store.add_user(User::new(
            "Dana".into(),
            "donor@example.com".into(),
            "hash".into(),
            Role::Donor,
        ));
        let intent = paid_intent(&h, &campaign_id, 12_000.0).await;

        let first = h.service.confirm_donation(&intent).await.unwrap();
        let second = h.service.confirm_donation(&intent).await.unwrap();

        assert!(!first.already_confirmed());
        assert!(second.already_confirmed());
        assert_eq!(
            first.donation().receipt_number,
            second.donation().receipt_number
        );

        let campaign = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(campaign.raised, 12_000.0);
        assert_eq!(campaign.donation_count, 1);

        let stats = h.store.user("donor@example.com").unwrap().donation_stats;
        assert_eq!(stats.total_donated, 12_000.0);
        assert_eq!(stats.donation_count, 1);
        assert_eq!(stats.campaigns_supported, 1);
        assert_eq!(stats.donor_level, DonorLevel::Silver);

        let audits = h.store.audit_logs();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::DonationMade);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_confirmations_and_webhooks_count_once() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 100_000.0, 500.0));
        let intent = paid_intent(&h, &campaign_id, 250.0).await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let service = h.service.clone();
            let intent = intent.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    service
                        .confirm_donation(&intent)
                        .await
                        .map(|c| !c.already_confirmed())
                } else {
                    let (body, header) = webhook("payment_intent.succeeded", &intent);
                    service
                        .handle_webhook(&body, Some(&header))
                        .await
                        .map(|o| o == WebhookOutcome::Completed)
                }
            }));
        }

        let mut winners = 0;
        for task in futures_util::future::join_all(tasks).await {
            if task.unwrap().unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        let campaign = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(campaign.raised, 750.0);
        assert_eq!(campaign.donation_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_donations_are_all_counted() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 1_000_000.0, 100.0));
        let amounts = [5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0];

        let mut intents = Vec::new();
        for amount in amounts {
            intents.push(paid_intent(&h, &campaign_id, amount).await);
        }

        let tasks: Vec<_> = intents
            .into_iter()
            .map(|intent| {
                let service = h.service.clone();
                tokio::spawn(async move { service.confirm_donation(&intent).await })
            })
            .collect();
        for task in futures_util::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let campaign = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(campaign.raised, 100.0 + amounts.iter().sum::<f64>());
        assert_eq!(campaign.donation_count, amounts.len() as i64);
    }

    #[tokio::test]
    async fn webhook_after_confirmation_is_acknowledged_without_recount() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 10_000.0, 0.0));
        let intent = paid_intent(&h, &campaign_id, 75.0).await;
        h.service.confirm_donation(&intent).await.unwrap();

        let (body, header) = webhook("payment_intent.succeeded", &intent);
        let outcome = h.service.handle_webhook(&body, Some(&header)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::AlreadySettled);
        let campaign = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(campaign.raised, 75.0);
        assert_eq!(campaign.donation_count, 1);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_changes_nothing() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 10_000.0, 0.0));
        let intent = paid_intent(&h, &campaign_id, 75.0).await;

        let (body, _) = webhook("payment_intent.succeeded", &intent);
        let forged = signature_header("whsec_attacker_key", Utc::now().timestamp(), &body);

        let err = h.service.handle_webhook(&body, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, AppError::WebhookSignature(_)));
        let err = h.service.handle_webhook(&body, None).await.unwrap_err();
        assert!(matches!(err, AppError::WebhookSignature(_)));

        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 0.0);
        assert_eq!(h.store.donations()[0].status, DonationStatus::Pending);
    }

    #[tokio::test]
    async fn failed_payment_is_terminal() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 10_000.0, 0.0));
        let intent = paid_intent(&h, &campaign_id, 40.0).await;

        let (body, header) = webhook("payment_intent.payment_failed", &intent);
        let outcome = h.service.handle_webhook(&body, Some(&header)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Failed);

        let donation = &h.store.donations()[0];
        assert_eq!(donation.status, DonationStatus::Failed);
        assert_eq!(donation.failure_reason.as_deref(), Some("Your card was declined."));

        let err = h.service.confirm_donation(&intent).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 0.0);
    }

    #[tokio::test]
    async fn unknown_events_and_intents_are_acknowledged() {
        let h = harness();
        let (body, header) = webhook("charge.refunded", "ch_1");
        let outcome = h.service.handle_webhook(&body, Some(&header)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored("charge.refunded".into()));

        let (body, header) = webhook("payment_intent.succeeded", "pi_nobody");
        let outcome = h.service.handle_webhook(&body, Some(&header)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::UnknownIntent);
    }

    #[tokio::test]
    async fn failed_campaign_increment_is_retried_by_the_next_delivery() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 10_000.0, 0.0));
        h.store.add_user(User::new(
            "Dana".into(),
            "donor@example.com".into(),
            "hash".into(),
            Role::Donor,
        ));
        let intent = paid_intent(&h, &campaign_id, 50.0).await;
        h.store.fail_next_campaign_credit.store(true, Ordering::SeqCst);

        let (body, header) = webhook("payment_intent.succeeded", &intent);
        let err = h.service.handle_webhook(&body, Some(&header)).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let donation = &h.store.donations()[0];
        assert_eq!(donation.status, DonationStatus::Completed);
        assert!(!donation.campaign_credited);
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 0.0);

        let outcome = h.service.handle_webhook(&body, Some(&header)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadySettled);

        let campaign = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(campaign.raised, 50.0);
        assert_eq!(campaign.donation_count, 1);
        let donation = &h.store.donations()[0];
        assert!(donation.campaign_credited && donation.donor_credited);
        assert_eq!(h.store.user("donor@example.com").unwrap().donation_stats.donation_count, 1);

        // Fully credited now: a further confirmation changes nothing.
        let again = h.service.confirm_donation(&intent).await.unwrap();
        assert!(again.already_confirmed());
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 50.0);
        assert_eq!(h.store.audit_logs().len(), 1);
    }

    #[tokio::test]
    async fn failed_increment_on_confirmation_is_finished_by_the_webhook() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 10_000.0, 0.0));
        let intent = paid_intent(&h, &campaign_id, 30.0).await;
        h.store.fail_next_campaign_credit.store(true, Ordering::SeqCst);

        assert!(h.service.confirm_donation(&intent).await.is_err());
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 0.0);

        let (body, header) = webhook("payment_intent.succeeded", &intent);
        h.service.handle_webhook(&body, Some(&header)).await.unwrap();
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 30.0);

        let kinds: Vec<NotificationType> = h
            .store
            .notifications()
            .iter()
            .map(|n| n.notification_type)
            .collect();
        assert_eq!(kinds, [NotificationType::DonationReceived]);
    }

    #[tokio::test]
    async fn reconcile_completes_a_campaign_whose_goal_is_met() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 100.0, 0.0));
        for amount in [40.0, 60.0] {
            let intent = paid_intent(&h, &campaign_id, amount).await;
            h.service.confirm_donation(&intent).await.unwrap();
        }
        h.store.set_campaign_status(&campaign_id, CampaignStatus::Active);
        h.store.set_campaign_raised(&campaign_id, 0.0, 0);

        h.service.reconcile_campaign(&campaign_id).await.unwrap();

        let campaign = h.store.campaign(&campaign_id).unwrap();
        assert_eq!(campaign.raised, 100.0);
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.analytics.top_donation, 60.0);
        assert_eq!(campaign.analytics.average_donation, 50.0);
        assert_eq!(campaign.analytics.donor_count, 2);
    }

    #[tokio::test]
    async fn reconcile_restores_totals_from_completed_donations() {
        let h = harness();
        let campaign_id = h.store.add_campaign(campaign(CampaignStatus::Active, 10_000.0, 0.0));
        for amount in [20.0, 30.0] {
            let intent = paid_intent(&h, &campaign_id, amount).await;
            h.service.confirm_donation(&intent).await.unwrap();
        }
        h.store.set_campaign_raised(&campaign_id, 20.0, 1);

        let totals = h.service.reconcile_campaign(&campaign_id).await.unwrap();

        assert_eq!(totals.raised, 50.0);
        assert_eq!(totals.donation_count, 2);
        assert_eq!(h.store.campaign(&campaign_id).unwrap().raised, 50.0);

        let err = h.service.reconcile_campaign(&ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
