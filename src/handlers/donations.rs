use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::database::{number, CAMPAIGNS, DONATIONS};
use crate::dtos::campaign_dtos::{LimitQuery, PageQuery};
use crate::dtos::donation_dtos::{
    ConfirmDonationRequest, ConfirmDonationResponse, CreatePaymentIntentRequest,
    PaymentIntentResponse,
};
use crate::errors::{AppError, Result};
use crate::middleware::auth::CurrentUser;
use crate::middleware::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::request_meta::ClientInfo;
use crate::models::common::Pagination;
use crate::models::donation::{Donation, DonationResponse, DonationStatus, PublicDonation};
use crate::services::donation_service::{NewDonation, WebhookOutcome};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

fn donations(state: &AppState) -> Collection<Donation> {
    state.db.collection(DONATIONS)
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    payload.validate()?;

    let created = state
        .donations
        .create_payment_intent(NewDonation {
            campaign_id: payload.campaign_id,
            amount: payload.amount,
            currency: payload.currency,
            donor_email: payload.donor_email,
            donor_name: payload.donor_name,
            message: payload.message,
            is_anonymous: payload.is_anonymous,
            metadata: client.donation_metadata(),
        })
        .await?;

    Ok(Json(PaymentIntentResponse {
        success: true,
        client_secret: created.client_secret,
        payment_intent_id: created.payment_intent_id,
        donation_id: created.donation.id.map(|id| id.to_hex()).unwrap_or_default(),
    }))
}

pub async fn confirm_donation(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ConfirmDonationRequest>,
) -> Result<Json<ConfirmDonationResponse>> {
    payload.validate()?;

    let confirmation = state.donations.confirm_donation(&payload.payment_intent_id).await?;
    let already_confirmed = confirmation.already_confirmed();
    Ok(Json(ConfirmDonationResponse {
        success: true,
        message: if already_confirmed {
            "Donation already confirmed"
        } else {
            "Donation confirmed successfully"
        },
        already_confirmed,
        donation: DonationResponse::new(confirmation.into_donation(), None),
    }))
}

/// Gateway callback. Authenticated by the signature over the raw body, so the
/// body is taken as bytes and never re-serialized before verification.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.donations.handle_webhook(&body, signature).await?;
    if let WebhookOutcome::Ignored(event) = &outcome {
        tracing::debug!(%event, "webhook acknowledged without action");
    }
    Ok(Json(json!({ "received": true })))
}

/// Titles for the given campaigns in one round trip.
async fn campaign_titles(state: &AppState, ids: &[ObjectId]) -> Result<HashMap<ObjectId, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<Document> = state
        .db
        .collection::<Document>(CAMPAIGNS)
        .find(doc! { "_id": { "$in": ids.to_vec() } })
        .projection(doc! { "title": 1 })
        .await?
        .try_collect()
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get_object_id("_id").ok()?;
            let title = row.get_str("title").ok()?.to_string();
            Some((id, title))
        })
        .collect())
}

fn campaign_ids(found: &[Donation]) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = found.iter().map(|d| d.campaign).collect();
    ids.sort();
    ids.dedup();
    ids
}

async fn public_listing(state: &AppState, sort: Document, limit: i64) -> Result<Vec<PublicDonation>> {
    let found: Vec<Donation> = donations(state)
        .find(doc! { "status": DonationStatus::Completed.as_str(), "isAnonymous": false })
        .sort(sort)
        .limit(limit)
        .await?
        .try_collect()
        .await?;
    let titles = campaign_titles(state, &campaign_ids(&found)).await?;
    Ok(found
        .into_iter()
        .map(|d| {
            let title = titles.get(&d.campaign).cloned();
            PublicDonation::new(d, title)
        })
        .collect())
}

pub async fn recent_donations(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let donations = public_listing(&state, doc! { "createdAt": -1 }, query.limit_or(10)).await?;
    Ok(Json(json!({ "success": true, "donations": donations })))
}

pub async fn top_donations(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let donations =
        public_listing(&state, doc! { "amount": -1, "createdAt": -1 }, query.limit_or(10)).await?;
    Ok(Json(json!({ "success": true, "donations": donations })))
}

/// Count, sum and average of completed donations matching `filter`.
pub(crate) async fn donation_totals(state: &AppState, filter: Document) -> Result<(i64, f64, f64)> {
    let mut filter = filter;
    filter.insert("status", DonationStatus::Completed.as_str());
    let pipeline = vec![
        doc! { "$match": filter },
        doc! { "$group": {
            "_id": null,
            "count": { "$sum": 1 },
            "total": { "$sum": "$amount" },
            "average": { "$avg": "$amount" },
        }},
    ];
    let row: Option<Document> = donations(state).aggregate(pipeline).await?.try_next().await?;
    Ok(row
        .map(|r| (number(&r, "count") as i64, number(&r, "total"), number(&r, "average")))
        .unwrap_or((0, 0.0, 0.0)))
}

pub async fn donation_stats(State(state): State<AppState>) -> Result<Json<Value>> {
    let (count, total, average) = donation_totals(&state, Document::new()).await?;
    Ok(Json(json!({
        "success": true,
        "stats": {
            "totalDonations": count,
            "totalAmount": total,
            "averageDonation": average,
        },
    })))
}

async fn donor_page(
    state: &AppState,
    filter: Document,
    query: &PageQuery,
) -> Result<(Vec<DonationResponse>, Pagination)> {
    let request = query.page_request(10);
    let collection = donations(state);
    let total = collection.count_documents(filter.clone()).await?;
    let found: Vec<Donation> = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(request.skip())
        .limit(request.limit as i64)
        .await?
        .try_collect()
        .await?;
    let titles = campaign_titles(state, &campaign_ids(&found)).await?;
    let page = found
        .into_iter()
        .map(|d| {
            let title = titles.get(&d.campaign).cloned();
            DonationResponse::new(d, title)
        })
        .collect();
    Ok((page, Pagination::new(request, total)))
}

pub async fn my_donations(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Value>> {
    let filter = doc! {
        "status": DonationStatus::Completed.as_str(),
        "$or": [ { "donor": user.id }, { "donorEmail": &user.email } ],
    };
    let (donations, pagination) = donor_page(&state, filter, &query).await?;
    Ok(Json(json!({ "success": true, "donations": donations, "pagination": pagination })))
}

pub async fn donation_history(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(email): AppPath<String>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Value>> {
    let email = email.trim().to_lowercase();
    if email != user.email && !user.is_admin() {
        return Err(AppError::forbidden("You can only view your own donation history"));
    }

    let (donations, pagination) = donor_page(&state, doc! { "donorEmail": &email }, &query).await?;
    let (count, total, average) = donation_totals(&state, doc! { "donorEmail": &email }).await?;

    Ok(Json(json!({
        "success": true,
        "donations": donations,
        "pagination": pagination,
        "stats": {
            "totalDonated": total,
            "donationCount": count,
            "avgDonation": average,
        },
    })))
}
