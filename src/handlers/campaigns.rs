use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use chrono::{Duration, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::ReturnDocument,
    Collection,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::database::{number, CAMPAIGNS, DONATIONS};
use crate::dtos::campaign_dtos::{
    CampaignQuery, CampaignStatusRequest, CampaignUpdateRequest, CreateCampaignRequest,
    ImpactReportRequest, LimitQuery, PageQuery, ReasonRequest, SearchQuery,
    UpdateCampaignRequest, DEFAULT_PAGE_SIZE,
};
use crate::errors::{AppError, Result};
use crate::handlers::notifications::deliver;
use crate::middleware::auth::CurrentUser;
use crate::middleware::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::request_meta::ClientInfo;
use crate::models::audit_log::{AuditAction, AuditLog, AuditResource};
use crate::models::campaign::{
    progress_percentage, trending_score_expr, ApprovalStatus, Campaign, CampaignResponse,
    CampaignStatus, CampaignUpdate, CampaignUpdateView, ImpactReport, ImpactReportView,
};
use crate::models::common::{now_bson, parse_object_id, Category, PageRequest, Pagination};
use crate::models::donation::{Donation, DonationStatus, PublicDonation};
use crate::models::notification::{Notification, NotificationType};
use crate::services::audit;
use crate::state::AppState;

const TRENDING_WINDOW_DAYS: i64 = 7;
const URGENT_WINDOW_DAYS: i64 = 3;

pub(crate) fn campaigns(state: &AppState) -> Collection<Campaign> {
    state.db.collection(CAMPAIGNS)
}

fn donations(state: &AppState) -> Collection<Donation> {
    state.db.collection(DONATIONS)
}

pub(crate) async fn load_campaign(state: &AppState, raw_id: &str) -> Result<Campaign> {
    let id = parse_object_id(raw_id, "campaign")?;
    campaigns(state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Campaign not found"))
}

/// Loads a campaign the caller is allowed to modify: its creator or an admin.
async fn managed_campaign(state: &AppState, raw_id: &str, user: &CurrentUser) -> Result<Campaign> {
    let campaign = load_campaign(state, raw_id).await?;
    if !user.can_manage(&campaign.creator) {
        return Err(AppError::forbidden("Not authorized to modify this campaign"));
    }
    Ok(campaign)
}

fn campaign_id(campaign: &Campaign) -> Result<ObjectId> {
    campaign
        .id
        .ok_or_else(|| AppError::Internal("stored campaign has no id".into()))
}

fn campaign_audit(client: &ClientInfo, action: AuditAction, user: &CurrentUser, id: ObjectId) -> AuditLog {
    client.audit(
        AuditLog::new(action, AuditResource::Campaign)
            .by(Some(user.id))
            .on(id),
    )
}

/// Listing projection: embedded updates and impact reports stay in the database.
fn summary_projection() -> Document {
    doc! { "updates": 0, "impactReports": 0 }
}

async fn find_page(
    state: &AppState,
    filter: Document,
    sort: Document,
    request: PageRequest,
) -> Result<(Vec<CampaignResponse>, u64)> {
    let collection = campaigns(state);
    let total = collection.count_documents(filter.clone()).await?;
    let found: Vec<Campaign> = collection
        .find(filter)
        .sort(sort)
        .skip(request.skip())
        .limit(request.limit as i64)
        .projection(summary_projection())
        .await?
        .try_collect()
        .await?;
    Ok((found.into_iter().map(CampaignResponse::summary).collect(), total))
}

async fn find_summaries(
    state: &AppState,
    filter: Document,
    sort: Document,
    limit: i64,
) -> Result<Vec<Campaign>> {
    Ok(campaigns(state)
        .find(filter)
        .sort(sort)
        .limit(limit)
        .projection(summary_projection())
        .await?
        .try_collect()
        .await?)
}

fn campaign_pagination(request: PageRequest, total: u64) -> Value {
    let page = Pagination::new(request, total);
    json!({
        "currentPage": page.current_page,
        "totalPages": page.total_pages,
        "totalCampaigns": page.total,
        "hasNext": page.has_next,
        "hasPrev": page.has_prev,
    })
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<CampaignQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request();
    let (campaigns, total) = match query.filter() {
        Some(filter) => find_page(&state, filter, query.sort().sort_doc(), request).await?,
        None => (Vec::new(), 0),
    };

    Ok(Json(json!({
        "success": true,
        "campaigns": campaigns,
        "pagination": campaign_pagination(request, total),
    })))
}

pub async fn featured_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let found = find_summaries(
        &state,
        doc! { "status": CampaignStatus::Active.as_str() },
        doc! { "donationCount": -1, "raised": -1 },
        query.limit_or(6),
    )
    .await?;
    let campaigns: Vec<CampaignResponse> = found.into_iter().map(CampaignResponse::summary).collect();
    Ok(Json(json!({ "success": true, "campaigns": campaigns })))
}

/// Active campaigns created since `since`, ranked by weighted engagement
/// inside the database, highest first.
pub(crate) fn trending_pipeline(since: BsonDateTime, limit: i64) -> Vec<Document> {
    let mut projection = summary_projection();
    projection.insert("trendingScore", 0);
    vec![
        doc! { "$match": {
            "status": CampaignStatus::Active.as_str(),
            "createdAt": { "$gte": since },
        }},
        doc! { "$addFields": { "trendingScore": trending_score_expr() } },
        doc! { "$sort": { "trendingScore": -1, "createdAt": -1 } },
        doc! { "$limit": limit },
        doc! { "$project": projection },
    ]
}

pub async fn trending_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let since = BsonDateTime::from_chrono(Utc::now() - Duration::days(TRENDING_WINDOW_DAYS));
    let found: Vec<Campaign> = campaigns(&state)
        .aggregate(trending_pipeline(since, query.limit_or(10)))
        .with_type::<Campaign>()
        .await?
        .try_collect()
        .await?;

    let campaigns: Vec<CampaignResponse> = found.into_iter().map(CampaignResponse::summary).collect();
    Ok(Json(json!({ "success": true, "campaigns": campaigns })))
}

pub async fn urgent_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let now = Utc::now();
    let found = find_summaries(
        &state,
        doc! {
            "status": CampaignStatus::Active.as_str(),
            "endDate": {
                "$gt": BsonDateTime::from_chrono(now),
                "$lte": BsonDateTime::from_chrono(now + Duration::days(URGENT_WINDOW_DAYS)),
            },
        },
        doc! { "endDate": 1 },
        query.limit_or(10),
    )
    .await?;
    let campaigns: Vec<CampaignResponse> = found.into_iter().map(CampaignResponse::summary).collect();
    Ok(Json(json!({ "success": true, "campaigns": campaigns })))
}

pub async fn search_campaigns(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request();
    let (campaigns, total) = match query.filter() {
        Some(filter) => find_page(&state, filter, doc! { "createdAt": -1 }, request).await?,
        None => (Vec::new(), 0),
    };

    Ok(Json(json!({
        "success": true,
        "campaigns": campaigns,
        "total": total,
        "query": query.term(),
        "filters": {
            "category": query.category,
            "minAmount": query.min_amount,
            "maxAmount": query.max_amount,
        },
        "pagination": campaign_pagination(request, total),
    })))
}

/// Per-category counts and totals over the campaigns matching `filter`.
/// Every category is listed, including empty ones.
pub(crate) async fn category_breakdown(state: &AppState, filter: Document) -> Result<Vec<Value>> {
    let pipeline = vec![
        doc! { "$match": filter },
        doc! { "$group": {
            "_id": "$category",
            "count": { "$sum": 1 },
            "totalRaised": { "$sum": "$raised" },
            "totalGoal": { "$sum": "$goal" },
        }},
    ];
    let rows: Vec<Document> = campaigns(state)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;

    Ok(Category::ALL
        .iter()
        .map(|category| {
            let row = rows
                .iter()
                .find(|r| r.get_str("_id").ok() == Some(category.as_str()));
            let (count, raised, goal) = row
                .map(|r| (number(r, "count") as i64, number(r, "totalRaised"), number(r, "totalGoal")))
                .unwrap_or((0, 0.0, 0.0));
            json!({
                "value": category.as_str(),
                "label": category.label(),
                "count": count,
                "totalRaised": raised,
                "totalGoal": goal,
                "progressPercentage": progress_percentage(raised, goal),
            })
        })
        .collect())
}

pub async fn campaign_categories(State(state): State<AppState>) -> Result<Json<Value>> {
    let categories =
        category_breakdown(&state, doc! { "status": CampaignStatus::Active.as_str() }).await?;
    Ok(Json(json!({ "success": true, "categories": categories })))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "campaign")?;
    let campaign = campaigns(&state)
        .find_one_and_update(doc! { "_id": id }, doc! { "$inc": { "analytics.views": 1 } })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Campaign not found"))?;

    Ok(Json(json!({ "success": true, "campaign": CampaignResponse::detail(campaign) })))
}

pub async fn campaign_donations(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Value>> {
    let campaign = load_campaign(&state, &id).await?;
    let found: Vec<Donation> = donations(&state)
        .find(doc! { "campaign": campaign.id, "status": DonationStatus::Completed.as_str() })
        .sort(doc! { "createdAt": -1 })
        .limit(query.limit_or(10))
        .await?
        .try_collect()
        .await?;

    let donations: Vec<PublicDonation> = found
        .into_iter()
        .map(|d| PublicDonation::new(d, Some(campaign.title.clone())))
        .collect();
    Ok(Json(json!({ "success": true, "donations": donations })))
}

pub async fn campaign_updates(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let mut updates = load_campaign(&state, &id).await?.updates;
    updates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let updates: Vec<CampaignUpdateView> = updates.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "success": true, "updates": updates })))
}

pub async fn impact_reports(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let mut reports = load_campaign(&state, &id).await?.impact_reports;
    reports.sort_by(|a, b| b.report_date.cmp(&a.report_date));
    let reports: Vec<ImpactReportView> = reports.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "success": true, "impactReports": reports })))
}

pub async fn share_campaign(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "campaign")?;
    let campaign = campaigns(&state)
        .find_one_and_update(doc! { "_id": id }, doc! { "$inc": { "analytics.shares": 1 } })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Campaign not found"))?;

    Ok(Json(json!({ "success": true, "shares": campaign.analytics.shares })))
}

pub async fn create_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    user: CurrentUser,
    AppJson(payload): AppJson<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    payload.validate()?;

    let now = Utc::now();
    let start = payload.start_date.unwrap_or(now);
    if payload.end_date <= now {
        return Err(AppError::invalid_data("End date must be in the future"));
    }
    if payload.end_date <= start {
        return Err(AppError::invalid_data("End date must be after the start date"));
    }

    let stamp = BsonDateTime::from_chrono(now);
    let mut campaign = Campaign {
        id: None,
        title: payload.title.trim().to_string(),
        description: payload.description,
        short_description: payload.short_description.trim().to_string(),
        goal: payload.goal,
        raised: 0.0,
        currency: payload.currency,
        category: payload.category,
        organization_name: payload.organization_name.trim().to_string(),
        image_url: payload.image_url,
        creator: user.id,
        status: CampaignStatus::Pending,
        approval_status: ApprovalStatus::Pending,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
        suspension_reason: None,
        start_date: BsonDateTime::from_chrono(start),
        end_date: BsonDateTime::from_chrono(payload.end_date),
        donation_count: 0,
        updates: Vec::new(),
        impact_reports: Vec::new(),
        analytics: Default::default(),
        created_at: stamp,
        updated_at: stamp,
    };

    let inserted = campaigns(&state).insert_one(&campaign).await?;
    let id = inserted
        .inserted_id
        .as_object_id()
        .ok_or_else(|| AppError::Internal("insert returned a non-ObjectId key".into()))?;
    campaign.id = Some(id);

    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignCreated, &user, id).details(json!({
            "title": campaign.title,
            "goal": campaign.goal,
            "category": campaign.category,
        })),
    )
    .await;
    tracing::info!(campaign = %id, creator = %user.id, "campaign submitted for approval");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Campaign created successfully and is pending approval",
            "campaign": CampaignResponse::detail(campaign),
        })),
    ))
}

pub async fn my_campaigns(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request(DEFAULT_PAGE_SIZE);
    let (campaigns, total) =
        find_page(&state, doc! { "creator": user.id }, doc! { "createdAt": -1 }, request).await?;
    Ok(Json(json!({
        "success": true,
        "campaigns": campaigns,
        "pagination": campaign_pagination(request, total),
    })))
}

pub async fn update_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<UpdateCampaignRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let campaign = managed_campaign(&state, &id, &user).await?;
    let id = campaign_id(&campaign)?;

    if matches!(campaign.status, CampaignStatus::Completed | CampaignStatus::Cancelled) {
        return Err(AppError::InvalidState(format!(
            "A {} campaign cannot be edited",
            campaign.status.as_str()
        )));
    }
    if let Some(end) = payload.end_date {
        if end <= Utc::now() || end <= campaign.start_date.to_chrono() {
            return Err(AppError::invalid_data("End date must be in the future and after the start date"));
        }
    }
    let mut set = payload
        .set_document()
        .ok_or_else(|| AppError::invalid_data("No campaign fields supplied"))?;
    let updated_fields: Vec<String> = set.keys().cloned().collect();
    set.insert("updatedAt", now_bson());

    let campaign = campaigns(&state)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Campaign not found"))?;

    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignUpdated, &user, id)
            .details(json!({ "updatedFields": updated_fields })),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Campaign updated successfully",
        "campaign": CampaignResponse::detail(campaign),
    })))
}

pub async fn delete_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let campaign = managed_campaign(&state, &id, &user).await?;
    let id = campaign_id(&campaign)?;

    // Donation history must keep pointing at a real campaign.
    let received = donations(&state)
        .count_documents(doc! { "campaign": id, "status": DonationStatus::Completed.as_str() })
        .await?;
    if received > 0 {
        return Err(AppError::InvalidState(
            "Cannot delete a campaign that has received donations; cancel it instead".into(),
        ));
    }

    campaigns(&state).delete_one(doc! { "_id": id }).await?;
    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignDeleted, &user, id)
            .details(json!({ "title": campaign.title })),
    )
    .await;

    Ok(Json(json!({ "success": true, "message": "Campaign deleted successfully" })))
}

pub async fn add_campaign_update(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<CampaignUpdateRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    payload.validate()?;
    let campaign = managed_campaign(&state, &id, &user).await?;
    let id = campaign_id(&campaign)?;

    let update = CampaignUpdate {
        title: payload.title.trim().to_string(),
        content: payload.content,
        author: Some(user.id),
        created_at: now_bson(),
    };
    campaigns(&state)
        .update_one(
            doc! { "_id": id },
            doc! {
                "$push": { "updates": mongodb::bson::to_bson(&update)? },
                "$set": { "updatedAt": now_bson() },
            },
        )
        .await?;

    // Registered donors of this campaign hear about the update.
    let donors = donations(&state)
        .distinct(
            "donor",
            doc! { "campaign": id, "status": DonationStatus::Completed.as_str(), "donor": { "$ne": null } },
        )
        .await?;
    let notices: Vec<Notification> = donors
        .iter()
        .filter_map(|d| d.as_object_id())
        .map(|donor| {
            Notification::new(
                donor,
                NotificationType::CampaignUpdate,
                format!("Update from {}", campaign.title),
                update.title.clone(),
            )
            .from_sender(user.id)
            .with_data(json!({ "campaignId": id.to_hex() }))
            .with_action(Some(format!("/campaigns/{}", id.to_hex())), Some("Read update".into()))
        })
        .collect();
    deliver(&state.db, notices).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Update posted successfully",
            "update": CampaignUpdateView::from(update),
        })),
    ))
}

pub async fn add_impact_report(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<ImpactReportRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    payload.validate()?;
    let campaign = managed_campaign(&state, &id, &user).await?;
    let id = campaign_id(&campaign)?;

    let report = ImpactReport {
        title: payload.title.trim().to_string(),
        description: payload.description,
        attachment_url: payload.attachment_url,
        report_date: BsonDateTime::from_chrono(payload.report_date.unwrap_or_else(Utc::now)),
    };
    campaigns(&state)
        .update_one(
            doc! { "_id": id },
            doc! {
                "$push": { "impactReports": mongodb::bson::to_bson(&report)? },
                "$set": { "updatedAt": now_bson() },
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Impact report added successfully",
            "impactReport": ImpactReportView::from(report),
        })),
    ))
}

/// Status moves a campaign owner may make without an admin.
///
/// Going live always goes through approval; suspension is an admin action.
pub(crate) fn owner_may_set(from: CampaignStatus, to: CampaignStatus) -> bool {
    use CampaignStatus::*;
    match (from, to) {
        (Draft, Pending) | (Pending, Draft) => true,
        (Draft | Pending | Active | Suspended, Cancelled) => true,
        _ => false,
    }
}

pub async fn set_campaign_status(
    State(state): State<AppState>,
    client: ClientInfo,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<CampaignStatusRequest>,
) -> Result<Json<Value>> {
    let campaign = managed_campaign(&state, &id, &user).await?;
    let id = campaign_id(&campaign)?;
    let from = campaign.status;
    let to = payload.status;

    if from == to {
        return Err(AppError::InvalidState(format!("Campaign is already {}", to.as_str())));
    }
    if !user.is_admin() && !owner_may_set(from, to) {
        return Err(AppError::forbidden(format!(
            "Cannot change campaign status from {} to {}",
            from.as_str(),
            to.as_str()
        )));
    }

    let campaign = campaigns(&state)
        .find_one_and_update(
            doc! { "_id": id, "status": from.as_str() },
            doc! { "$set": { "status": to.as_str(), "updatedAt": now_bson() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Campaign status changed concurrently".into()))?;

    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignUpdated, &user, id)
            .details(json!({ "statusFrom": from, "statusTo": to })),
    )
    .await;
    tracing::info!(campaign = %id, from = from.as_str(), to = to.as_str(), "campaign status changed");

    Ok(Json(json!({
        "success": true,
        "message": "Campaign status updated",
        "campaign": CampaignResponse::detail(campaign),
    })))
}

pub async fn approve_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let id = parse_object_id(&id, "campaign")?;
    let campaign = campaigns(&state)
        .find_one_and_update(
            doc! { "_id": id, "status": { "$in": ["pending", "draft"] } },
            doc! {
                "$set": {
                    "status": CampaignStatus::Active.as_str(),
                    "approvalStatus": "approved",
                    "approvedBy": admin.id,
                    "approvedAt": now_bson(),
                    "updatedAt": now_bson(),
                },
                "$unset": { "rejectionReason": "" },
            },
        )
        .return_document(ReturnDocument::After)
        .await?;
    let campaign = match campaign {
        Some(c) => c,
        None => {
            let existing = load_campaign(&state, &id.to_hex()).await?;
            return Err(AppError::InvalidState(format!(
                "Only pending campaigns can be approved (campaign is {})",
                existing.status.as_str()
            )));
        }
    };

    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignApproved, &admin, id)
            .details(json!({ "title": campaign.title })),
    )
    .await;
    deliver(
        &state.db,
        vec![Notification::new(
            campaign.creator,
            NotificationType::CampaignApproved,
            "Campaign approved",
            format!("Your campaign \"{}\" is now live", campaign.title),
        )
        .from_sender(admin.id)
        .with_data(json!({ "campaignId": id.to_hex() }))
        .with_action(Some(format!("/campaigns/{}", id.to_hex())), Some("View campaign".into()))],
    )
    .await;
    tracing::info!(campaign = %id, admin = %admin.id, "campaign approved");

    Ok(Json(json!({
        "success": true,
        "message": "Campaign approved successfully",
        "campaign": CampaignResponse::detail(campaign),
    })))
}

/// Rejected campaigns go back to `draft` so the creator can revise and resubmit.
pub async fn reject_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<ReasonRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let id = parse_object_id(&id, "campaign")?;
    let reason = payload.reason.trim().to_string();

    let campaign = campaigns(&state)
        .find_one_and_update(
            doc! { "_id": id, "status": { "$in": ["pending", "draft"] } },
            doc! { "$set": {
                "status": CampaignStatus::Draft.as_str(),
                "approvalStatus": "rejected",
                "rejectionReason": &reason,
                "updatedAt": now_bson(),
            }},
        )
        .return_document(ReturnDocument::After)
        .await?;
    let campaign = match campaign {
        Some(c) => c,
        None => {
            let existing = load_campaign(&state, &id.to_hex()).await?;
            return Err(AppError::InvalidState(format!(
                "Only pending campaigns can be rejected (campaign is {})",
                existing.status.as_str()
            )));
        }
    };

    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignRejected, &admin, id)
            .details(json!({ "title": campaign.title, "reason": reason })),
    )
    .await;
    deliver(
        &state.db,
        vec![Notification::new(
            campaign.creator,
            NotificationType::CampaignRejected,
            "Campaign not approved",
            format!("Your campaign \"{}\" was not approved: {}", campaign.title, reason),
        )
        .from_sender(admin.id)
        .with_data(json!({ "campaignId": id.to_hex(), "reason": reason }))],
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Campaign rejected",
        "campaign": CampaignResponse::detail(campaign),
    })))
}

pub async fn suspend_campaign(
    State(state): State<AppState>,
    client: ClientInfo,
    admin: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<ReasonRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let id = parse_object_id(&id, "campaign")?;
    let reason = payload.reason.trim().to_string();

    let campaign = campaigns(&state)
        .find_one_and_update(
            doc! { "_id": id, "status": CampaignStatus::Active.as_str() },
            doc! { "$set": {
                "status": CampaignStatus::Suspended.as_str(),
                "suspensionReason": &reason,
                "updatedAt": now_bson(),
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::InvalidState("Only active campaigns can be suspended".into()))?;

    audit::record(
        &state.db,
        campaign_audit(&client, AuditAction::CampaignSuspended, &admin, id)
            .details(json!({ "reason": reason })),
    )
    .await;
    deliver(
        &state.db,
        vec![Notification::new(
            campaign.creator,
            NotificationType::SystemAlert,
            "Campaign suspended",
            format!("Your campaign \"{}\" was suspended: {}", campaign.title, reason),
        )
        .from_sender(admin.id)
        .with_data(json!({ "campaignId": id.to_hex() }))],
    )
    .await;
    tracing::warn!(campaign = %id, admin = %admin.id, "campaign suspended");

    Ok(Json(json!({
        "success": true,
        "message": "Campaign suspended",
        "campaign": CampaignResponse::detail(campaign),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_is_ranked_before_the_limit() {
        let pipeline = trending_pipeline(BsonDateTime::now(), 5);
        let stages: Vec<&str> = pipeline
            .iter()
            .filter_map(|stage| stage.keys().next().map(String::as_str))
            .collect();
        assert_eq!(stages, ["$match", "$addFields", "$sort", "$limit", "$project"]);

        let sort = pipeline[2].get_document("$sort").unwrap();
        assert_eq!(sort.keys().next().map(String::as_str), Some("trendingScore"));
        assert_eq!(pipeline[3].get_i64("$limit").unwrap(), 5);
        let projection = pipeline[4].get_document("$project").unwrap();
        assert_eq!(projection.get_i32("trendingScore").unwrap(), 0);
        assert_eq!(projection.get_i32("updates").unwrap(), 0);
    }

    #[test]
    fn owners_cannot_self_approve_or_suspend() {
        use CampaignStatus::*;
        assert!(owner_may_set(Draft, Pending));
        assert!(owner_may_set(Active, Cancelled));
        assert!(!owner_may_set(Pending, Active));
        assert!(!owner_may_set(Active, Suspended));
        assert!(!owner_may_set(Suspended, Active));
        assert!(!owner_may_set(Completed, Cancelled));
    }
}
