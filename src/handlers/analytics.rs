//! Read-only aggregations behind the dashboards.
//!
//! Everything here is a count, sum or group-by over the three main
//! collections, optionally limited to a trailing [`Period`].

use axum::{
    extract::State,
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection,
};
use serde_json::{json, Value};

use crate::database::{document_to_json, number, CAMPAIGNS, DONATIONS, USERS};
use crate::dtos::admin_dtos::PeriodQuery;
use crate::errors::{AppError, Result};
use crate::handlers::auth::find_user;
use crate::handlers::campaigns::{category_breakdown, load_campaign};
use crate::handlers::donations::donation_totals;
use crate::middleware::auth::CurrentUser;
use crate::middleware::extract::{AppPath, AppQuery};
use crate::models::campaign::{progress_percentage, CampaignResponse, CampaignStatus};
use crate::models::common::Period;
use crate::models::donation::DonationStatus;
use crate::models::user::{DonorLevel, Role};
use crate::state::AppState;

const COMPLETED: &str = "completed";

fn collection(state: &AppState, name: &str) -> Collection<Document> {
    state.db.collection(name)
}

fn since(period: Period) -> Document {
    doc! { "$gte": period.cutoff_bson(Utc::now()) }
}

fn parse_period(query: &PeriodQuery) -> Result<Period> {
    Period::parse(query.period.as_deref())
}

async fn count(state: &AppState, name: &str, filter: Document) -> Result<u64> {
    Ok(collection(state, name).count_documents(filter).await?)
}

async fn aggregate(state: &AppState, name: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
    Ok(collection(state, name)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?)
}

fn rows_to_json(rows: Vec<Document>) -> Vec<Value> {
    rows.into_iter().map(document_to_json).collect()
}

/// Per-day counts (and amount sums when `amount_field` is given), oldest first.
fn daily_pipeline(filter: Document, amount_field: Option<&str>) -> Vec<Document> {
    let mut group = doc! {
        "_id": { "$dateToString": { "format": "%Y-%m-%d", "date": "$createdAt" } },
        "count": { "$sum": 1 },
    };
    if let Some(field) = amount_field {
        group.insert("amount", doc! { "$sum": format!("${}", field) });
    }
    vec![
        doc! { "$match": filter },
        doc! { "$group": group },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Sum of `raised` and count over a creator's campaigns.
async fn leader_totals(state: &AppState, creator: ObjectId) -> Result<(u64, u64, f64, i64)> {
    let rows = aggregate(
        state,
        CAMPAIGNS,
        vec![
            doc! { "$match": { "creator": creator } },
            doc! { "$group": {
                "_id": null,
                "total": { "$sum": 1 },
                "active": { "$sum": { "$cond": [{ "$eq": ["$status", "active"] }, 1, 0] } },
                "raised": { "$sum": "$raised" },
                "donations": { "$sum": "$donationCount" },
            }},
        ],
    )
    .await?;
    Ok(rows
        .first()
        .map(|r| {
            (
                number(r, "total") as u64,
                number(r, "active") as u64,
                number(r, "raised"),
                number(r, "donations") as i64,
            )
        })
        .unwrap_or((0, 0, 0.0, 0)))
}

async fn supported_campaigns(state: &AppState, donor: ObjectId) -> Result<usize> {
    Ok(collection(state, DONATIONS)
        .distinct("campaign", doc! { "donor": donor, "status": COMPLETED })
        .await?
        .len())
}

pub async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let stats = match user.role {
        Role::Admin => {
            let (donations, amount, _) = donation_totals(&state, Document::new()).await?;
            json!({
                "campaigns": {
                    "total": count(&state, CAMPAIGNS, Document::new()).await?,
                    "active": count(&state, CAMPAIGNS, doc! { "status": "active" }).await?,
                },
                "donations": { "total": donations },
                "amount": { "total": amount },
                "users": { "total": count(&state, USERS, Document::new()).await? },
            })
        }
        Role::CampaignLeader => {
            let (total, active, raised, donations) = leader_totals(&state, user.id).await?;
            json!({
                "campaigns": { "total": total, "active": active },
                "donations": { "total": donations },
                "amount": { "total": raised },
            })
        }
        Role::Donor | Role::Public => {
            let (donations, amount, _) = donation_totals(&state, doc! { "donor": user.id }).await?;
            json!({
                "donations": { "total": donations },
                "amount": { "total": amount },
                "campaigns": { "supported": supported_campaigns(&state, user.id).await? },
            })
        }
    };
    Ok(Json(json!({ "success": true, "stats": stats })))
}

/// Donors earn a point per 100 donated, leaders a point per 50 raised.
pub(crate) fn impact_points(role: Role, amount: f64) -> i64 {
    let per_point = match role {
        Role::Donor | Role::Public => 100.0,
        Role::CampaignLeader => 50.0,
        Role::Admin => return 0,
    };
    (amount / per_point).floor() as i64
}

pub async fn user_stats(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let overview = match user.role {
        Role::CampaignLeader => {
            let (total, _, raised, _) = leader_totals(&state, user.id).await?;
            json!({
                "totalDonated": 0,
                "donationCount": 0,
                "campaignsSupported": 0,
                "campaignsCreated": total,
                "totalRaised": raised,
                "impactPoints": impact_points(Role::CampaignLeader, raised),
                "donorLevel": "Leader",
            })
        }
        Role::Admin => json!({
            "totalDonated": 0,
            "donationCount": 0,
            "campaignsSupported": 0,
            "campaignsCreated": 0,
            "totalRaised": 0,
            "impactPoints": 0,
            "donorLevel": "Admin",
        }),
        Role::Donor | Role::Public => {
            let account = find_user(&state, &user.id).await?;
            let stats = account.donation_stats;
            json!({
                "totalDonated": stats.total_donated,
                "donationCount": stats.donation_count,
                "campaignsSupported": stats.campaigns_supported,
                "campaignsCreated": 0,
                "totalRaised": 0,
                "impactPoints": impact_points(user.role, stats.total_donated),
                "donorLevel": DonorLevel::from_total(stats.total_donated).as_str(),
            })
        }
    };
    Ok(Json(json!({ "success": true, "overview": overview })))
}

pub async fn trends(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Value>> {
    let period = parse_period(&query)?;
    let donations = aggregate(
        &state,
        DONATIONS,
        daily_pipeline(doc! { "status": COMPLETED, "createdAt": since(period) }, Some("amount")),
    )
    .await?;
    let campaigns = aggregate(
        &state,
        CAMPAIGNS,
        daily_pipeline(doc! { "createdAt": since(period) }, None),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "trends": {
            "donations": rows_to_json(donations),
            "campaigns": rows_to_json(campaigns),
        },
        "period": period,
    })))
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Value>> {
    let mut breakdown =
        category_breakdown(&state, doc! { "status": CampaignStatus::Active.as_str() }).await?;
    breakdown.sort_by(|a, b| {
        let raised = |v: &Value| v["totalRaised"].as_f64().unwrap_or(0.0);
        raised(b).total_cmp(&raised(a))
    });
    Ok(Json(json!({ "success": true, "breakdown": breakdown })))
}

pub async fn campaign_overview(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let filter = if user.is_admin() {
        Document::new()
    } else {
        doc! { "creator": user.id }
    };

    let recent: Vec<Document> = collection(&state, CAMPAIGNS)
        .find(filter.clone())
        .sort(doc! { "createdAt": -1 })
        .limit(10)
        .projection(doc! {
            "title": 1, "status": 1, "raised": 1, "goal": 1,
            "donationCount": 1, "analytics.donorCount": 1, "createdAt": 1,
        })
        .await?
        .try_collect()
        .await?;

    let summary = aggregate(
        &state,
        CAMPAIGNS,
        vec![
            doc! { "$match": filter },
            doc! { "$group": {
                "_id": null,
                "total": { "$sum": 1 },
                "active": { "$sum": { "$cond": [{ "$eq": ["$status", "active"] }, 1, 0] } },
                "totalRaised": { "$sum": "$raised" },
                "totalGoal": { "$sum": "$goal" },
            }},
            doc! { "$project": { "_id": 0 } },
        ],
    )
    .await?;
    let summary = summary
        .into_iter()
        .next()
        .map(document_to_json)
        .unwrap_or_else(|| json!({ "total": 0, "active": 0, "totalRaised": 0, "totalGoal": 0 }));

    Ok(Json(json!({
        "success": true,
        "overview": { "campaigns": rows_to_json(recent), "summary": summary },
    })))
}

pub async fn campaign_performance(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>> {
    let campaign = load_campaign(&state, &id).await?;
    if !user.can_manage(&campaign.creator) {
        return Err(AppError::forbidden("Not authorized to view this campaign's analytics"));
    }
    let campaign_id = campaign
        .id
        .ok_or_else(|| AppError::Internal("stored campaign has no id".into()))?;

    let daily = aggregate(
        &state,
        DONATIONS,
        daily_pipeline(doc! { "campaign": campaign_id, "status": COMPLETED }, Some("amount")),
    )
    .await?;
    let (donations, raised, average) =
        donation_totals(&state, doc! { "campaign": campaign_id }).await?;
    let unique_donors = collection(&state, DONATIONS)
        .distinct("donorEmail", doc! { "campaign": campaign_id, "status": COMPLETED })
        .await?
        .len();
    let analytics = &campaign.analytics;
    let conversion = if analytics.views > 0 {
        donations as f64 / analytics.views as f64 * 100.0
    } else {
        0.0
    };

    Ok(Json(json!({
        "success": true,
        "performance": {
            "campaign": CampaignResponse::summary(campaign.clone()),
            "donations": donations,
            "raisedFromDonations": raised,
            "averageDonation": average,
            "uniqueDonors": unique_donors,
            "views": analytics.views,
            "shares": analytics.shares,
            "conversionRate": conversion,
            "progressPercentage": progress_percentage(campaign.raised, campaign.goal),
            "daily": rows_to_json(daily),
        },
    })))
}

pub async fn donation_summary(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let mut filter = doc! { "status": DonationStatus::Completed.as_str() };
    if user.role == Role::Donor {
        filter.insert("donor", user.id);
    }

    let rows = aggregate(
        &state,
        DONATIONS,
        vec![
            doc! { "$match": filter },
            doc! { "$group": {
                "_id": null,
                "totalAmount": { "$sum": "$amount" },
                "totalDonations": { "$sum": 1 },
                "averageAmount": { "$avg": "$amount" },
                "maxAmount": { "$max": "$amount" },
                "minAmount": { "$min": "$amount" },
            }},
            doc! { "$project": { "_id": 0 } },
        ],
    )
    .await?;
    let summary = rows.into_iter().next().map(document_to_json).unwrap_or_else(|| {
        json!({
            "totalAmount": 0,
            "totalDonations": 0,
            "averageAmount": 0,
            "maxAmount": 0,
            "minAmount": 0,
        })
    });
    Ok(Json(json!({ "success": true, "summary": summary })))
}

pub async fn donation_trends(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Value>> {
    let period = parse_period(&query)?;
    let mut filter = doc! { "status": COMPLETED, "createdAt": since(period) };

    // Leaders see trends for their own campaigns only.
    if !user.is_admin() {
        let own = collection(&state, CAMPAIGNS)
            .distinct("_id", doc! { "creator": user.id })
            .await?;
        filter.insert("campaign", doc! { "$in": own });
    }

    let trends = aggregate(&state, DONATIONS, daily_pipeline(filter, Some("amount"))).await?;
    Ok(Json(json!({ "success": true, "trends": rows_to_json(trends), "period": period })))
}

/// Counts for the admin dashboards, with role and status breakdowns.
pub(crate) async fn platform_stats_data(state: &AppState) -> Result<Value> {
    let (donations, amount, average) = donation_totals(state, Document::new()).await?;
    let by_role = aggregate(
        state,
        USERS,
        vec![doc! { "$group": { "_id": "$role", "count": { "$sum": 1 } } }],
    )
    .await?;
    let by_status = aggregate(
        state,
        CAMPAIGNS,
        vec![doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } }],
    )
    .await?;
    let tally = |rows: &[Document], key: &str| -> u64 {
        rows.iter()
            .find(|r| r.get_str("_id").ok() == Some(key))
            .map(|r| number(r, "count") as u64)
            .unwrap_or(0)
    };

    Ok(json!({
        "campaigns": {
            "total": by_status.iter().map(|r| number(r, "count") as u64).sum::<u64>(),
            "active": tally(&by_status, "active"),
            "pending": tally(&by_status, "pending"),
        },
        "donations": {
            "total": donations,
            "totalAmount": amount,
            "averageAmount": average,
        },
        "users": {
            "total": by_role.iter().map(|r| number(r, "count") as u64).sum::<u64>(),
            "donors": tally(&by_role, Role::Donor.as_str()),
            "leaders": tally(&by_role, Role::CampaignLeader.as_str()),
            "admins": tally(&by_role, Role::Admin.as_str()),
        },
        "usersByRole": rows_to_json(by_role),
        "campaignsByStatus": rows_to_json(by_status),
    }))
}

pub async fn platform_stats(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(json!({ "success": true, "stats": platform_stats_data(&state).await? })))
}

pub async fn user_analytics(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Value>> {
    let period = parse_period(&query)?;
    let new_users = count(&state, USERS, doc! { "createdAt": since(period) }).await?;
    let active_donors = collection(&state, DONATIONS)
        .distinct(
            "donor",
            doc! { "status": COMPLETED, "createdAt": since(period), "donor": { "$ne": null } },
        )
        .await?
        .len();
    let growth = aggregate(&state, USERS, daily_pipeline(doc! { "createdAt": since(period) }, None)).await?;

    Ok(Json(json!({
        "success": true,
        "analytics": {
            "newUsers": new_users,
            "activeUsers": active_donors,
            "userGrowth": rows_to_json(growth),
        },
        "period": period,
    })))
}

/// Revenue totals for the window: overall, per day and per campaign category.
pub(crate) async fn financial_report_data(state: &AppState, period: Period) -> Result<Value> {
    let filter = doc! { "status": COMPLETED, "createdAt": since(period) };
    let (count, total, average) =
        donation_totals(state, doc! { "createdAt": since(period) }).await?;
    let by_day = aggregate(state, DONATIONS, daily_pipeline(filter.clone(), Some("amount"))).await?;
    let by_category = aggregate(
        state,
        DONATIONS,
        vec![
            doc! { "$match": filter },
            doc! { "$lookup": {
                "from": CAMPAIGNS,
                "localField": "campaign",
                "foreignField": "_id",
                "as": "campaignData",
            }},
            doc! { "$unwind": "$campaignData" },
            doc! { "$group": {
                "_id": "$campaignData.category",
                "amount": { "$sum": "$amount" },
                "count": { "$sum": 1 },
            }},
            doc! { "$sort": { "amount": -1 } },
        ],
    )
    .await?;

    Ok(json!({
        "totalRevenue": total,
        "donationCount": count,
        "averageDonation": average,
        "revenueByDay": rows_to_json(by_day),
        "revenueByCategory": rows_to_json(by_category),
    }))
}

pub async fn financial_report(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Value>> {
    let period = parse_period(&query)?;
    let report = financial_report_data(&state, period).await?;
    Ok(Json(json!({ "success": true, "report": report, "period": period })))
}

#[derive(Debug, serde::Deserialize)]
pub struct ExportQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub format: Option<String>,
}

pub async fn export(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ExportQuery>,
) -> Result<Json<Value>> {
    if query.format.as_deref().unwrap_or("json") != "json" {
        return Err(AppError::invalid_data("Unsupported export format"));
    }
    if query.kind.as_deref().unwrap_or("summary") != "summary" {
        return Err(AppError::invalid_data("Unsupported export type"));
    }

    let (donations, amount, _) = donation_totals(&state, Document::new()).await?;
    Ok(Json(json!({
        "success": true,
        "summary": {
            "totalCampaigns": count(&state, CAMPAIGNS, Document::new()).await?,
            "totalDonations": donations,
            "totalAmount": amount,
            "generatedAt": Utc::now().to_rfc3339(),
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_points_per_role() {
        assert_eq!(impact_points(Role::Donor, 1_050.0), 10);
        assert_eq!(impact_points(Role::CampaignLeader, 1_050.0), 21);
        assert_eq!(impact_points(Role::Admin, 1_050.0), 0);
        assert_eq!(impact_points(Role::Donor, 99.0), 0);
    }

    #[test]
    fn daily_pipeline_groups_by_calendar_day() {
        let pipeline = daily_pipeline(doc! { "status": COMPLETED }, Some("amount"));
        assert_eq!(pipeline.len(), 3);
        let group = pipeline[1].get_document("$group").unwrap();
        assert_eq!(group.get_document("amount").unwrap().get_str("$sum").unwrap(), "$amount");
        let key = group.get_document("_id").unwrap().get_document("$dateToString").unwrap();
        assert_eq!(key.get_str("format").unwrap(), "%Y-%m-%d");

        let counts_only = daily_pipeline(Document::new(), None);
        assert!(!counts_only[1].get_document("$group").unwrap().contains_key("amount"));
    }
}
