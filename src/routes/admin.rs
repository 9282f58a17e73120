use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::planned::{planned, PlannedFeature};
use crate::handlers::{admin, campaigns, notifications};
use crate::middleware::auth::{admin_only, authenticate};
use crate::state::AppState;

/// Everything under `/api/admin` requires an authenticated admin.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // users
        .route("/users", get(admin::list_users))
        .route("/users/:id", get(admin::get_user).delete(admin::delete_user))
        .route("/users/:id/status", put(admin::update_user_status))
        .route("/users/:id/role", put(admin::update_user_role))
        // campaigns
        .route("/campaigns", get(admin::list_campaigns))
        .route("/campaigns/pending", get(admin::pending_campaigns))
        .route("/campaigns/:id/approve", put(campaigns::approve_campaign))
        .route("/campaigns/:id/reject", put(campaigns::reject_campaign))
        .route("/campaigns/:id/suspend", put(campaigns::suspend_campaign))
        .route("/campaigns/:id/reconcile", post(admin::reconcile_campaign))
        // donations
        .route("/donations", get(planned(PlannedFeature::DonationManagement)))
        .route("/donations/flagged", get(planned(PlannedFeature::FlaggedDonations)))
        .route("/donations/:id/verify", put(planned(PlannedFeature::DonationVerification)))
        .route("/donations/:id/refund", post(planned(PlannedFeature::DonationRefund)))
        // reports
        .route("/financial/overview", get(admin::financial_overview))
        .route("/reports/financial", get(planned(PlannedFeature::FinancialReports)))
        .route("/reports/tax", get(planned(PlannedFeature::TaxReports)))
        .route("/reports/audit", get(planned(PlannedFeature::AuditReports)))
        .route("/stats/platform", get(admin::platform_stats))
        .route("/stats/overview", get(planned(PlannedFeature::PlatformOverview)))
        .route("/stats/growth", get(planned(PlannedFeature::GrowthStats)))
        .route("/stats/performance", get(planned(PlannedFeature::PerformanceStats)))
        // system
        .route("/logs/audit", get(admin::audit_logs))
        .route("/logs/errors", get(planned(PlannedFeature::ErrorLogs)))
        .route("/notifications/broadcast", post(notifications::broadcast))
        .route("/export/users", get(planned(PlannedFeature::DataExport)))
        .route("/export/campaigns", get(planned(PlannedFeature::DataExport)))
        .route("/export/donations", get(planned(PlannedFeature::DataExport)))
        .route("/settings", get(admin::get_settings).put(admin::update_settings))
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}
