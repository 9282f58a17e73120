//! Endpoints the frontend already calls but the platform does not provide yet.
//!
//! Each one is a variant here so the route table stays stable and every stub
//! answers with the same 501 body.

use std::fmt;
use std::future::{ready, Ready};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedFeature {
    GoogleAuth,
    FacebookAuth,
    PayhereWebhook,
    DonationLookup,
    DonationCancellation,
    DonationRefund,
    DonationReceipt,
    TaxSummary,
    RecurringDonations,
    DonationManagement,
    FlaggedDonations,
    DonationVerification,
    FinancialReports,
    TaxReports,
    AuditReports,
    PlatformOverview,
    GrowthStats,
    PerformanceStats,
    ErrorLogs,
    DataExport,
}

impl PlannedFeature {
    pub fn label(self) -> &'static str {
        match self {
            PlannedFeature::GoogleAuth => "Google authentication",
            PlannedFeature::FacebookAuth => "Facebook authentication",
            PlannedFeature::PayhereWebhook => "PayHere webhook",
            PlannedFeature::DonationLookup => "Donation lookup",
            PlannedFeature::DonationCancellation => "Donation cancellation",
            PlannedFeature::DonationRefund => "Refund processing",
            PlannedFeature::DonationReceipt => "Receipt generation",
            PlannedFeature::TaxSummary => "Tax summary",
            PlannedFeature::RecurringDonations => "Recurring donations",
            PlannedFeature::DonationManagement => "Donation management",
            PlannedFeature::FlaggedDonations => "Flagged donations",
            PlannedFeature::DonationVerification => "Donation verification",
            PlannedFeature::FinancialReports => "Financial reports",
            PlannedFeature::TaxReports => "Tax reports",
            PlannedFeature::AuditReports => "Audit reports",
            PlannedFeature::PlatformOverview => "Platform overview",
            PlannedFeature::GrowthStats => "Growth stats",
            PlannedFeature::PerformanceStats => "Performance stats",
            PlannedFeature::ErrorLogs => "Error logs",
            PlannedFeature::DataExport => "Data export",
        }
    }
}

impl fmt::Display for PlannedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handler for a route whose feature is not available yet.
///
/// ```ignore
/// .route("/tax-summary", get(planned(PlannedFeature::TaxSummary)))
/// ```
pub fn planned(
    feature: PlannedFeature,
) -> impl FnOnce() -> Ready<AppError> + Clone + Send + Sync + 'static {
    move || ready(AppError::Unimplemented(feature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn planned_handler_answers_501() {
        let handler = planned(PlannedFeature::RecurringDonations);
        let response = handler().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn message_names_the_feature() {
        let err = AppError::Unimplemented(PlannedFeature::FlaggedDonations);
        assert_eq!(err.to_string(), "Flagged donations not yet implemented");
    }
}
