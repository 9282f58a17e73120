use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::donations;
use crate::handlers::planned::{planned, PlannedFeature};
use crate::middleware::{auth::authenticate, rate_limit};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let checkout = Router::new()
        .route("/create-payment-intent", post(donations::create_payment_intent))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::donation));

    let confirm = Router::new()
        .route("/confirm", post(donations::confirm_donation))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::payment));

    let public = Router::new()
        .route("/webhook", post(donations::stripe_webhook))
        .route("/webhook/stripe", post(donations::stripe_webhook))
        .route("/webhook/payhere", post(planned(PlannedFeature::PayhereWebhook)))
        .route("/recent", get(donations::recent_donations))
        .route("/top", get(donations::top_donations))
        .route("/stats", get(donations::donation_stats));

    let donor = Router::new()
        .route("/my-donations", get(donations::my_donations))
        .route("/history/:email", get(donations::donation_history))
        .route("/tax-summary", get(planned(PlannedFeature::TaxSummary)))
        .route("/recurring", post(planned(PlannedFeature::RecurringDonations)))
        .route("/recurring/my", get(planned(PlannedFeature::RecurringDonations)))
        .route("/recurring/:id/cancel", put(planned(PlannedFeature::RecurringDonations)))
        .route("/recurring/:id/pause", put(planned(PlannedFeature::RecurringDonations)))
        .route("/recurring/:id/resume", put(planned(PlannedFeature::RecurringDonations)))
        .route("/:id", get(planned(PlannedFeature::DonationLookup)))
        .route("/:id/cancel", post(planned(PlannedFeature::DonationCancellation)))
        .route("/:id/refund", post(planned(PlannedFeature::DonationRefund)))
        .route("/:id/receipt", get(planned(PlannedFeature::DonationReceipt)))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    checkout.merge(confirm).merge(public).merge(donor)
}
