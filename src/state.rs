use std::sync::Arc;

use mongodb::Database;

use crate::config::AppConfig;
use crate::database::donation_store::MongoDonationStore;
use crate::errors::Result;
use crate::middleware::rate_limit::RateLimiters;
use crate::middleware::request_meta::TrustedProxies;
use crate::services::donation_service::DonationService;
use crate::services::payment_gateway::StripeGateway;
use crate::services::token_service::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub donations: Arc<DonationService>,
    pub rate_limiters: Arc<RateLimiters>,
    pub trusted_proxies: Arc<TrustedProxies>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Result<Self> {
        let gateway = StripeGateway::new(&config)?;
        let store = MongoDonationStore::new(&db);
        let donations = DonationService::new(
            Arc::new(store),
            Arc::new(gateway),
            config.stripe_webhook_secret.clone(),
        );

        Ok(AppState {
            tokens: TokenService::from_config(&config),
            trusted_proxies: Arc::new(TrustedProxies::new(&config.trusted_proxies)),
            rate_limiters: Arc::new(RateLimiters::new()),
            donations: Arc::new(donations),
            config: Arc::new(config),
            db,
        })
    }
}
