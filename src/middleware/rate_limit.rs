//! Per-IP request budgets at the HTTP boundary.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

use crate::errors::{AppError, Result};
use crate::middleware::request_meta::peer_ip;
use crate::state::AppState;

type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    General,
    Auth,
    Donation,
    Campaign,
    PasswordReset,
    Payment,
}

impl Policy {
    /// Requests allowed per window.
    pub fn budget(self) -> (u32, Duration) {
        match self {
            Policy::General => (100, Duration::from_secs(15 * 60)),
            Policy::Auth => (5, Duration::from_secs(15 * 60)),
            Policy::Donation => (3, Duration::from_secs(5 * 60)),
            Policy::Campaign => (5, Duration::from_secs(60 * 60)),
            Policy::PasswordReset => (3, Duration::from_secs(60 * 60)),
            Policy::Payment => (10, Duration::from_secs(60)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Policy::General => "general",
            Policy::Auth => "auth",
            Policy::Donation => "donation",
            Policy::Campaign => "campaign",
            Policy::PasswordReset => "password-reset",
            Policy::Payment => "payment",
        }
    }

    /// Full budget available as a burst, refilled evenly over the window.
    fn quota(self) -> Quota {
        let (requests, window) = self.budget();
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

pub struct RateLimiters {
    general: IpRateLimiter,
    auth: IpRateLimiter,
    donation: IpRateLimiter,
    campaign: IpRateLimiter,
    password_reset: IpRateLimiter,
    payment: IpRateLimiter,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiters {
    pub fn new() -> Self {
        RateLimiters {
            general: RateLimiter::keyed(Policy::General.quota()),
            auth: RateLimiter::keyed(Policy::Auth.quota()),
            donation: RateLimiter::keyed(Policy::Donation.quota()),
            campaign: RateLimiter::keyed(Policy::Campaign.quota()),
            password_reset: RateLimiter::keyed(Policy::PasswordReset.quota()),
            payment: RateLimiter::keyed(Policy::Payment.quota()),
        }
    }

    fn limiter(&self, policy: Policy) -> &IpRateLimiter {
        match policy {
            Policy::General => &self.general,
            Policy::Auth => &self.auth,
            Policy::Donation => &self.donation,
            Policy::Campaign => &self.campaign,
            Policy::PasswordReset => &self.password_reset,
            Policy::Payment => &self.payment,
        }
    }

    /// `Err(seconds)` when `ip` has spent its budget for `policy`.
    pub fn check(&self, policy: Policy, ip: IpAddr) -> std::result::Result<(), u64> {
        self.limiter(policy).check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            wait.as_secs().max(1)
        })
    }

    /// Drops state for addresses whose budget has fully refilled.
    pub fn prune(&self) {
        for policy in [
            Policy::General,
            Policy::Auth,
            Policy::Donation,
            Policy::Campaign,
            Policy::PasswordReset,
            Policy::Payment,
        ] {
            let limiter = self.limiter(policy);
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }
}

async fn enforce(state: &AppState, policy: Policy, request: Request, next: Next) -> Result<Response> {
    let ip = state
        .trusted_proxies
        .client_ip(peer_ip(request.extensions()), request.headers());

    if let Some(ip) = ip {
        if let Err(retry_after) = state.rate_limiters.check(policy, ip) {
            tracing::warn!(%ip, policy = policy.name(), retry_after, "rate limit exceeded");
            return Err(AppError::RateLimitExceeded { retry_after });
        }
    }
    Ok(next.run(request).await)
}

pub async fn general(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    enforce(&state, Policy::General, request, next).await
}

pub async fn auth(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    enforce(&state, Policy::Auth, request, next).await
}

pub async fn donation(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    enforce(&state, Policy::Donation, request, next).await
}

pub async fn campaign(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    enforce(&state, Policy::Campaign, request, next).await
}

pub async fn password_reset(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    enforce(&state, Policy::PasswordReset, request, next).await
}

pub async fn payment(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    enforce(&state, Policy::Payment, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_allow_burst_then_reject() {
        let limiters = RateLimiters::new();
        let ip: IpAddr = "203.0.113.1".parse().unwrap();

        for _ in 0..3 {
            assert!(limiters.check(Policy::Donation, ip).is_ok());
        }
        let retry_after = limiters.check(Policy::Donation, ip).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 100);

        // other addresses and other policies have their own budget
        assert!(limiters.check(Policy::Donation, "203.0.113.2".parse().unwrap()).is_ok());
        assert!(limiters.check(Policy::Payment, ip).is_ok());
    }

    #[test]
    fn auth_budget_is_five() {
        let limiters = RateLimiters::new();
        let ip: IpAddr = "198.51.100.4".parse().unwrap();
        let allowed = (0..10)
            .filter(|_| limiters.check(Policy::Auth, ip).is_ok())
            .count();
        assert_eq!(allowed, 5);
    }
}
