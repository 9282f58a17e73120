//! Client provenance (address, user agent, referrer) for rate limiting and
//! audit entries.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use ipnet::IpNet;

use crate::models::audit_log::AuditLog;
use crate::models::donation::DonationMetadata;
use crate::state::AppState;

/// Proxies whose `X-Forwarded-For` header is believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNet>,
}

impl TrustedProxies {
    /// Accepts single addresses and CIDR ranges; unparsable entries are skipped.
    pub fn new(entries: &[String]) -> Self {
        let networks = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .parse::<IpNet>()
                    .ok()
                    .or_else(|| {
                        let ip = entry.parse::<IpAddr>().ok()?;
                        let host_bits = if ip.is_ipv4() { 32 } else { 128 };
                        IpNet::new(ip, host_bits).ok()
                    })
            })
            .collect::<Vec<_>>();

        if networks.len() != entries.len() {
            tracing::warn!("ignored unparsable TRUSTED_PROXIES entries");
        }
        TrustedProxies { networks }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// The peer address, or the leftmost forwarded address when the peer is
    /// a trusted proxy.
    pub fn client_ip(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer?;
        if !self.contains(peer) {
            return Some(peer);
        }
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        Some(forwarded.unwrap_or(peer))
    }
}

pub fn peer_ip(extensions: &axum::http::Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl ClientInfo {
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }

    /// Stamps an audit entry with this request's provenance.
    pub fn audit(&self, entry: AuditLog) -> AuditLog {
        entry.from_client(self.ip_string(), self.user_agent.clone())
    }

    pub fn donation_metadata(&self) -> DonationMetadata {
        DonationMetadata {
            ip_address: self.ip_string(),
            user_agent: self.user_agent.clone(),
            referrer: self.referrer.clone(),
            source: "web".to_string(),
        }
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientInfo {
            ip: state
                .trusted_proxies
                .client_ip(peer_ip(&parts.extensions), &parts.headers),
            user_agent: header_string(&parts.headers, header::USER_AGENT),
            referrer: header_string(&parts.headers, header::REFERER),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxies() -> TrustedProxies {
        TrustedProxies::new(&[
            "127.0.0.1".to_string(),
            "10.0.0.0/8".to_string(),
            "not-an-ip".to_string(),
        ])
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_addresses_and_ranges() {
        let p = proxies();
        assert!(p.contains("127.0.0.1".parse().unwrap()));
        assert!(p.contains("10.20.30.40".parse().unwrap()));
        assert!(!p.contains("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn forwarded_header_only_honoured_from_trusted_peer() {
        let p = proxies();
        let headers = forwarded("203.0.113.9, 10.0.0.2");

        let via_proxy = p.client_ip(Some("10.0.0.2".parse().unwrap()), &headers);
        assert_eq!(via_proxy, Some("203.0.113.9".parse().unwrap()));

        let spoofed = p.client_ip(Some("198.51.100.7".parse().unwrap()), &headers);
        assert_eq!(spoofed, Some("198.51.100.7".parse().unwrap()));

        let garbage = p.client_ip(Some("127.0.0.1".parse().unwrap()), &forwarded("unknown"));
        assert_eq!(garbage, Some("127.0.0.1".parse().unwrap()));

        assert_eq!(p.client_ip(None, &headers), None);
    }
}
