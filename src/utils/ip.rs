use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

use crate::config::IpLookupSettings;

pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// ip-api.com field mask: status, message, country, region, city and friends.
const IP_API_FIELDS: u32 = 520191;

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
}

/// Picks the address of the real client.
///
/// Precedence: the CDN header, then the reverse proxy header, then the first
/// public entry of `X-Forwarded-For`, then the socket peer.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(ip) = header_ip(headers, CF_CONNECTING_IP) {
        return Some(ip);
    }

    if let Some(ip) = header_ip(headers, X_REAL_IP) {
        return Some(ip);
    }

    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter_map(|part| part.parse::<IpAddr>().ok())
                .find(is_public_routable)
        });
    if forwarded.is_some() {
        return forwarded;
    }

    peer.map(|addr| addr.ip())
}

/// Resolves `ip` to "city, country". `None` means the location is unknown.
pub async fn lookup_location(
    client: &Client,
    settings: &IpLookupSettings,
    ip: IpAddr,
) -> Option<String> {
    if !is_public_routable(&ip) {
        return None;
    }

    let url = format!("{}/{ip}", settings.base_url.trim_end_matches('/'));
    let response = match client
        .get(url)
        .query(&[
            ("fields", IP_API_FIELDS.to_string()),
            ("lang", settings.lang.clone()),
        ])
        .timeout(settings.timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(?err, %ip, "ip geolocation request failed");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), %ip, "ip geolocation returned an error status");
        return None;
    }

    let parsed: IpApiResponse = match response.json().await {
        Ok(value) => value,
        Err(err) => {
            warn!(?err, %ip, "failed to decode ip geolocation payload");
            return None;
        }
    };

    if parsed.status.as_deref() != Some("success") {
        return None;
    }

    Some(format!(
        "{}, {}",
        parsed.city.unwrap_or_default(),
        parsed.country.unwrap_or_default()
    ))
}

pub fn is_public_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
                || octets[0] == 0
                // 100.64.0.0/10 carrier-grade NAT
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
                // 240.0.0.0/4 reserved
                || octets[0] >= 240)
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_multicast()
                || v6.is_unicast_link_local()
                // 2001:db8::/32 documentation
                || (segments[0] == 0x2001 && segments[1] == 0x0db8))
        }
    }
}
