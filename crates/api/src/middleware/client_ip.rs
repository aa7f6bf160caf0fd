//! Client IP extraction for connection and rate limiting.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Extracts the real client IP, trusting `X-Forwarded-For` only when the
/// peer is a known reverse proxy. Parses the header right-to-left and skips
/// any hop that is itself a trusted proxy, so a client can't spoof the
/// header by prepending fake addresses before it reaches the first proxy.
pub fn extract_client_ip(
    headers: &HeaderMap,
    addr: SocketAddr,
    trusted_proxy_ips: &HashSet<IpAddr>,
) -> String {
    let peer_ip = addr.ip();

    if trusted_proxy_ips.contains(&peer_ip) {
        if let Some(forwarded) = headers.get("x-forwarded-for") {
            if let Ok(forwarded_str) = forwarded.to_str() {
                for ip_str in forwarded_str.rsplit(',') {
                    let ip = ip_str.trim();
                    if let Ok(parsed) = ip.parse::<IpAddr>() {
                        if !trusted_proxy_ips.contains(&parsed) {
                            return parsed.to_string();
                        }
                    }
                }
            }
        }
    }

    peer_ip.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn addr(ip: &str) -> SocketAddr {
        format!("{ip}:443").parse().unwrap()
    }

    #[test]
    fn ignores_forwarded_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        let trusted = HashSet::new();
        assert_eq!(extract_client_ip(&headers, addr("10.0.0.1"), &trusted), "10.0.0.1");
    }

    #[test]
    fn uses_rightmost_non_trusted_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("5.6.7.8, 10.0.0.2"));
        let mut trusted = HashSet::new();
        trusted.insert("10.0.0.1".parse().unwrap());
        trusted.insert("10.0.0.2".parse().unwrap());
        assert_eq!(extract_client_ip(&headers, addr("10.0.0.1"), &trusted), "5.6.7.8");
    }

    #[test]
    fn falls_back_when_forwarded_is_invalid() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        let mut trusted = HashSet::new();
        trusted.insert("10.0.0.1".parse().unwrap());
        assert_eq!(extract_client_ip(&headers, addr("10.0.0.1"), &trusted), "10.0.0.1");
    }
}
