//! Prometheus metrics for the hub process. Counters are coarse and
//! connection/session/broadcast scoped; per-request histograms are left for
//! a later pass if operators ask for them.

use prometheus::{IntCounter, Registry};

pub struct Metrics {
    registry: Registry,
    pub connections_total: IntCounter,
    pub connections_rejected_total: IntCounter,
    pub sessions_created_total: IntCounter,
    pub sessions_ended_total: IntCounter,
    pub translations_broadcast_total: IntCounter,
    pub rate_limit_rejections_total: IntCounter,
    pub broadcast_drops_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_total =
            IntCounter::new("hub_connections_total", "WebSocket connections accepted").unwrap();
        let connections_rejected_total = IntCounter::new(
            "hub_connections_rejected_total",
            "WebSocket upgrades rejected by the per-IP connection limiter",
        )
        .unwrap();
        let sessions_created_total =
            IntCounter::new("hub_sessions_created_total", "Sessions created").unwrap();
        let sessions_ended_total =
            IntCounter::new("hub_sessions_ended_total", "Sessions transitioned to ended").unwrap();
        let translations_broadcast_total = IntCounter::new(
            "hub_translations_broadcast_total",
            "Translation messages broadcast to session subscribers",
        )
        .unwrap();
        let rate_limit_rejections_total = IntCounter::new(
            "hub_rate_limit_rejections_total",
            "Operations rejected by a per-admin rate limit bucket",
        )
        .unwrap();
        let broadcast_drops_total = IntCounter::new(
            "hub_broadcast_drops_total",
            "Translation broadcasts skipped for a recipient whose outbound queue passed the soft limit",
        )
        .unwrap();

        for counter in [
            &connections_total,
            &connections_rejected_total,
            &sessions_created_total,
            &sessions_ended_total,
            &translations_broadcast_total,
            &rate_limit_rejections_total,
            &broadcast_drops_total,
        ] {
            registry.register(Box::new(counter.clone())).unwrap();
        }

        Self {
            registry,
            connections_total,
            connections_rejected_total,
            sessions_created_total,
            sessions_ended_total,
            translations_broadcast_total,
            rate_limit_rejections_total,
            broadcast_drops_total,
        }
    }

    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        prometheus::TextEncoder::new().encode_to_string(&metric_families)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
