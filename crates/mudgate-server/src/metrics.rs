//! In-process metrics sink.
//!
//! Plain atomics, no exporter pipeline: the gateway renders a Prometheus
//! text snapshot on demand from `/metrics`.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use crate::session::types::DisconnectReason;

/// Process-wide counters and gauges for the relay.
pub struct GatewayMetrics {
    connects_total: AtomicU64,
    disconnects_total: AtomicU64,
    disconnect_reasons: [AtomicU64; DisconnectReason::ALL.len()],

    frames_in_total: AtomicU64,
    frames_out_total: AtomicU64,
    upstream_bytes_in_total: AtomicU64,
    upstream_bytes_out_total: AtomicU64,

    blocked_port_total: AtomicU64,
    blocked_host_total: AtomicU64,
    protocol_mismatch_total: AtomicU64,
    rate_limit_events_total: AtomicU64,
    slow_client_disconnects_total: AtomicU64,

    active_sessions: AtomicI64,
    started: Instant,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            connects_total: AtomicU64::new(0),
            disconnects_total: AtomicU64::new(0),
            disconnect_reasons: Default::default(),
            frames_in_total: AtomicU64::new(0),
            frames_out_total: AtomicU64::new(0),
            upstream_bytes_in_total: AtomicU64::new(0),
            upstream_bytes_out_total: AtomicU64::new(0),
            blocked_port_total: AtomicU64::new(0),
            blocked_host_total: AtomicU64::new(0),
            protocol_mismatch_total: AtomicU64::new(0),
            rate_limit_events_total: AtomicU64::new(0),
            slow_client_disconnects_total: AtomicU64::new(0),
            active_sessions: AtomicI64::new(0),
            started: Instant::now(),
        }
    }

    /// A session reached `connected`.
    pub fn inc_connect(&self) {
        self.connects_total.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A connected session reached a terminal state.
    pub fn inc_disconnect(&self, reason: DisconnectReason) {
        self.disconnects_total.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.disconnect_reasons[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_in(&self) {
        self.frames_in_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_out(&self) {
        self.frames_out_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_upstream_bytes_in(&self, n: u64) {
        self.upstream_bytes_in_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_upstream_bytes_out(&self, n: u64) {
        self.upstream_bytes_out_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_blocked_port(&self) {
        self.blocked_port_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocked_host(&self) {
        self.blocked_host_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_protocol_mismatch(&self) {
        self.protocol_mismatch_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limit(&self) {
        self.rate_limit_events_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_slow_client(&self) {
        self.slow_client_disconnects_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of the active-sessions gauge.
    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Disconnect count for one reason label.
    pub fn disconnects_for(&self, reason: DisconnectReason) -> u64 {
        self.disconnect_reasons[reason.index()].load(Ordering::Relaxed)
    }

    pub fn rate_limit_events(&self) -> u64 {
        self.rate_limit_events_total.load(Ordering::Relaxed)
    }

    /// Render every metric in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);

        gauge(
            &mut out,
            "mudgate_active_sessions",
            "Current number of active upstream sessions",
            self.active_sessions.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_connects_total",
            "Total number of successful upstream connections",
            self.connects_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_disconnects_total",
            "Total number of session disconnections",
            self.disconnects_total.load(Ordering::Relaxed),
        );

        let _ = writeln!(
            out,
            "# HELP mudgate_disconnect_reason_total Number of disconnections by reason"
        );
        let _ = writeln!(out, "# TYPE mudgate_disconnect_reason_total counter");
        for reason in DisconnectReason::ALL {
            let _ = writeln!(
                out,
                "mudgate_disconnect_reason_total{{reason=\"{}\"}} {}",
                reason.as_str(),
                self.disconnect_reasons[reason.index()].load(Ordering::Relaxed),
            );
        }
        out.push('\n');

        counter(
            &mut out,
            "mudgate_frames_in_total",
            "Total browser frames received from clients",
            self.frames_in_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_frames_out_total",
            "Total browser frames sent to clients",
            self.frames_out_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_upstream_bytes_in_total",
            "Total bytes received from upstream servers",
            self.upstream_bytes_in_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_upstream_bytes_out_total",
            "Total bytes sent to upstream servers",
            self.upstream_bytes_out_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_blocked_port_total",
            "Connection attempts rejected by port policy",
            self.blocked_port_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_blocked_host_total",
            "Connection attempts rejected by host policy",
            self.blocked_host_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_protocol_mismatch_total",
            "Saved-destination connects rejected for a non-telnet protocol",
            self.protocol_mismatch_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_rate_limit_events_total",
            "Command frames rejected by the per-user rate limit",
            self.rate_limit_events_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "mudgate_slow_client_disconnects_total",
            "Sessions dropped because the browser could not keep up",
            self.slow_client_disconnects_total.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "mudgate_uptime_seconds",
            "Seconds since the gateway started",
            self.started.elapsed().as_secs() as i64,
        );

        out
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}\n");
}

fn gauge(out: &mut String, name: &str, help: &str, value: i64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_tracks_connect_and_disconnect() {
        let metrics = GatewayMetrics::new();
        metrics.inc_connect();
        metrics.inc_connect();
        assert_eq!(metrics.active_sessions(), 2);

        metrics.inc_disconnect(DisconnectReason::IdleTimeout);
        assert_eq!(metrics.active_sessions(), 1);
        assert_eq!(metrics.disconnects_for(DisconnectReason::IdleTimeout), 1);
        assert_eq!(metrics.disconnects_for(DisconnectReason::User), 0);
    }

    #[test]
    fn render_contains_all_reason_labels() {
        let metrics = GatewayMetrics::new();
        metrics.inc_connect();
        metrics.inc_disconnect(DisconnectReason::HardCap);

        let text = metrics.render();
        for reason in DisconnectReason::ALL {
            assert!(
                text.contains(&format!("reason=\"{}\"", reason.as_str())),
                "missing label {}",
                reason.as_str()
            );
        }
        assert!(text.contains("mudgate_disconnect_reason_total{reason=\"hard_cap\"} 1"));
        assert!(text.contains("mudgate_active_sessions 0"));
    }

    #[test]
    fn render_is_prometheus_shaped() {
        let metrics = GatewayMetrics::new();
        metrics.inc_frames_in();
        metrics.add_upstream_bytes_in(42);
        metrics.inc_rate_limit();

        let text = metrics.render();
        assert!(text.contains("# TYPE mudgate_connects_total counter"));
        assert!(text.contains("# TYPE mudgate_active_sessions gauge"));
        assert!(text.contains("mudgate_frames_in_total 1"));
        assert!(text.contains("mudgate_upstream_bytes_in_total 42"));
        assert!(text.contains("mudgate_rate_limit_events_total 1"));
    }
}
