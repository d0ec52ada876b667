//! Prometheus text-exposition metrics (spec §10.4): task/workflow counts by
//! status, breaker state per key, rate-limiter rejections, alert deliveries
//! by channel/status.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref TASKS_BY_STATUS: IntGaugeVec = {
        let gauge = IntGaugeVec::new(
            Opts::new("watch_hive_tasks_total", "Tasks by status"),
            &["status"],
        )
        .expect("metric construction");
        REGISTRY.register(Box::new(gauge.clone())).expect("metric registration");
        gauge
    };

    pub static ref WORKFLOWS_BY_STATUS: IntGaugeVec = {
        let gauge = IntGaugeVec::new(
            Opts::new("watch_hive_workflows_total", "Workflows by status"),
            &["status"],
        )
        .expect("metric construction");
        REGISTRY.register(Box::new(gauge.clone())).expect("metric registration");
        gauge
    };

    pub static ref BREAKER_STATE: IntGaugeVec = {
        let gauge = IntGaugeVec::new(
            Opts::new("watch_hive_circuit_breaker_state", "0=closed 1=half_open 2=open, by breaker key"),
            &["breaker_key"],
        )
        .expect("metric construction");
        REGISTRY.register(Box::new(gauge.clone())).expect("metric registration");
        gauge
    };

    pub static ref RATE_LIMIT_REJECTIONS: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("watch_hive_rate_limit_rejections_total", "Rate limiter rejections by tier"),
            &["tier"],
        )
        .expect("metric construction");
        REGISTRY.register(Box::new(counter.clone())).expect("metric registration");
        counter
    };

    pub static ref ALERT_DELIVERIES: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("watch_hive_alert_deliveries_total", "Alert deliveries by channel and status"),
            &["channel", "status"],
        )
        .expect("metric construction");
        REGISTRY.register(Box::new(counter.clone())).expect("metric registration");
        counter
    };
}

/// Map a `CircuitState` to the gauge's numeric encoding.
#[must_use]
pub fn breaker_state_value(state: crate::infrastructure::circuit_breaker::CircuitState) -> i64 {
    use crate::infrastructure::circuit_breaker::CircuitState;
    match state {
        CircuitState::Closed => 0,
        CircuitState::HalfOpen => 1,
        CircuitState::Open => 2,
    }
}

/// Render the full registry in Prometheus text-exposition format, served at
/// `GET /metrics`.
pub fn render() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).expect("prometheus encoding never fails for valid metrics");
    String::from_utf8(buffer).expect("prometheus output is always valid utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        TASKS_BY_STATUS.with_label_values(&["pending"]).set(3);
        let text = render();
        assert!(text.contains("watch_hive_tasks_total"));
    }

    #[test]
    fn rate_limit_rejections_increment() {
        RATE_LIMIT_REJECTIONS.with_label_values(&["burst"]).inc();
        let text = render();
        assert!(text.contains("watch_hive_rate_limit_rejections_total"));
    }
}
