// Private module declaration
mod server;

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order core
// ============================================================================
//
// - Order placement (successes, rejections by error code, latency)
// - Status transitions
// - Payment-success event outcomes
// - Recovery actions
// - Integrity monitor gauges
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Placement Metrics
    pub orders_placed: IntCounter,
    pub order_rejections: IntCounterVec,
    pub placement_duration: Histogram,

    // Lifecycle Metrics
    pub status_transitions: IntCounterVec,
    pub payment_events: IntCounterVec,

    // Recovery Metrics
    pub recovery_actions: IntCounterVec,

    // Monitor Gauges
    pub active_orders: IntGauge,
    pub incomplete_orders: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new(
            "orders_placed_total",
            "Orders committed by the creation routine",
        )?;
        registry.register(Box::new(orders_placed.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Order creation failures by error code"),
            &["code"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        let placement_duration = Histogram::with_opts(
            HistogramOpts::new("order_placement_duration_seconds", "Order creation transaction duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(placement_duration.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed order status changes"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let payment_events = IntCounterVec::new(
            Opts::new("payment_events_total", "Payment-success events by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_events.clone()))?;

        let recovery_actions = IntCounterVec::new(
            Opts::new("recovery_actions_total", "Recovery command actions"),
            &["action"],
        )?;
        registry.register(Box::new(recovery_actions.clone()))?;

        let active_orders = IntGauge::new(
            "active_orders",
            "Paid orders in Pending or On the Way at the last monitor scan",
        )?;
        registry.register(Box::new(active_orders.clone()))?;

        let incomplete_orders = IntGauge::new(
            "incomplete_orders",
            "Orders failing the completeness predicate at the last monitor scan",
        )?;
        registry.register(Box::new(incomplete_orders.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            order_rejections,
            placement_duration,
            status_transitions,
            payment_events,
            recovery_actions,
            active_orders,
            incomplete_orders,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_placement(&self, duration_secs: f64, rejection_code: Option<&str>) {
        self.placement_duration.observe(duration_secs);
        match rejection_code {
            None => self.orders_placed.inc(),
            Some(code) => self.order_rejections.with_label_values(&[code]).inc(),
        }
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_payment_event(&self, outcome: &str) {
        self.payment_events.with_label_values(&[outcome]).inc();
    }

    pub fn record_recovery_action(&self, action: &str) {
        self.recovery_actions.with_label_values(&[action]).inc();
    }

    pub fn update_monitor_gauges(&self, active: u64, incomplete: u64) {
        self.active_orders.set(active as i64);
        self.incomplete_orders.set(incomplete as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_placement() {
        let metrics = Metrics::new().unwrap();
        metrics.record_placement(0.01, None);
        metrics.record_placement(0.002, Some("empty-bag-list"));
        metrics.record_placement(0.002, Some("empty-bag-list"));

        let gathered = metrics.registry.gather();
        let placed = gathered.iter().find(|m| m.name() == "orders_placed_total").unwrap();
        assert_eq!(placed.metric[0].counter.value, Some(1.0));

        let rejected = gathered.iter().find(|m| m.name() == "order_rejections_total").unwrap();
        assert_eq!(rejected.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_transitions_labelled_by_status() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition("Pending", "On the Way");
        metrics.record_transition("On the Way", "Delivered");

        let gathered = metrics.registry.gather();
        let transitions = gathered.iter().find(|m| m.name() == "order_status_transitions_total").unwrap();
        assert_eq!(transitions.metric.len(), 2);
    }

    #[test]
    fn test_monitor_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.update_monitor_gauges(4, 1);

        let gathered = metrics.registry.gather();
        let incomplete = gathered.iter().find(|m| m.name() == "incomplete_orders").unwrap();
        assert_eq!(incomplete.metric[0].gauge.value, Some(1.0));
    }
}
