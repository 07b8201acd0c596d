//! Prometheus metrics collection for KeyRouter
//!
//! Tracks routing decisions by policy, empty routes, retry classifications,
//! recorded usage events and state persistence failures. Exposed via the
//! `/metrics` endpoint in Prometheus text format.
//!
//! All label values come from closed enums ([`RoutePolicy`],
//! [`RetryErrorClass`], [`UsageStatus`]), so cardinality is fixed.

use crate::retry::RetryErrorClass;
use crate::router::RoutePolicy;
use crate::state::UsageStatus;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector for KeyRouter
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    route_decisions: IntCounterVec,
    routing_duration: HistogramVec,
    empty_routes: IntCounter,
    retry_classifications: IntCounterVec,
    usage_events: IntCounterVec,
    state_write_failures: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 3 policies
        let route_decisions = IntCounterVec::new(
            Opts::new(
                "keyrouter_route_decisions_total",
                "Total routing decisions by selected policy",
            ),
            &["policy"],
        )?;

        let routing_duration = HistogramVec::new(
            HistogramOpts::new(
                "keyrouter_routing_duration_ms",
                "Routing decision latency in milliseconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0]),
            &["policy"],
        )?;

        let empty_routes = IntCounter::with_opts(Opts::new(
            "keyrouter_empty_routes_total",
            "Routing decisions that produced no candidate after filtering",
        ))?;

        // Cardinality: 6 error classes
        let retry_classifications = IntCounterVec::new(
            Opts::new(
                "keyrouter_retry_classifications_total",
                "Classified provider errors by error class",
            ),
            &["error_class"],
        )?;

        // Cardinality: 3 statuses
        let usage_events = IntCounterVec::new(
            Opts::new(
                "keyrouter_usage_events_total",
                "Usage events recorded to the state store by status",
            ),
            &["status"],
        )?;

        // Alert on any increment: usage and cooldowns are being lost
        let state_write_failures = IntCounter::with_opts(Opts::new(
            "keyrouter_state_write_failures_total",
            "Failed writes of the persisted usage/quota state",
        ))?;

        registry.register(Box::new(route_decisions.clone()))?;
        registry.register(Box::new(routing_duration.clone()))?;
        registry.register(Box::new(empty_routes.clone()))?;
        registry.register(Box::new(retry_classifications.clone()))?;
        registry.register(Box::new(usage_events.clone()))?;
        registry.register(Box::new(state_write_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            route_decisions,
            routing_duration,
            empty_routes,
            retry_classifications,
            usage_events,
            state_write_failures,
        })
    }

    /// Record a routing decision under its policy
    pub fn record_route(
        &self,
        policy: RoutePolicy,
        candidates: usize,
    ) -> Result<(), prometheus::Error> {
        self.route_decisions
            .get_metric_with_label_values(&[policy.as_str()])?
            .inc();
        if candidates == 0 {
            self.empty_routes.inc();
        }
        Ok(())
    }

    /// Record routing latency
    ///
    /// NaN, infinite and negative durations are rejected so they cannot
    /// corrupt histogram percentiles.
    pub fn record_routing_duration(
        &self,
        policy: RoutePolicy,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {duration_ms}"
            )));
        }

        self.routing_duration
            .get_metric_with_label_values(&[policy.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    pub fn record_retry_classification(
        &self,
        error_class: RetryErrorClass,
    ) -> Result<(), prometheus::Error> {
        self.retry_classifications
            .get_metric_with_label_values(&[error_class.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_usage_event(&self, status: UsageStatus) -> Result<(), prometheus::Error> {
        self.usage_events
            .get_metric_with_label_values(&[status.as_str()])?
            .inc();
        Ok(())
    }

    pub fn state_write_failure(&self) {
        self.state_write_failures.inc();
    }

    pub fn state_write_failures_count(&self) -> u64 {
        self.state_write_failures.get()
    }

    pub fn empty_routes_count(&self) -> u64 {
        self.empty_routes.get()
    }

    /// Gather all metrics in Prometheus text exposition format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    "Prometheus text encoder failed"
                );
                prometheus::Error::Msg(format!(
                    "Failed to encode {metric_count} metric families: {e}"
                ))
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {e}",
                e.utf8_error().valid_up_to()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_registers_all_families() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics.record_route(RoutePolicy::Cheap, 0).unwrap();
        metrics
            .record_routing_duration(RoutePolicy::Cheap, 0.2)
            .unwrap();
        metrics
            .record_retry_classification(RetryErrorClass::RateLimited)
            .unwrap();
        metrics.record_usage_event(UsageStatus::Routed).unwrap();
        metrics.state_write_failure();

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        for expected in [
            "keyrouter_route_decisions_total",
            "keyrouter_routing_duration_ms",
            "keyrouter_empty_routes_total",
            "keyrouter_retry_classifications_total",
            "keyrouter_usage_events_total",
            "keyrouter_state_write_failures_total",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_record_route_labels_policy() {
        let metrics = Metrics::new().unwrap();
        metrics.record_route(RoutePolicy::Reasoning, 3).unwrap();
        metrics.record_route(RoutePolicy::Reasoning, 1).unwrap();

        let output = metrics.gather().unwrap();
        assert!(output.contains("keyrouter_route_decisions_total{policy=\"reasoning\"} 2"));
        assert_eq!(metrics.empty_routes_count(), 0);
    }

    #[test]
    fn test_empty_route_counted() {
        let metrics = Metrics::new().unwrap();
        metrics.record_route(RoutePolicy::Balanced, 0).unwrap();
        assert_eq!(metrics.empty_routes_count(), 1);
    }

    #[test]
    fn test_retry_classification_label() {
        let metrics = Metrics::new().unwrap();
        metrics
            .record_retry_classification(RetryErrorClass::QuotaExhausted)
            .unwrap();
        let output = metrics.gather().unwrap();
        assert!(output.contains("error_class=\"quota_exhausted\""));
    }

    #[test]
    fn test_usage_event_label() {
        let metrics = Metrics::new().unwrap();
        metrics.record_usage_event(UsageStatus::Failed).unwrap();
        let output = metrics.gather().unwrap();
        assert!(output.contains("keyrouter_usage_events_total{status=\"failed\"} 1"));
    }

    #[test]
    fn test_histogram_rejects_invalid_values() {
        let metrics = Metrics::new().unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
            assert!(
                metrics
                    .record_routing_duration(RoutePolicy::Balanced, bad)
                    .is_err()
            );
        }
        assert!(
            metrics
                .record_routing_duration(RoutePolicy::Balanced, 0.0)
                .is_ok()
        );
    }

    #[test]
    fn test_metrics_is_clonable() {
        let metrics = Metrics::new().unwrap();
        let clone = metrics.clone();
        clone.state_write_failure();
        assert_eq!(metrics.state_write_failures_count(), 1);
    }
}
