//! Prometheus metrics

use std::time::Duration;

/// Monotonic counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    RoundsOpened,
    ChoicesAccepted,
    ChoicesRejected,
    /// Settlement passes skipped because the round id was stale
    StaleSettlements,
    FeedSamples,
    FeedReconnects,
    FeedFallbacks,
    LedgerWrites,
    LedgerWriteFailures,
    SessionsSwept,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    CurrentPrice,
    ActiveSessions,
    /// Writes queued in the ledger outbox but not yet applied
    OutboxDepth,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Settlement time minus choice receipt time
    Decision,
    /// One full settlement pass
    Settlement,
    /// One ledger write including lock acquisition
    LedgerWrite,
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::RoundsOpened => "predictor_rounds_opened_total",
        CounterMetric::ChoicesAccepted => "predictor_choices_accepted_total",
        CounterMetric::ChoicesRejected => "predictor_choices_rejected_total",
        CounterMetric::StaleSettlements => "predictor_stale_settlements_total",
        CounterMetric::FeedSamples => "predictor_feed_samples_total",
        CounterMetric::FeedReconnects => "predictor_feed_reconnects_total",
        CounterMetric::FeedFallbacks => "predictor_feed_fallbacks_total",
        CounterMetric::LedgerWrites => "predictor_ledger_writes_total",
        CounterMetric::LedgerWriteFailures => "predictor_ledger_write_failures_total",
        CounterMetric::SessionsSwept => "predictor_sessions_swept_total",
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    increment_by(metric, 1);
}

pub fn increment_by(metric: CounterMetric, amount: u64) {
    metrics::counter!(counter_name(metric)).increment(amount);
}

/// Count one settled outcome, labelled by result
pub fn record_outcome(result: &'static str) {
    metrics::counter!("predictor_outcomes_total", "result" => result).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::CurrentPrice => "predictor_current_price",
        GaugeMetric::ActiveSessions => "predictor_active_sessions",
        GaugeMetric::OutboxDepth => "predictor_outbox_depth",
    };
    metrics::gauge!(metric_name).set(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::Decision => "predictor_decision_latency_ms",
        LatencyMetric::Settlement => "predictor_settlement_latency_ms",
        LatencyMetric::LedgerWrite => "predictor_ledger_write_latency_ms",
    };
    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        increment(CounterMetric::RoundsOpened);
        record_outcome("WIN");
        set_gauge(GaugeMetric::CurrentPrice, 50_000.0);
        record_latency(LatencyMetric::Decision, Duration::from_millis(12));
    }

    #[test]
    fn test_counter_names_are_prefixed() {
        for metric in [
            CounterMetric::RoundsOpened,
            CounterMetric::ChoicesAccepted,
            CounterMetric::LedgerWriteFailures,
            CounterMetric::SessionsSwept,
        ] {
            let name = counter_name(metric);
            assert!(name.starts_with("predictor_"));
            assert!(name.ends_with("_total"));
        }
    }
}
