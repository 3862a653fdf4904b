// Private module declaration
mod server;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Counters for:
// - Events appended and batches dispatched by the event store
// - Cryptography provisioned, provisioning races and subjects shredded
// - Personal data stored and purged
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry shared by the three stores
pub struct Metrics {
    registry: Registry,

    // Event Store Metrics
    pub events_appended: IntCounter,
    pub batches_dispatched: IntCounter,

    // Cryptography Store Metrics
    pub cryptography_provisioned: IntCounter,
    pub provisioning_races: IntCounter,
    pub subjects_shredded: IntCounter,

    // Personal Data Store Metrics
    pub personal_data_stored: IntCounter,
    pub personal_data_purged: IntCounter,
    pub personal_data_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_appended = IntCounter::new(
            "vault_events_appended_total",
            "Total events appended to the event store",
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let batches_dispatched = IntCounter::new(
            "vault_event_batches_dispatched_total",
            "Total event batches handed to the dispatcher",
        )?;
        registry.register(Box::new(batches_dispatched.clone()))?;

        let cryptography_provisioned = IntCounter::new(
            "vault_cryptography_provisioned_total",
            "Total data subjects given cryptographic details",
        )?;
        registry.register(Box::new(cryptography_provisioned.clone()))?;

        let provisioning_races = IntCounter::new(
            "vault_cryptography_provisioning_races_total",
            "Concurrent provisioning attempts that found the subject already provisioned",
        )?;
        registry.register(Box::new(provisioning_races.clone()))?;

        let subjects_shredded = IntCounter::new(
            "vault_subjects_shredded_total",
            "Total data subjects whose key material was destroyed",
        )?;
        registry.register(Box::new(subjects_shredded.clone()))?;

        let personal_data_stored = IntCounter::new(
            "vault_personal_data_stored_total",
            "Total encrypted personal data values stored",
        )?;
        registry.register(Box::new(personal_data_stored.clone()))?;

        let personal_data_purged = IntCounter::new(
            "vault_personal_data_purged_total",
            "Total personal data rows hard-deleted",
        )?;
        registry.register(Box::new(personal_data_purged.clone()))?;

        let personal_data_failures = IntCounterVec::new(
            Opts::new("vault_personal_data_failures_total", "Personal data reads that failed"),
            &["reason"],
        )?;
        registry.register(Box::new(personal_data_failures.clone()))?;

        Ok(Self {
            registry,
            events_appended,
            batches_dispatched,
            cryptography_provisioned,
            provisioning_races,
            subjects_shredded,
            personal_data_stored,
            personal_data_purged,
            personal_data_failures,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_events_appended(&self, count: usize) {
        self.events_appended.inc_by(count as u64);
    }

    pub fn record_batch_dispatched(&self) {
        self.batches_dispatched.inc();
    }

    pub fn record_cryptography_provisioned(&self) {
        self.cryptography_provisioned.inc();
    }

    pub fn record_provisioning_race(&self) {
        self.provisioning_races.inc();
    }

    pub fn record_subject_shredded(&self) {
        self.subjects_shredded.inc();
    }

    pub fn record_personal_data_stored(&self) {
        self.personal_data_stored.inc();
    }

    pub fn record_personal_data_purged(&self, rows: u64) {
        self.personal_data_purged.inc_by(rows);
    }

    /// Helper to record a failed read, labelled by why it failed
    pub fn record_personal_data_failure(&self, reason: &str) {
        self.personal_data_failures.with_label_values(&[reason]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_events_appended() {
        let metrics = Metrics::new().unwrap();
        metrics.record_events_appended(3);
        metrics.record_events_appended(2);

        let gathered = metrics.registry.gather();
        let appended = gathered
            .iter()
            .find(|m| m.name() == "vault_events_appended_total")
            .unwrap();
        assert_eq!(appended.metric[0].counter.value, Some(5.0));
    }

    #[test]
    fn test_record_failures_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_personal_data_failure("removed_person");
        metrics.record_personal_data_failure("data_not_found");
        metrics.record_personal_data_failure("removed_person");

        assert_eq!(
            metrics.personal_data_failures.with_label_values(&["removed_person"]).get(),
            2
        );
        assert_eq!(
            metrics.personal_data_failures.with_label_values(&["data_not_found"]).get(),
            1
        );
    }

    #[test]
    fn test_record_erasure() {
        let metrics = Metrics::new().unwrap();
        metrics.record_subject_shredded();
        metrics.record_personal_data_purged(4);

        assert_eq!(metrics.subjects_shredded.get(), 1);
        assert_eq!(metrics.personal_data_purged.get(), 4);
    }
}
