use crate::storage::SharedStore;
use opentelemetry::{KeyValue, global, metrics::Gauge};

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            status: meter
                .i64_gauge("parley_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    store: SharedStore,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store, metrics: Metrics::new() }
    }

    /// Checks that the persistence store answers.
    ///
    /// The store handed in is expected to bound the ping in time.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_store(&self) -> Result<(), String> {
        match self.store.ping().await {
            Ok(()) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "store")]);
                Ok(())
            }
            Err(e) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "store")]);
                Err(format!("Store check failed: {e}"))
            }
        }
    }
}
