use crate::Result;
use prometheus::{
    core::{AtomicI64, AtomicU64, GenericCounter, GenericGauge},
    histogram_opts, opts, Histogram, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

pub const NAMESPACE: &str = "supercal";

/// Container for session metrics.
pub(crate) struct SessionMetrics {
    events: IntGauge,
    categories: IntGauge,
    latest_refresh_timestamp_seconds: IntGaugeVec,
    refresh_duration_seconds: HistogramVec,
    refreshes_total: IntCounterVec,
}

impl SessionMetrics {
    pub fn new() -> Result<SessionMetrics> {
        let events = IntGauge::with_opts(
            opts!(
                "session_events",
                "Number of events fetched by the latest successful refresh"
            )
            .namespace(NAMESPACE),
        )?;

        let categories = IntGauge::with_opts(
            opts!(
                "session_categories",
                "Number of color categories in the latest summary"
            )
            .namespace(NAMESPACE),
        )?;

        let latest_refresh_timestamp_seconds = IntGaugeVec::new(
            opts!(
                "session_latest_refresh_timestamp_seconds",
                "UNIX timestamp seconds of the latest refresh"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        let refresh_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "session_refresh_duration_seconds",
                "Refresh duration in seconds"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        let refreshes_total = IntCounterVec::new(
            opts!("session_refreshes_total", "Total number of refreshes").namespace(NAMESPACE),
            &["status"],
        )?;

        Ok(SessionMetrics {
            events,
            categories,
            latest_refresh_timestamp_seconds,
            refresh_duration_seconds,
            refreshes_total,
        })
    }

    /// Registers the metrics in a prometheus registry.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.events.clone()))?;
        registry.register(Box::new(self.categories.clone()))?;
        registry.register(Box::new(self.latest_refresh_timestamp_seconds.clone()))?;
        registry.register(Box::new(self.refresh_duration_seconds.clone()))?;
        registry.register(Box::new(self.refreshes_total.clone()))?;
        Ok(())
    }

    pub fn events(&self) -> GenericGauge<AtomicI64> {
        self.events.clone()
    }

    pub fn categories(&self) -> GenericGauge<AtomicI64> {
        self.categories.clone()
    }

    pub fn latest_refresh_timestamp_seconds(
        &self,
        status: RefreshStatus,
    ) -> GenericGauge<AtomicI64> {
        self.latest_refresh_timestamp_seconds
            .with_label_values(&[status.as_str()])
    }

    pub fn refresh_duration_seconds(&self, status: RefreshStatus) -> Histogram {
        self.refresh_duration_seconds
            .with_label_values(&[status.as_str()])
    }

    pub fn refreshes_total(&self, status: RefreshStatus) -> GenericCounter<AtomicU64> {
        self.refreshes_total.with_label_values(&[status.as_str()])
    }
}

/// Outcome of a refresh.
#[derive(Debug, Copy, Clone)]
pub(crate) enum RefreshStatus {
    Success,
    Error,
    /// Another refresh was still running.
    Skipped,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RefreshStatus::Success => "success",
            RefreshStatus::Error => "error",
            RefreshStatus::Skipped => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_once() {
        let metrics = SessionMetrics::new().unwrap();
        let registry = Registry::new();

        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());

        metrics.refreshes_total(RefreshStatus::Success).inc();
        metrics.events().set(3);

        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();

        assert!(names.contains(&"supercal_session_refreshes_total".to_owned()));
        assert!(names.contains(&"supercal_session_events".to_owned()));
    }
}
