use crate::aggregate::{aggregate, AggregateResult, CategoryMode};
use crate::calendar::{ColorTable, Event, EventSource};
use crate::metrics::{RefreshStatus, SessionMetrics};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use prometheus::Registry;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bookkeeping of the latest successful refresh.
#[derive(Debug, Clone, Default)]
struct SyncState {
    last_fetch: Option<DateTime<Utc>>,
    last_range: Option<Range<DateTime<Utc>>>,
}

/// The `Session` wraps an event source with the caches needed between refreshes.
#[derive(Clone)]
pub struct Session {
    event_source: Arc<dyn EventSource>,
    mode: CategoryMode,
    calendar_ids: Vec<String>,
    colors: Arc<Mutex<Option<ColorTable>>>,
    state: Arc<Mutex<SyncState>>,
    in_flight: Arc<AtomicBool>,
    metrics: Arc<SessionMetrics>,
}

// Clears the in-flight flag when a refresh finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Session {
    /// Creates a new `Session` from an event source.
    pub fn new<T>(event_source: T, mode: CategoryMode) -> Result<Session>
    where
        T: EventSource + 'static,
    {
        Ok(Session {
            event_source: Arc::new(event_source),
            mode,
            calendar_ids: Vec::new(),
            colors: Default::default(),
            state: Default::default(),
            in_flight: Default::default(),
            metrics: Arc::new(SessionMetrics::new()?),
        })
    }

    /// Registers the session metrics in a prometheus registry.
    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.metrics.register(registry)
    }

    /// Restricts fetching to the given calendars. Without calendars, the primary calendar is used.
    pub fn with_calendars<I, S>(mut self, calendar_ids: I) -> Session
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.calendar_ids = calendar_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(&self) -> CategoryMode {
        self.mode
    }

    /// Returns `true` while a refresh is running.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Time of the latest successful refresh.
    pub async fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_fetch
    }

    /// Returns `true` if `range` wasn't refreshed yet or the latest refresh is older than
    /// `max_age`.
    pub async fn needs_refresh(&self, range: &Range<DateTime<Utc>>, max_age: Duration) -> bool {
        let state = self.state.lock().await;

        match (&state.last_range, state.last_fetch) {
            (Some(last_range), Some(last_fetch)) => {
                last_range != range || Utc::now() - last_fetch > max_age
            }
            _ => true,
        }
    }

    /// Drops the cached color definitions so that the next refresh fetches them again.
    pub async fn invalidate_colors(&self) {
        *self.colors.lock().await = None;
    }

    /// Fetches the events in `range` and aggregates them.
    ///
    /// Color definitions are fetched along with the events on the first refresh and cached
    /// afterwards. If either fetch fails, the refresh fails as a whole. Returns `Ok(None)` without
    /// fetching anything if another refresh is still running.
    pub async fn refresh(&self, range: Range<DateTime<Utc>>) -> Result<Option<AggregateResult>> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("refresh already in flight, skipping");
            self.metrics.refreshes_total(RefreshStatus::Skipped).inc();
            return Ok(None);
        }
        let _guard = InFlight(&self.in_flight);

        log::debug!("refreshing events from {} to {}", range.start, range.end);

        let started = std::time::Instant::now();
        let (result, status) = match self.refresh_once(range).await {
            Ok(result) => (Ok(Some(result)), RefreshStatus::Success),
            Err(err) => (Err(err), RefreshStatus::Error),
        };

        self.metrics
            .refresh_duration_seconds(status)
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .latest_refresh_timestamp_seconds(status)
            .set(Utc::now().timestamp());
        self.metrics.refreshes_total(status).inc();

        result
    }

    async fn refresh_once(&self, range: Range<DateTime<Utc>>) -> Result<AggregateResult> {
        let cached = self.colors.lock().await.clone();
        let (colors, events) = match cached {
            Some(colors) => (colors, self.fetch_events(range.clone()).await?),
            None => {
                let (colors, events) = tokio::try_join!(
                    self.event_source.fetch_colors(),
                    self.fetch_events(range.clone())
                )?;
                *self.colors.lock().await = Some(colors.clone());
                (colors, events)
            }
        };

        let result = aggregate(&events, Some(&colors), self.mode);

        let mut state = self.state.lock().await;
        state.last_fetch = Some(Utc::now());
        state.last_range = Some(range);

        self.metrics.events().set(events.len() as i64);
        self.metrics.categories().set(result.entries.len() as i64);

        log::info!(
            "aggregated {} events into {} categories, {:.0} minutes in total",
            events.len(),
            result.entries.len(),
            result.grand_total_minutes
        );

        Ok(result)
    }

    async fn fetch_events(&self, range: Range<DateTime<Utc>>) -> Result<Vec<Event>> {
        if self.calendar_ids.is_empty() {
            return self.event_source.fetch_events(range, None).await;
        }

        let mut events = Vec::new();

        for calendar_id in &self.calendar_ids {
            let calendar_events = self
                .event_source
                .fetch_events(range.clone(), Some(calendar_id))
                .await?;
            log::debug!(
                "fetched {} events from calendar {}",
                calendar_events.len(),
                calendar_id
            );
            events.extend(calendar_events);
        }

        Ok(events)
    }
}
