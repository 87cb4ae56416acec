pub mod google;

use super::Result;
use crate::aggregate::FALLBACK_COLOR;
use crate::CalendarConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use google::{GoogleCalendarClient, StaticToken};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Calendar used when no calendar id is given.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Start or end of a calendar event.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    /// A specific instant, used by timed events.
    DateTime(DateTime<Utc>),
    /// A calendar date, used by all-day events.
    Date(NaiveDate),
}

impl EventTime {
    /// The instant this time refers to. All-day dates are interpreted as midnight UTC.
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            EventTime::DateTime(instant) => *instant,
            EventTime::Date(date) => {
                DateTime::from_naive_utc_and_offset(date.and_time(chrono::NaiveTime::MIN), Utc)
            }
        }
    }
}

/// Represents a single calendar event.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Identifier of the event. Events sharing an identifier are the same event.
    pub id: String,
    /// The event title.
    #[serde(default)]
    pub title: String,
    /// Start of the event, if known.
    pub start: Option<EventTime>,
    /// End of the event, if known. For all-day events the end date is exclusive.
    pub end: Option<EventTime>,
    /// Color id referencing the calendar's color definitions.
    #[serde(default)]
    pub color_id: Option<String>,
    /// Background color the event was rendered with, e.g. `rgb(3, 155, 229)`.
    #[serde(default)]
    pub background_color: Option<String>,
}

impl Event {
    /// Duration of the event in minutes.
    ///
    /// Timed events yield fractional minutes between both instants. All-day events yield whole
    /// days between start and the exclusive end date, times 1440. Returns `None` if an endpoint is
    /// missing or start and end are of different kinds. The result may be zero or negative.
    pub fn duration_minutes(&self) -> Option<f64> {
        match (self.start?, self.end?) {
            (EventTime::DateTime(start), EventTime::DateTime(end)) => {
                Some((end - start).num_milliseconds() as f64 / 60_000.0)
            }
            (EventTime::Date(start), EventTime::Date(end)) => {
                Some((end - start).num_days() as f64 * 1440.0)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.title.fmt(f)
    }
}

/// Display colors associated with a color id.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ColorDefinition {
    /// The background color, e.g. `#a4bdfc`.
    pub background: String,
    /// The foreground color used for text on top of the background.
    pub foreground: String,
}

/// Mapping of color id to its definition.
pub type ColorTable = IndexMap<String, ColorDefinition>;

/// A calendar the user has access to.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CalendarInfo {
    pub id: String,
    pub summary: String,
    pub background_color: Option<String>,
    pub primary: bool,
}

/// Represents sources of calendar events.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventSourceKind {
    /// Use static events from the application configuration.
    Static,
    /// Load events from Google Calendar.
    GoogleCalendar,
}

/// Trait that needs to be implemented by a source of calendar events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the events of a calendar within a time range. Uses the primary calendar if
    /// `calendar_id` is `None`.
    async fn fetch_events(
        &self,
        range: Range<DateTime<Utc>>,
        calendar_id: Option<&str>,
    ) -> Result<Vec<Event>>;

    /// Fetches the event color definitions.
    async fn fetch_colors(&self) -> Result<ColorTable>;

    /// Lists the calendars available from this source.
    async fn fetch_calendars(&self) -> Result<Vec<CalendarInfo>>;
}

/// An `EventSource` that returns events from a static list.
#[derive(Default)]
pub struct StaticEventSource {
    events: Vec<Event>,
    colors: ColorTable,
}

impl StaticEventSource {
    /// Creates a new `StaticEventSource` from an iterator.
    pub fn new<I>(iter: I) -> StaticEventSource
    where
        I: IntoIterator,
        I::Item: Into<Event>,
    {
        StaticEventSource {
            events: iter.into_iter().map(Into::into).collect(),
            colors: ColorTable::new(),
        }
    }

    /// Sets the color definitions returned by the source.
    pub fn with_colors(mut self, colors: ColorTable) -> StaticEventSource {
        self.colors = colors;
        self
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn fetch_events(
        &self,
        range: Range<DateTime<Utc>>,
        _calendar_id: Option<&str>,
    ) -> Result<Vec<Event>> {
        let events = self
            .events
            .iter()
            .filter(|event| match event.start {
                Some(start) => range.contains(&start.instant()),
                // Keep malformed events so that they flow through like remote ones would.
                None => true,
            })
            .cloned()
            .collect();

        Ok(events)
    }

    async fn fetch_colors(&self) -> Result<ColorTable> {
        Ok(self.colors.clone())
    }

    async fn fetch_calendars(&self) -> Result<Vec<CalendarInfo>> {
        Ok(vec![CalendarInfo {
            id: PRIMARY_CALENDAR.into(),
            summary: "Static events".into(),
            background_color: None,
            primary: true,
        }])
    }
}

/// The color tables needed to tell which background Google Calendar renders an event with.
#[derive(Debug, Clone, Default)]
pub struct EventPalette {
    colors: google::models::Colors,
    calendars: Vec<google::models::CalendarListEntry>,
}

impl EventPalette {
    pub fn new(
        colors: google::models::Colors,
        calendars: Vec<google::models::CalendarListEntry>,
    ) -> EventPalette {
        EventPalette { colors, calendars }
    }

    /// Background color of an event in `calendar_id`.
    ///
    /// The event's own color wins over the calendar's palette color, which wins over the
    /// calendar's custom background. Falls back to the default event color.
    pub fn background(&self, calendar_id: &str, color_id: Option<&str>) -> String {
        fn lookup<'a>(table: &'a ColorTable, id: Option<&str>) -> Option<&'a str> {
            id.and_then(|id| table.get(id))
                .map(|def| def.background.as_str())
                .filter(|background| !background.is_empty())
        }

        let calendar = self.calendars.iter().find(|entry| {
            entry.id == calendar_id || (calendar_id == PRIMARY_CALENDAR && entry.primary)
        });

        lookup(&self.colors.event, color_id)
            .or_else(|| {
                calendar.and_then(|entry| lookup(&self.colors.calendar, entry.color_id.as_deref()))
            })
            .or_else(|| calendar.and_then(|entry| entry.background_color.as_deref()))
            .unwrap_or(FALLBACK_COLOR)
            .to_owned()
    }

    /// Converts a Google Calendar event of `calendar_id`, resolving its background color.
    pub fn event(&self, calendar_id: &str, event: google::models::Event) -> Event {
        let background = self.background(calendar_id, event.color_id.as_deref());

        Event {
            background_color: Some(background),
            ..Event::from(event)
        }
    }
}

#[derive(Debug)]
pub struct GoogleCalendarEventSource {
    client: GoogleCalendarClient,
    palette: OnceCell<EventPalette>,
}

impl GoogleCalendarEventSource {
    pub fn new(client: GoogleCalendarClient) -> GoogleCalendarEventSource {
        GoogleCalendarEventSource {
            client,
            palette: OnceCell::new(),
        }
    }

    // Fetched once per source, calendar colors rarely change.
    async fn palette(&self) -> Result<&EventPalette> {
        let palette = self
            .palette
            .get_or_try_init(|| async {
                let (colors, calendars) = tokio::try_join!(
                    self.client.get_colors(),
                    self.client.get_calendar_list()
                )?;
                Ok::<_, google::ClientError>(EventPalette::new(colors, calendars.items))
            })
            .await?;

        Ok(palette)
    }
}

impl From<google::models::Event> for Event {
    fn from(ev: google::models::Event) -> Self {
        Self {
            id: ev.id,
            title: ev.summary.unwrap_or_default(),
            start: ev.start.and_then(|time| time.to_event_time()),
            end: ev.end.and_then(|time| time.to_event_time()),
            color_id: ev.color_id,
            background_color: None,
        }
    }
}

impl From<google::models::CalendarListEntry> for CalendarInfo {
    fn from(entry: google::models::CalendarListEntry) -> Self {
        Self {
            id: entry.id,
            summary: entry.summary_override.or(entry.summary).unwrap_or_default(),
            background_color: entry.background_color,
            primary: entry.primary,
        }
    }
}

#[async_trait]
impl EventSource for GoogleCalendarEventSource {
    async fn fetch_events(
        &self,
        range: Range<DateTime<Utc>>,
        calendar_id: Option<&str>,
    ) -> Result<Vec<Event>> {
        let calendar_id = calendar_id.unwrap_or(PRIMARY_CALENDAR);
        let (events, palette) = tokio::try_join!(
            async {
                self.client
                    .get_all_events(calendar_id, range)
                    .await
                    .map_err(crate::Error::from)
            },
            self.palette()
        )?;

        Ok(events
            .into_iter()
            .filter(|event| !event.is_cancelled())
            .map(|event| palette.event(calendar_id, event))
            .collect())
    }

    async fn fetch_colors(&self) -> Result<ColorTable> {
        Ok(self.client.get_colors().await?.event)
    }

    async fn fetch_calendars(&self) -> Result<Vec<CalendarInfo>> {
        let calendars = self.client.get_calendar_list().await?;
        Ok(calendars.items.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl<T> EventSource for Box<T>
where
    T: EventSource + ?Sized,
{
    async fn fetch_events(
        &self,
        range: Range<DateTime<Utc>>,
        calendar_id: Option<&str>,
    ) -> Result<Vec<Event>> {
        (**self).fetch_events(range, calendar_id).await
    }

    async fn fetch_colors(&self) -> Result<ColorTable> {
        (**self).fetch_colors().await
    }

    async fn fetch_calendars(&self) -> Result<Vec<CalendarInfo>> {
        (**self).fetch_calendars().await
    }
}

#[async_trait]
impl<T> EventSource for Arc<T>
where
    T: EventSource + ?Sized,
{
    async fn fetch_events(
        &self,
        range: Range<DateTime<Utc>>,
        calendar_id: Option<&str>,
    ) -> Result<Vec<Event>> {
        (**self).fetch_events(range, calendar_id).await
    }

    async fn fetch_colors(&self) -> Result<ColorTable> {
        (**self).fetch_colors().await
    }

    async fn fetch_calendars(&self) -> Result<Vec<CalendarInfo>> {
        (**self).fetch_calendars().await
    }
}

/// Creates the event source selected in the configuration.
pub fn event_source_from_config(config: &CalendarConfig) -> Result<Box<dyn EventSource>> {
    let event_source: Box<dyn EventSource> = match config.event_source {
        EventSourceKind::Static => Box::new(
            StaticEventSource::new(config.events.clone()).with_colors(config.colors.clone()),
        ),
        EventSourceKind::GoogleCalendar => {
            let token = config
                .access_token
                .clone()
                .ok_or(google::ClientError::MissingToken)?;
            let client = GoogleCalendarClient::new(Arc::new(StaticToken::new(token)))?;
            Box::new(GoogleCalendarEventSource::new(client))
        }
    };

    Ok(event_source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    macro_rules! at {
        ($y:expr, $m:expr, $d:expr, $h:expr, $min:expr) => {
            EventTime::DateTime(Utc.with_ymd_and_hms($y, $m, $d, $h, $min, 0).unwrap())
        };
    }

    macro_rules! day {
        ($y:expr, $m:expr, $d:expr) => {
            EventTime::Date(NaiveDate::from_ymd_opt($y, $m, $d).unwrap())
        };
    }

    fn event(id: &str, start: Option<EventTime>, end: Option<EventTime>) -> Event {
        Event {
            id: id.into(),
            title: id.into(),
            start,
            end,
            color_id: None,
            background_color: None,
        }
    }

    #[test]
    fn timed_duration() {
        let ev = event("a", Some(at!(2024, 3, 4, 9, 0)), Some(at!(2024, 3, 4, 10, 30)));
        assert_eq!(ev.duration_minutes(), Some(90.0));

        let ev = event("a", Some(at!(2024, 3, 4, 9, 0)), Some(at!(2024, 3, 4, 8, 0)));
        assert_eq!(ev.duration_minutes(), Some(-60.0));
    }

    #[test]
    fn fractional_minutes_are_kept() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let end = start + chrono::Duration::seconds(90);
        let ev = event(
            "a",
            Some(EventTime::DateTime(start)),
            Some(EventTime::DateTime(end)),
        );
        assert_eq!(ev.duration_minutes(), Some(1.5));
    }

    #[test]
    fn all_day_duration_uses_exclusive_end() {
        let ev = event("a", Some(day!(2024, 3, 4)), Some(day!(2024, 3, 5)));
        assert_eq!(ev.duration_minutes(), Some(1440.0));

        let ev = event("a", Some(day!(2024, 3, 4)), Some(day!(2024, 3, 7)));
        assert_eq!(ev.duration_minutes(), Some(3.0 * 1440.0));

        let ev = event("a", Some(day!(2024, 3, 4)), Some(day!(2024, 3, 4)));
        assert_eq!(ev.duration_minutes(), Some(0.0));
    }

    #[test]
    fn malformed_duration() {
        assert_eq!(event("a", None, Some(at!(2024, 3, 4, 9, 0))).duration_minutes(), None);
        assert_eq!(event("a", Some(at!(2024, 3, 4, 9, 0)), None).duration_minutes(), None);
        assert_eq!(
            event("a", Some(day!(2024, 3, 4)), Some(at!(2024, 3, 4, 9, 0))).duration_minutes(),
            None
        );
    }

    #[test]
    fn event_deserializes_from_config() {
        let ev: Event = serde_json::from_str(
            r#"{
                "id": "abc",
                "start": { "date_time": "2024-03-04T09:00:00+01:00" },
                "end": { "date": "2024-03-05" },
                "color_id": "5"
            }"#,
        )
        .unwrap();

        assert_eq!(ev.start, Some(at!(2024, 3, 4, 8, 0)));
        assert_eq!(ev.end, Some(day!(2024, 3, 5)));
        assert_eq!(ev.color_id.as_deref(), Some("5"));
        assert_eq!(ev.title, "");
    }

    #[tokio::test]
    async fn static_source_filters_by_start() {
        let source = StaticEventSource::new([
            event("a", Some(at!(2024, 3, 3, 9, 0)), Some(at!(2024, 3, 3, 10, 0))),
            event("b", Some(at!(2024, 3, 4, 9, 0)), Some(at!(2024, 3, 4, 10, 0))),
            event("c", Some(day!(2024, 3, 5)), Some(day!(2024, 3, 6))),
            event("d", Some(at!(2024, 3, 11, 0, 0)), Some(at!(2024, 3, 11, 1, 0))),
            event("e", None, None),
        ]);

        let range = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
            ..Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();

        let ids: Vec<_> = source
            .fetch_events(range, None)
            .await
            .unwrap()
            .into_iter()
            .map(|event| event.id)
            .collect();

        assert_eq!(ids, vec!["b", "c", "e"]);
    }

    #[test]
    fn google_event_conversion() {
        let ev: google::models::Event = serde_json::from_str(
            r#"{
                "id": "evt1",
                "status": "confirmed",
                "summary": "Standup",
                "colorId": "3",
                "start": { "dateTime": "2024-03-04T09:00:00-05:00", "timeZone": "America/New_York" },
                "end": { "dateTime": "2024-03-04T09:15:00-05:00", "timeZone": "America/New_York" }
            }"#,
        )
        .unwrap();

        let ev = Event::from(ev);
        assert_eq!(ev.id, "evt1");
        assert_eq!(ev.title, "Standup");
        assert_eq!(ev.color_id.as_deref(), Some("3"));
        assert_eq!(ev.start, Some(at!(2024, 3, 4, 14, 0)));
        assert_eq!(ev.duration_minutes(), Some(15.0));
    }

    fn palette() -> EventPalette {
        let colors: google::models::Colors = serde_json::from_str(
            r##"{
                "calendar": {
                    "14": { "background": "#9fe1e7", "foreground": "#1d1d1d" }
                },
                "event": {
                    "10": { "background": "#0b8043", "foreground": "#1d1d1d" },
                    "11": { "background": "#d50000", "foreground": "#1d1d1d" }
                }
            }"##,
        )
        .unwrap();
        let calendars: google::models::CalendarList = serde_json::from_str(
            r##"{
                "items": [
                    { "id": "me@example.com", "colorId": "14", "primary": true },
                    { "id": "team", "backgroundColor": "#f691b2" }
                ]
            }"##,
        )
        .unwrap();

        EventPalette::new(colors, calendars.items)
    }

    #[test]
    fn palette_resolution_order() {
        let palette = palette();

        assert_eq!(palette.background("team", Some("11")), "#d50000");
        assert_eq!(palette.background("me@example.com", None), "#9fe1e7");
        assert_eq!(palette.background(PRIMARY_CALENDAR, Some("99")), "#9fe1e7");
        assert_eq!(palette.background("team", None), "#f691b2");
        assert_eq!(palette.background("unknown", None), FALLBACK_COLOR);
        assert_eq!(EventPalette::default().background("team", Some("11")), FALLBACK_COLOR);
    }

    #[test]
    fn google_events_aggregate_by_rendered_color() {
        use crate::aggregate::{aggregate, CategoryMode};

        let google_event = |id: &str, color_id: &str, hour: u32| -> google::models::Event {
            serde_json::from_value(serde_json::json!({
                "id": id,
                "colorId": color_id,
                "start": { "dateTime": format!("2024-03-04T{hour:02}:00:00Z") },
                "end": { "dateTime": format!("2024-03-04T{:02}:00:00Z", hour + 1) },
            }))
            .unwrap()
        };

        let palette = palette();
        let events: Vec<Event> = vec![google_event("a", "11", 9), google_event("b", "10", 11)]
            .into_iter()
            .map(|event| palette.event("team", event))
            .collect();

        assert_eq!(events[0].background_color.as_deref(), Some("#d50000"));

        let result = aggregate(&events, None, CategoryMode::Scraped);
        let labels: Vec<_> = result
            .entries
            .iter()
            .map(|entry| (entry.label.as_deref(), entry.minutes))
            .collect();

        assert_eq!(labels, vec![(Some("Tomato"), 60.0), (Some("Basil"), 60.0)]);
    }
}
