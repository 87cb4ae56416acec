use super::super::{ColorTable, EventTime};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

mod rfc3339_to_datetime_utc {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let offset_time = DateTime::parse_from_rfc3339(&s).map_err(serde::de::Error::custom)?;
        Ok(Some(DateTime::from_naive_utc_and_offset(
            offset_time.naive_utc(),
            Utc,
        )))
    }
}

/// Start or end of an event. Timed events carry `dateTime`, all-day events carry `date`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Timepoint {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "rfc3339_to_datetime_utc")]
    pub date_time: Option<DateTime<Utc>>,
    pub time_zone: Option<String>,
}

impl Timepoint {
    /// Converts the timepoint to an `EventTime`, preferring the instant over the date.
    pub fn to_event_time(&self) -> Option<EventTime> {
        match (self.date_time, self.date) {
            (Some(instant), _) => Some(EventTime::DateTime(instant)),
            (None, Some(date)) => Some(EventTime::Date(date)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Event {
    pub id: String,
    pub status: Option<String>,
    pub html_link: Option<String>,
    pub summary: Option<String>,
    pub color_id: Option<String>,
    pub start: Option<Timepoint>,
    pub end: Option<Timepoint>,
}

impl Event {
    /// Returns `true` if the event was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Events {
    pub summary: Option<String>,
    pub time_zone: Option<String>,
    #[serde(default)]
    pub items: Vec<Event>,
    pub next_page_token: Option<String>,
}

/// Color definitions for calendars and events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Colors {
    pub kind: Option<String>,
    pub updated: Option<String>,
    #[serde(default)]
    pub calendar: ColorTable,
    #[serde(default)]
    pub event: ColorTable,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: Option<String>,
    pub summary_override: Option<String>,
    pub color_id: Option<String>,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct CalendarList {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
}
