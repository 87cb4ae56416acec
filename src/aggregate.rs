//! Aggregation of event durations by color category.
//!
//! Every pass starts from the raw event list and produces a fresh [`AggregateResult`]. Events are
//! deduplicated by identifier, keeping the last record seen for an identifier, because overlapping
//! fetches and rendered snapshots regularly contain the same event more than once.

use crate::calendar::{ColorTable, Event};
use crate::color::{nearest_preset, PresetColor, Rgb, CALENDAR_PRESETS, DEFAULT_EVENT_RGB};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category key for events without a color id.
pub const DEFAULT_CATEGORY: &str = "default";

/// Display color used when a color id cannot be resolved.
pub const FALLBACK_COLOR: &str = "#4285f4";

/// Label used when a color id cannot be resolved.
pub const UNKNOWN_COLOR_LABEL: &str = "Unknown color";

/// How events are assigned to categories.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryMode {
    /// Group by the event's color id and resolve display colors from the color definitions.
    #[default]
    Api,
    /// Group by the preset color nearest to the event's rendered background color.
    Scraped,
}

impl FromStr for CategoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(CategoryMode::Api),
            "scraped" => Ok(CategoryMode::Scraped),
            other => Err(format!(
                "unknown category mode `{other}`, expected `api` or `scraped`"
            )),
        }
    }
}

impl fmt::Display for CategoryMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CategoryMode::Api => f.write_str("api"),
            CategoryMode::Scraped => f.write_str("scraped"),
        }
    }
}

/// Total duration of all events in one category.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ColorDuration {
    /// Stable key the events were grouped by.
    pub category_key: String,
    /// CSS color to display the category with.
    pub display_color: String,
    /// Human readable name of the category.
    pub label: Option<String>,
    /// Total duration in minutes. Not rounded.
    pub minutes: f64,
}

/// Result of an aggregation pass.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct AggregateResult {
    /// Sum of the minutes of all entries.
    pub grand_total_minutes: f64,
    /// Categories sorted by minutes, descending. Equal durations keep the order in which their
    /// categories first appeared.
    pub entries: Vec<ColorDuration>,
}

impl AggregateResult {
    /// Share of `entry` in the grand total, rounded to whole percent. Returns `None` when the
    /// grand total is zero.
    pub fn percentage(&self, entry: &ColorDuration) -> Option<u32> {
        percentage(entry.minutes, self.grand_total_minutes)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes `round(100 * minutes / total)`, or `None` if `total` is not positive.
pub fn percentage(minutes: f64, total: f64) -> Option<u32> {
    if total <= 0.0 {
        return None;
    }

    Some((100.0 * minutes / total).round() as u32)
}

struct Category {
    key: String,
    display_color: String,
    label: Option<String>,
}

// Events without an identifier can't be matched against each other, so they are never merged.
#[derive(PartialEq, Eq, Hash)]
enum EventKey<'a> {
    Id(&'a str),
    Anonymous(usize),
}

/// Aggregates event durations per category.
///
/// Events with a missing or mixed endpoint and events lasting zero minutes or less are skipped.
/// A missing color table degrades to fallback colors and labels.
pub fn aggregate(
    events: &[Event],
    color_defs: Option<&ColorTable>,
    mode: CategoryMode,
) -> AggregateResult {
    let mut unique: IndexMap<EventKey, &Event> = IndexMap::with_capacity(events.len());

    for (index, event) in events.iter().enumerate() {
        let key = if event.id.is_empty() {
            EventKey::Anonymous(index)
        } else {
            EventKey::Id(&event.id)
        };

        // Replaces the value but keeps the slot of the first occurrence.
        unique.insert(key, event);
    }

    let mut totals: IndexMap<String, ColorDuration> = IndexMap::new();
    let mut skipped = 0;

    for event in unique.values() {
        let minutes = match event.duration_minutes() {
            Some(minutes) if minutes > 0.0 => minutes,
            _ => {
                skipped += 1;
                continue;
            }
        };

        let category = match mode {
            CategoryMode::Api => api_category(event, color_defs),
            CategoryMode::Scraped => scraped_category(event, CALENDAR_PRESETS),
        };

        totals
            .entry(category.key.clone())
            .or_insert_with(|| ColorDuration {
                category_key: category.key,
                display_color: category.display_color,
                label: category.label,
                minutes: 0.0,
            })
            .minutes += minutes;
    }

    log::debug!(
        "aggregated {} events into {} categories ({} duplicates, {} skipped)",
        unique.len() - skipped,
        totals.len(),
        events.len() - unique.len(),
        skipped
    );

    let mut entries: Vec<ColorDuration> = totals.into_values().collect();
    // `sort_by` is stable, ties keep their first-appearance order.
    entries.sort_by(|a, b| b.minutes.total_cmp(&a.minutes));

    AggregateResult {
        grand_total_minutes: entries.iter().map(|entry| entry.minutes).sum(),
        entries,
    }
}

fn api_category(event: &Event, color_defs: Option<&ColorTable>) -> Category {
    let Some(color_id) = event.color_id.as_deref().filter(|id| !id.is_empty()) else {
        return Category {
            key: DEFAULT_CATEGORY.to_owned(),
            display_color: FALLBACK_COLOR.to_owned(),
            label: Some(UNKNOWN_COLOR_LABEL.to_owned()),
        };
    };

    let definition = color_defs
        .and_then(|defs| defs.get(color_id))
        .filter(|def| !def.background.is_empty());

    match definition {
        Some(def) => Category {
            key: color_id.to_owned(),
            display_color: def.background.clone(),
            label: Some(format!("Color {color_id}")),
        },
        None => Category {
            key: color_id.to_owned(),
            display_color: FALLBACK_COLOR.to_owned(),
            label: Some(UNKNOWN_COLOR_LABEL.to_owned()),
        },
    }
}

fn scraped_category(event: &Event, presets: &[PresetColor]) -> Category {
    let preset = match event.background_color.as_deref() {
        None => nearest_preset(DEFAULT_EVENT_RGB, presets),
        Some(color) => match color.parse::<Rgb>() {
            Ok(rgb) => nearest_preset(rgb, presets),
            Err(err) => {
                log::debug!("{err}, falling back to the first preset");
                presets.first()
            }
        },
    };

    match preset {
        Some(preset) => Category {
            key: preset.rgb.to_string(),
            display_color: preset.rgb.to_string(),
            label: Some(preset.name.to_owned()),
        },
        None => Category {
            key: DEFAULT_CATEGORY.to_owned(),
            display_color: FALLBACK_COLOR.to_owned(),
            label: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{ColorDefinition, EventTime};
    use chrono::{NaiveDate, TimeZone, Utc};
    use indexmap::indexmap;

    fn timed(id: &str, start: (u32, u32), end: (u32, u32), color_id: Option<&str>) -> Event {
        let at = |(h, m): (u32, u32)| {
            EventTime::DateTime(Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap())
        };

        Event {
            id: id.into(),
            title: id.into(),
            start: Some(at(start)),
            end: Some(at(end)),
            color_id: color_id.map(Into::into),
            background_color: None,
        }
    }

    fn all_day(id: &str, start: u32, end: u32, color_id: Option<&str>) -> Event {
        let day = |d| EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, d).unwrap());

        Event {
            start: Some(day(start)),
            end: Some(day(end)),
            ..timed(id, (0, 0), (0, 0), color_id)
        }
    }

    fn scraped(id: &str, minutes: u32, background: Option<&str>) -> Event {
        Event {
            background_color: background.map(Into::into),
            ..timed(id, (9, 0), (9 + minutes / 60, minutes % 60), None)
        }
    }

    fn colors() -> ColorTable {
        let def = |background: &str| ColorDefinition {
            background: background.into(),
            foreground: "#1d1d1d".into(),
        };

        indexmap! {
            "1".to_owned() => def("#a4bdfc"),
            "2".to_owned() => def("#7ae7bf"),
            "3".to_owned() => def("#dbadff"),
            "4".to_owned() => def("#ff887c"),
        }
    }

    fn keys(result: &AggregateResult) -> Vec<&str> {
        result
            .entries
            .iter()
            .map(|entry| entry.category_key.as_str())
            .collect()
    }

    #[test]
    fn duplicate_ids_count_once() {
        let events = [
            timed("a", (9, 0), (10, 0), Some("1")),
            timed("a", (9, 0), (10, 0), Some("1")),
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].minutes, 60.0);
        assert_eq!(result.grand_total_minutes, 60.0);
    }

    #[test]
    fn last_duplicate_wins() {
        let events = [
            timed("a", (9, 0), (10, 0), Some("1")),
            timed("b", (9, 0), (9, 30), Some("2")),
            timed("a", (9, 0), (9, 45), Some("3")),
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);

        assert_eq!(keys(&result), vec!["3", "2"]);
        assert_eq!(result.entries[0].minutes, 45.0);
        assert_eq!(result.grand_total_minutes, 75.0);
    }

    #[test]
    fn malformed_duplicate_replaces_valid_record() {
        let mut malformed = timed("a", (9, 0), (10, 0), Some("1"));
        malformed.end = None;

        let events = [
            timed("a", (9, 0), (10, 0), Some("1")),
            timed("b", (9, 0), (9, 30), Some("2")),
            malformed,
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);

        assert_eq!(keys(&result), vec!["2"]);
        assert_eq!(result.grand_total_minutes, 30.0);
    }

    #[test]
    fn empty_background_definition_falls_back() {
        let mut defs = colors();
        defs.insert(
            "5".to_owned(),
            ColorDefinition {
                background: String::new(),
                foreground: "#1d1d1d".into(),
            },
        );

        let events = [timed("a", (9, 0), (10, 0), Some("5"))];
        let result = aggregate(&events, Some(&defs), CategoryMode::Api);

        assert_eq!(keys(&result), vec!["5"]);
        assert_eq!(result.entries[0].display_color, FALLBACK_COLOR);
        assert_eq!(result.entries[0].label.as_deref(), Some(UNKNOWN_COLOR_LABEL));
    }

    #[test]
    fn anonymous_events_are_not_merged() {
        let events = [
            timed("", (9, 0), (10, 0), Some("1")),
            timed("", (11, 0), (12, 0), Some("1")),
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);
        assert_eq!(result.grand_total_minutes, 120.0);
    }

    #[test]
    fn sorted_with_percentages() {
        let events = [
            timed("d", (9, 0), (9, 30), Some("4")),
            timed("b", (9, 0), (10, 30), Some("2")),
            timed("a", (9, 0), (11, 0), Some("1")),
            timed("c", (9, 0), (10, 0), Some("3")),
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);

        assert_eq!(result.grand_total_minutes, 300.0);
        assert_eq!(keys(&result), vec!["1", "2", "3", "4"]);

        let percentages: Vec<_> = result
            .entries
            .iter()
            .map(|entry| result.percentage(entry))
            .collect();
        assert_eq!(percentages, vec![Some(40), Some(30), Some(20), Some(10)]);
    }

    #[test]
    fn equal_durations_keep_first_appearance_order() {
        let events = [
            timed("a", (9, 0), (10, 0), Some("3")),
            timed("b", (9, 0), (10, 0), Some("1")),
            timed("c", (9, 0), (11, 0), Some("2")),
            timed("d", (9, 0), (10, 0), Some("4")),
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);
        assert_eq!(keys(&result), vec!["2", "3", "1", "4"]);
    }

    #[test]
    fn non_positive_durations_are_dropped() {
        let events = [
            timed("a", (10, 0), (9, 0), Some("1")),
            timed("b", (9, 0), (9, 0), Some("2")),
            all_day("c", 4, 4, Some("3")),
            Event {
                end: None,
                ..timed("d", (9, 0), (10, 0), Some("4"))
            },
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);

        assert!(result.is_empty());
        assert_eq!(result.grand_total_minutes, 0.0);
    }

    #[test]
    fn all_day_events_count_whole_days() {
        let events = [all_day("a", 4, 6, Some("1")), timed("b", (9, 0), (10, 0), Some("1"))];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);
        assert_eq!(result.entries[0].minutes, 2.0 * 1440.0 + 60.0);
    }

    #[test]
    fn api_mode_resolves_labels_and_colors() {
        let events = [
            timed("a", (9, 0), (11, 0), Some("2")),
            timed("b", (9, 0), (10, 0), Some("42")),
            timed("c", (9, 0), (9, 30), None),
        ];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);

        assert_eq!(
            result.entries,
            vec![
                ColorDuration {
                    category_key: "2".into(),
                    display_color: "#7ae7bf".into(),
                    label: Some("Color 2".into()),
                    minutes: 120.0,
                },
                ColorDuration {
                    category_key: "42".into(),
                    display_color: FALLBACK_COLOR.into(),
                    label: Some(UNKNOWN_COLOR_LABEL.into()),
                    minutes: 60.0,
                },
                ColorDuration {
                    category_key: DEFAULT_CATEGORY.into(),
                    display_color: FALLBACK_COLOR.into(),
                    label: Some(UNKNOWN_COLOR_LABEL.into()),
                    minutes: 30.0,
                },
            ]
        );
    }

    #[test]
    fn missing_color_table_falls_back() {
        let events = [timed("a", (9, 0), (10, 0), Some("1"))];

        let result = aggregate(&events, None, CategoryMode::Api);

        assert_eq!(result.entries[0].category_key, "1");
        assert_eq!(keys(&result), vec!["5"]);
        assert_eq!(result.entries[0].display_color, FALLBACK_COLOR);
        assert_eq!(result.entries[0].label.as_deref(), Some(UNKNOWN_COLOR_LABEL));
    }

    #[test]
    fn scraped_mode_groups_by_nearest_preset() {
        let events = [
            scraped("a", 60, Some("rgb(213, 0, 0)")),
            scraped("b", 30, Some("rgb(210, 5, 5)")),
            scraped("c", 45, None),
            scraped("d", 15, Some("not a color")),
        ];

        let result = aggregate(&events, None, CategoryMode::Scraped);

        let labels: Vec<_> = result
            .entries
            .iter()
            .map(|entry| (entry.label.as_deref().unwrap(), entry.minutes))
            .collect();

        // Unparseable colors land on the first preset, which is Tomato.
        assert_eq!(labels, vec![("Tomato", 105.0), ("Peacock", 45.0)]);
        assert_eq!(result.entries[0].category_key, "rgb(213, 0, 0)");
        assert_eq!(result.entries[1].display_color, "rgb(3, 155, 229)");
    }

    #[test]
    fn scraped_mode_ignores_color_ids() {
        let events = [Event {
            color_id: Some("1".into()),
            ..scraped("a", 60, Some("rgb(51, 182, 121)"))
        }];

        let result = aggregate(&events, Some(&colors()), CategoryMode::Scraped);
        assert_eq!(result.entries[0].label.as_deref(), Some("Sage"));
    }

    #[test]
    fn grand_total_matches_entries() {
        let events: Vec<Event> = (0..20)
            .map(|i| {
                let color = (i % 4 + 1).to_string();
                timed(&format!("e{i}"), (8, 0), (8 + i % 3, 7 * i % 60), Some(color.as_str()))
            })
            .collect();

        let result = aggregate(&events, Some(&colors()), CategoryMode::Api);
        let sum: f64 = result.entries.iter().map(|entry| entry.minutes).sum();

        assert_eq!(result.grand_total_minutes, sum);
        assert!(result
            .entries
            .windows(2)
            .all(|pair| pair[0].minutes >= pair[1].minutes));
    }

    #[test]
    fn percentage_of_zero_total() {
        assert_eq!(percentage(10.0, 0.0), None);
        assert_eq!(percentage(1.0, 3.0), Some(33));
        assert_eq!(percentage(2.0, 3.0), Some(67));
    }

    #[test]
    fn parse_category_mode() {
        assert_eq!("api".parse(), Ok(CategoryMode::Api));
        assert_eq!("scraped".parse(), Ok(CategoryMode::Scraped));
        assert!("dom".parse::<CategoryMode>().is_err());
    }
}
