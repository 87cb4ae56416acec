use crate::aggregate::AggregateResult;
use serde::Serialize;
use std::fmt;

/// Placeholder shown instead of a percentage when nothing was scheduled.
pub const NO_PERCENTAGE: &str = "—";

/// Formats a duration in minutes as decimal hours, e.g. `1.50 h`. Rounds only here.
pub fn format_duration(minutes: f64) -> String {
    format!("{:.2} h", minutes / 60.0)
}

pub fn format_percentage(percentage: Option<u32>) -> String {
    match percentage {
        Some(percentage) => format!("{percentage}%"),
        None => NO_PERCENTAGE.to_owned(),
    }
}

/// A single display row of the summary.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub label: String,
    pub color: String,
    pub duration: String,
    pub percentage: String,
}

/// Display-ready version of an `AggregateResult`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: String,
    pub rows: Vec<SummaryRow>,
}

impl From<&AggregateResult> for Summary {
    fn from(result: &AggregateResult) -> Self {
        let rows = result
            .entries
            .iter()
            .map(|entry| SummaryRow {
                label: entry
                    .label
                    .clone()
                    .unwrap_or_else(|| entry.category_key.clone()),
                color: entry.display_color.clone(),
                duration: format_duration(entry.minutes),
                percentage: format_percentage(result.percentage(entry)),
            })
            .collect();

        Summary {
            total: format_duration(result.grand_total_minutes),
            rows,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Total: {}", self.total)?;

        let width = self
            .rows
            .iter()
            .map(|row| row.label.chars().count())
            .max()
            .unwrap_or(0);

        for row in &self.rows {
            writeln!(
                f,
                "  {:<width$}  {:>10}  {:>4}  {}",
                row.label,
                row.duration,
                row.percentage,
                row.color,
                width = width
            )?;
        }

        Ok(())
    }
}
