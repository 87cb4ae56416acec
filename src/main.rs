use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use prometheus::{Encoder, Registry, TextEncoder};
use std::ops::Range;
use supercal::aggregate::CategoryMode;
use supercal::calendar::{event_source_from_config, EventSource};
use supercal::fence::{Position, Size};
use supercal::panel::{HostEvent, JsonFileStore, Panel};
use supercal::render::Summary;
use supercal::session::Session;
use supercal::AppConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize scheduled time per event color
    Summary {
        /// First day of the range (inclusive), defaults to the start of the current week
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,

        /// Last day of the range (exclusive), defaults to seven days after `--from`
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,

        /// Calendar to summarize, may be given multiple times
        #[arg(long = "calendar", value_name = "ID")]
        calendars: Vec<String>,

        /// How events are grouped: `api` or `scraped`
        #[arg(long)]
        mode: Option<CategoryMode>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Print refresh metrics in the prometheus text format to stderr
        #[arg(long)]
        metrics: bool,
    },

    /// List the available calendars
    Calendars,

    /// Fence the persisted panel position into a viewport
    Fence {
        /// Viewport size
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        viewport: Size,

        /// Rendered panel size
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        panel: Size,

        /// Move the panel to this x coordinate first
        #[arg(long, requires = "y", allow_hyphen_values = true)]
        x: Option<f64>,

        /// Move the panel to this y coordinate first
        #[arg(long, requires = "x", allow_hyphen_values = true)]
        y: Option<f64>,
    },
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (width, height) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|err| format!("invalid dimension `{v}`: {err}"))
    };

    Ok(Size::new(parse(width)?, parse(height)?))
}

/// The week containing `today`, starting on Sunday like the calendar's week view.
fn current_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
    (start, start + Duration::days(7))
}

fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Range<DateTime<Utc>> {
    let (week_start, _) = current_week(Utc::now().date_naive());
    let from = from.unwrap_or(week_start);
    let to = to.unwrap_or(from + Duration::days(7));

    let midnight = |date: NaiveDate| {
        DateTime::from_naive_utc_and_offset(date.and_time(chrono::NaiveTime::MIN), Utc)
    };

    midnight(from)..midnight(to)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::Summary {
            from,
            to,
            calendars,
            mode,
            json,
            metrics,
        } => {
            let range = date_range(from, to);
            let calendars = if calendars.is_empty() {
                config.calendar.calendar_ids.clone()
            } else {
                calendars
            };

            let session = Session::new(
                event_source_from_config(&config.calendar)?,
                mode.unwrap_or(config.calendar.mode),
            )?
            .with_calendars(calendars);

            let registry = Registry::new();
            session.register_metrics(&registry)?;

            log::info!(
                "summarizing {} to {} using {} mode",
                range.start,
                range.end,
                session.mode()
            );

            let refreshed = session.refresh(range).await;

            if metrics {
                let mut buffer = Vec::new();
                TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
                eprint!("{}", String::from_utf8(buffer)?);
            }

            let result = match refreshed {
                Ok(Some(result)) => result,
                Ok(None) => anyhow::bail!("a refresh is already running"),
                Err(err) => {
                    // Surface this as unavailable data instead of a partial summary.
                    log::error!("calendar data unavailable: {err}");
                    return Err(err.into());
                }
            };

            let summary = Summary::from(&result);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{summary}");
            }
        }
        Command::Calendars => {
            let source = event_source_from_config(&config.calendar)?;

            for calendar in source.fetch_calendars().await? {
                let primary = if calendar.primary { " (primary)" } else { "" };
                println!("{}\t{}{}", calendar.id, calendar.summary, primary);
            }
        }
        Command::Fence {
            viewport,
            panel,
            x,
            y,
        } => {
            let store = JsonFileStore::new(&config.panel.state_file);
            let mut controller = Panel::restore(store, &config.panel)?;

            controller.handle(HostEvent::ViewportResized(viewport))?;
            controller.handle(HostEvent::PanelResized(panel))?;

            if let (Some(x), Some(y)) = (x, y) {
                // A drag from the current position straight to the requested one.
                let start = controller.position();
                controller.handle(HostEvent::PointerDown(start))?;
                controller.handle(HostEvent::PointerMove(Position::new(x, y)))?;
                controller.handle(HostEvent::PointerUp)?;
            }

            let position = controller.position();
            log::info!(
                "panel state kept in {}",
                controller.store().path().display()
            );
            println!("{} {}", position.x, position.y);
        }
    }

    Ok(())
}
