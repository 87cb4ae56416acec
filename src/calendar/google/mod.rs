pub mod models;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use task_local_extensions::Extensions;

const API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Page size used when fetching all events of a range.
pub const MAX_RESULTS_PER_PAGE: u32 = 2500;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// Error while executing some middleware code.
    #[error("request middleware failed with: {0}")]
    RequestMiddleware(#[from] reqwest_middleware::Error),

    /// Error while building http headers.
    #[error("encountered invalid HTTP header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// Error while building a request URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// Error when no access token is configured.
    #[error("missing access token; set `calendar.access_token` or `SUPERCAL_CALENDAR__ACCESS_TOKEN`")]
    MissingToken,
}

impl From<ClientError> for reqwest_middleware::Error {
    fn from(err: ClientError) -> Self {
        reqwest_middleware::Error::Middleware(anyhow::Error::new(err))
    }
}

/// Provides bearer tokens for the Google Calendar API.
///
/// Acquiring, refreshing and revoking tokens is the identity provider's business. Implementors
/// hand out whatever token they currently hold or fail, in which case the calendar data is
/// unavailable.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns an access token. `interactive` signals whether the provider may prompt the user.
    async fn token(&self, interactive: bool) -> Result<String, ClientError>;
}

/// A `TokenProvider` handing out a fixed, externally obtained token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new<T: Into<String>>(token: T) -> StaticToken {
        StaticToken(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _interactive: bool) -> Result<String, ClientError> {
        if self.0.is_empty() {
            return Err(ClientError::MissingToken);
        }

        Ok(self.0.clone())
    }
}

struct AuthMiddleware {
    token_provider: Arc<dyn TokenProvider>,
}

impl AuthMiddleware {
    fn new(token_provider: Arc<dyn TokenProvider>) -> AuthMiddleware {
        AuthMiddleware { token_provider }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self.token_provider.token(false).await?;

        let mut header =
            HeaderValue::try_from(format!("Bearer {token}")).map_err(ClientError::from)?;
        header.set_sensitive(true);
        req.headers_mut().insert(AUTHORIZATION, header);
        next.run(req, extensions).await
    }
}

/// Google calendar client for making requests to the google calendar api
pub struct GoogleCalendarClient {
    client: ClientWithMiddleware,
}

impl fmt::Debug for GoogleCalendarClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GoogleCalendarClient").finish_non_exhaustive()
    }
}

impl GoogleCalendarClient {
    /// Create a new google calendar client which authenticates its requests with tokens from
    /// `token_provider`.
    pub fn new(token_provider: Arc<dyn TokenProvider>) -> Result<GoogleCalendarClient, ClientError> {
        let client = ClientBuilder::new(
            reqwest::Client::builder()
                .gzip(true)
                .timeout(Duration::from_secs(10))
                .build()?,
        )
        .with(AuthMiddleware::new(token_provider))
        .build();

        Ok(GoogleCalendarClient { client })
    }

    /// Queries events from a calendar. The query can be filtered by a time range and the number
    /// of results can be limited, in which case the result might carry a page token that should
    /// be passed to the next request to get the next page of events.
    pub async fn get_events(
        &self,
        calendar_id: &str,
        date_range: Option<Range<DateTime<Utc>>>,
        event_count: Option<u32>,
        next_page_token: Option<String>,
    ) -> Result<(Vec<models::Event>, Option<String>), ClientError> {
        let query = build_query_parameters(&date_range, &event_count, &next_page_token);

        let events = self
            .client
            .get(events_url(calendar_id)?)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json::<models::Events>()
            .await?;

        log::debug!(
            "fetched {} events from calendar {}",
            events.items.len(),
            calendar_id
        );

        Ok((events.items, events.next_page_token))
    }

    /// Queries all events of a calendar within `date_range`, following pagination.
    pub async fn get_all_events(
        &self,
        calendar_id: &str,
        date_range: Range<DateTime<Utc>>,
    ) -> Result<Vec<models::Event>, ClientError> {
        let mut events = Vec::new();
        let mut page_token = None;

        loop {
            let (page, next_page_token) = self
                .get_events(
                    calendar_id,
                    Some(date_range.clone()),
                    Some(MAX_RESULTS_PER_PAGE),
                    page_token,
                )
                .await?;

            events.extend(page);

            match next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }

    /// Fetches the calendar and event color definitions.
    pub async fn get_colors(&self) -> Result<models::Colors, ClientError> {
        let colors = self
            .client
            .get(api_url(&["colors"])?)
            .send()
            .await?
            .error_for_status()?
            .json::<models::Colors>()
            .await?;

        log::debug!("fetched {} event color definitions", colors.event.len());

        Ok(colors)
    }

    /// Lists the calendars on the user's calendar list.
    pub async fn get_calendar_list(&self) -> Result<models::CalendarList, ClientError> {
        let calendars = self
            .client
            .get(api_url(&["users", "me", "calendarList"])?)
            .query(&[("maxResults", "100")])
            .send()
            .await?
            .error_for_status()?
            .json::<models::CalendarList>()
            .await?;

        log::debug!("fetched {} calendars", calendars.items.len());

        Ok(calendars)
    }
}

/// Builds an API URL from path segments. Segments are percent-encoded.
fn api_url(segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = Url::parse(API_BASE_URL).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(API_BASE_URL.to_owned()))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

fn events_url(calendar_id: &str) -> Result<Url, ClientError> {
    api_url(&["calendars", calendar_id, "events"])
}

fn build_query_parameters(
    date_range: &Option<Range<DateTime<Utc>>>,
    event_count: &Option<u32>,
    next_page_token: &Option<String>,
) -> IndexMap<&'static str, String> {
    // Google requires rfc3339 format for the times with a fixed offset
    // see: https://developers.google.com/calendar/api/v3/reference/events/list

    let mut query_parameters: IndexMap<&'static str, String> = IndexMap::from([
        // expand recurring events into instances
        ("singleEvents", "true".to_owned()),
        // order ascending by start time
        ("orderBy", "startTime".to_owned()),
    ]);

    if let Some(range) = date_range {
        // limit the events by a time frame
        query_parameters.insert(
            "timeMin",
            range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        query_parameters.insert(
            "timeMax",
            range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }

    if let Some(count) = event_count {
        // limit the number of events to a specific count
        query_parameters.insert("maxResults", count.to_string());
    }

    if let Some(token) = next_page_token {
        // page token returned by previous request to fetch the next page
        query_parameters.insert("pageToken", token.clone());
    }

    query_parameters
}
