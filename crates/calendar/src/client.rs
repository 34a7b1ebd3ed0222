//! Best-effort calendar read client.
//!
//! `fetch_window` is deliberately infallible: a missing or broken calendar
//! must not block the rest of the assistant run, so every failure degrades
//! to an empty result. The conditions are still logged — and logged
//! distinctly, so an operator can tell "not set up" from "service down"
//! from "response didn't parse" — but the caller never sees an error.

use crate::auth::CredentialStore;
use crate::error::{AuthError, CalendarError};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const MAX_RESULTS: u32 = 50;
const FETCH_TIMEOUT_SECS: u64 = 30;

/// When an event starts or ends: a precise timestamp, or a bare date for
/// all-day events. One event never mixes the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    Timestamp(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl EventTime {
    /// Whether this is a precise timestamp (vs an all-day date).
    pub fn is_timestamp(&self) -> bool {
        matches!(self, Self::Timestamp(_))
    }

    /// A UTC instant usable for ordering (all-day events sort at midnight).
    pub fn sort_key(&self) -> DateTime<Utc> {
        match self {
            Self::Timestamp(dt) => dt.with_timezone(&Utc),
            Self::Date(date) => date
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time")
                .and_utc(),
        }
    }
}

/// A normalized calendar event. Constructed per fetch, never mutated.
/// Optional text fields are empty strings, never absent.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub location: String,
    pub description: String,
    pub meeting_link: String,
}

/// Fetches a bounded window of events from the primary calendar.
pub struct CalendarClient {
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    base_url: String,
}

impl CalendarClient {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            store,
            http,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    /// Override the API base URL (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch events in `[now, now + window_days]`, sorted ascending by
    /// start. Never fails — any error degrades to an empty result.
    pub async fn fetch_window(&self, window_days: u32) -> Vec<CalendarEvent> {
        match self.try_fetch(window_days, Utc::now()).await {
            Ok(events) => events,
            Err(CalendarError::Auth(e @ AuthError::MissingClientSecret { .. })) => {
                warn!(error = %e, "Calendar setup required, continuing without calendar data");
                Vec::new()
            }
            Err(e @ CalendarError::Shape(_)) => {
                warn!(error = %e, "Calendar response did not parse, continuing without calendar data");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Calendar unavailable, continuing without calendar data");
                Vec::new()
            }
        }
    }

    /// The fallible fetch behind `fetch_window`, with an injectable clock.
    pub async fn try_fetch(
        &self,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let credential = self.store.obtain_at(now).await?;

        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = (now + Duration::days(window_days as i64))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let url = format!("{}/calendars/primary/events", self.base_url);
        let max_results = MAX_RESULTS.to_string();
        let query = [
            ("timeMin", time_min.as_str()),
            ("timeMax", time_max.as_str()),
            ("maxResults", max_results.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
        ];

        let response = self
            .http
            .get(&url)
            .query(&query)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| CalendarError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status,
                message: body,
            });
        }

        let page: EventsPage = response
            .json()
            .await
            .map_err(|e| CalendarError::Shape(e.to_string()))?;

        let mut events: Vec<CalendarEvent> = Vec::with_capacity(page.items.len());
        for item in page.items {
            match normalize(item) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    // One bad record doesn't spoil the batch
                    warn!(reason = %reason, "Skipping malformed calendar event");
                }
            }
        }

        events.sort_by_key(|e| e.start.sort_key());
        debug!(count = events.len(), window_days, "Fetched calendar events");
        Ok(events)
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    summary: Option<String>,
    start: Option<RawTime>,
    end: Option<RawTime>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "hangoutLink")]
    hangout_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTime {
    #[serde(default, rename = "dateTime")]
    date_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

/// Normalize one wire event, preferring the precise timestamp field and
/// falling back to the all-day date.
fn normalize(raw: RawEvent) -> Result<CalendarEvent, String> {
    let start = parse_time(raw.start.as_ref().ok_or("event has no start")?)?;
    let end = parse_time(raw.end.as_ref().ok_or("event has no end")?)?;

    if start.is_timestamp() != end.is_timestamp() {
        return Err("event mixes timestamp and all-day times".into());
    }

    Ok(CalendarEvent {
        summary: raw.summary.unwrap_or_else(|| "No title".into()),
        start,
        end,
        location: raw.location.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        meeting_link: raw.hangout_link.unwrap_or_default(),
    })
}

fn parse_time(raw: &RawTime) -> Result<EventTime, String> {
    if let Some(dt) = &raw.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .map(EventTime::Timestamp)
            .map_err(|e| format!("bad dateTime {dt:?}: {e}"));
    }
    if let Some(d) = &raw.date {
        return NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(EventTime::Date)
            .map_err(|e| format!("bad date {d:?}: {e}"));
    }
    Err("time has neither dateTime nor date".into())
}
