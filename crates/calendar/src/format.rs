//! Rendering normalized events into prompt-ready text.
//!
//! Pure functions, no side effects — the agent sees exactly this text as
//! tool output, so the format is part of the tool contract.

use crate::client::{CalendarEvent, EventTime};

/// What the agent sees when there is nothing to show. Fixed wording so the
/// model can rely on it (and so can the tests).
pub const NO_EVENTS_MESSAGE: &str =
    "No calendar events found for the next 5 days (or calendar not configured).";

/// Render events as a bulleted list, one line per event.
///
/// Timed events show as `"Wed Jan 03, 02:00 PM"`, all-day events as
/// `"Wed Jan 03 (all day)"`; a non-empty location is appended as
/// `" @ <location>"`.
pub fn render(events: &[CalendarEvent]) -> String {
    if events.is_empty() {
        return NO_EVENTS_MESSAGE.to_string();
    }

    events
        .iter()
        .map(|event| {
            let mut line = format!("- {}: {}", format_start(&event.start), event.summary);
            if !event.location.is_empty() {
                line.push_str(&format!(" @ {}", event.location));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_start(start: &EventTime) -> String {
    match start {
        EventTime::Timestamp(dt) => dt.format("%a %b %d, %I:%M %p").to_string(),
        EventTime::Date(date) => format!("{} (all day)", date.format("%a %b %d")),
    }
}
