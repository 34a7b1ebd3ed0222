//! Prompt construction for the daily-brief task.
//!
//! The task prompt is dated (the model has no reliable clock) and carries
//! an explicit partial-success instruction: missing data sources must be
//! reported, never papered over with invented content.

use chrono::NaiveDate;

/// The session's system instruction.
pub fn system_instruction() -> String {
    "You are a helpful personal assistant that checks the user's upcoming \
     schedule and sends reminder emails."
        .to_string()
}

/// The dated task prompt for one assistant run.
pub fn daily_brief_prompt(recipient: &str, today: NaiveDate, window_days: u32) -> String {
    let today = today.format("%Y-%m-%d");
    format!(
        "You are a personal assistant helping the user stay on top of their \
schedule and commitments.

Today's date is: {today}

Your job is to:

1. **Check the calendar**:
   - Use the calendar_events tool to list events for the next {window_days} days
   - Note each event's date, time, title, and location

2. **Send a reminder email**:
   - Compose a nicely formatted HTML email summarizing the upcoming events, \
organized by day
   - Send the email to: {recipient} using the send_email tool
   - Use a clear, professional format with sections and bullet points
   - The subject line should include today's date ({today})

Start by checking the calendar, then compose and send the email.

If any data source could not be accessed, say so explicitly in the email \
and include whatever you were able to gather. Never invent events or \
details to fill a gap."
    )
}
