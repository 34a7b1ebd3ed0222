//! Calendar read tool — exposes the upcoming-events window to the agent.
//!
//! The underlying client is best-effort, so this tool never returns an
//! error result: a broken calendar shows up as the fixed "no events" text,
//! and the agent is instructed to report gaps rather than fabricate.

use async_trait::async_trait;
use attache_calendar::{CalendarClient, render};
use attache_core::tool::{Tool, ToolCall, ToolResult};
use std::sync::Arc;

const MAX_WINDOW_DAYS: u64 = 31;

pub struct CalendarEventsTool {
    client: Arc<CalendarClient>,
    default_window_days: u32,
}

impl CalendarEventsTool {
    pub fn new(client: Arc<CalendarClient>, default_window_days: u32) -> Self {
        Self {
            client,
            default_window_days,
        }
    }
}

#[async_trait]
impl Tool for CalendarEventsTool {
    fn name(&self) -> &str {
        "calendar_events"
    }

    fn description(&self) -> &str {
        "List upcoming events from the user's primary calendar, one per line \
         with date, time, title, and location. Returns a fixed notice when \
         there are no events or the calendar is not configured."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": "How many days ahead to look (default 5, max 31)",
                    "minimum": 1
                }
            }
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let days = call.arguments["days"]
            .as_u64()
            .filter(|d| *d >= 1)
            .map(|d| d.min(MAX_WINDOW_DAYS) as u32)
            .unwrap_or(self.default_window_days);

        let events = self.client.fetch_window(days).await;
        ToolResult::ok(&call.id, render(&events))
    }
}
