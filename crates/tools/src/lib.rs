//! Built-in tool implementations for Attaché.
//!
//! Two capabilities are exposed to the driving agent: reading the upcoming
//! calendar window and sending the summary email. Both validate their own
//! arguments and report failures as error results — nothing here raises
//! across the session boundary.

pub mod calendar_events;
pub mod send_email;

use attache_calendar::CalendarClient;
use attache_core::tool::ToolRegistry;
use std::sync::Arc;

pub use calendar_events::CalendarEventsTool;
pub use send_email::{EmailSendTool, SmtpConfig};

/// Create the assistant's tool registry.
///
/// SMTP settings come from the process environment at execution time (see
/// `SmtpConfig::from_env`), so registration never fails on missing config.
pub fn assistant_registry(calendar: Arc<CalendarClient>, window_days: u32) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalendarEventsTool::new(calendar, window_days)));
    registry.register(Box::new(EmailSendTool::from_env()));
    registry
}
