//! `attache calendar` — fetch and print the upcoming window.
//!
//! Useful as a setup self-test: it exercises the credential store (and the
//! interactive consent flow on first use) without touching the agent or
//! sending any email.

use attache_calendar::{CalendarClient, CredentialStore, render};
use attache_config::AppConfig;
use std::sync::Arc;

pub async fn run(days: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let window_days = days.unwrap_or(config.window_days);

    let store = Arc::new(CredentialStore::new(
        &config.calendar.credentials_file,
        &config.calendar.token_file,
    ));
    let client = CalendarClient::new(store);

    println!("Fetching calendar events for the next {window_days} days...");
    let events = client.fetch_window(window_days).await;

    if events.is_empty() {
        println!("\nNo events found or calendar not configured.");
    } else {
        println!("\nFound {} events:", events.len());
        println!("{}", render(&events));
    }

    Ok(())
}
