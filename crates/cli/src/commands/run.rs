//! `attache run` — one assistant run: gather data, email the brief.

use attache_agent::{Session, daily_brief_prompt, system_instruction};
use attache_calendar::{CalendarClient, CredentialStore};
use attache_config::AppConfig;
use attache_core::event::{DomainEvent, EventBus};
use std::sync::Arc;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Entry contract: refuse to start with anything missing, listing every
    // absent name, before any side effect.
    let missing = config.missing_required();
    if !missing.is_empty() {
        eprintln!();
        eprintln!("  Missing required environment variables:");
        for name in &missing {
            eprintln!("    - {name}");
        }
        eprintln!();
        eprintln!("  Set them in the environment or in {}",
            AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("missing required configuration".into());
    }

    let (Some(api_key), Some(recipient)) =
        (config.api_key.clone(), config.recipient_email.clone())
    else {
        return Err("missing required configuration".into());
    };

    println!("Starting Attaché...");
    println!("Current time: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("{}", "-".repeat(50));

    // Wiring
    let provider = Arc::new(attache_providers::AnthropicProvider::new(api_key));
    let store = Arc::new(CredentialStore::new(
        &config.calendar.credentials_file,
        &config.calendar.token_file,
    ));
    let calendar = Arc::new(CalendarClient::new(store));
    let tools = Arc::new(attache_tools::assistant_registry(
        calendar,
        config.window_days,
    ));
    let event_bus = Arc::new(EventBus::default());

    // Print assistant text as it arrives — observability only
    let mut events = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let DomainEvent::AssistantText { content, .. } = event.as_ref() {
                println!("\n{content}");
            }
        }
    });

    let mut session = Session::new(
        provider,
        &config.model,
        tools,
        vec!["calendar_events".into(), "send_email".into()],
        event_bus,
    )
    .with_temperature(config.temperature)
    .with_max_tokens(config.max_tokens);

    let prompt = daily_brief_prompt(
        &recipient,
        chrono::Local::now().date_naive(),
        config.window_days,
    );

    let result = session.run(&system_instruction(), &prompt).await;
    printer.abort();

    println!("\n{}", "-".repeat(50));
    match result {
        Ok(outcome) => {
            println!("{}", outcome.report());
            Ok(())
        }
        Err(e) => {
            eprintln!("Error running assistant: {e}");
            Err(e.into())
        }
    }
}
