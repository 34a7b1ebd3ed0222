//! `attache onboard` — initialize the config directory.

use attache_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Wrote default config to {}", config_path.display());
    }

    println!();
    println!("Next steps:");
    println!("  1. Set ANTHROPIC_API_KEY and RECIPIENT_EMAIL in your environment");
    println!("  2. For email delivery, set SMTP_HOST, SMTP_USER, and SMTP_PASSWORD");
    println!(
        "  3. For calendar access, save your OAuth client secret as {}",
        config_dir.join("credentials.json").display()
    );
    println!("  4. Run `attache calendar` once to complete the consent flow");
    println!("  5. Run `attache run` to send your first brief");

    Ok(())
}
