//! `streamgram config`: Configuration management commands.

use streamgram_config::AppConfig;

/// A copy of `config` that is safe to print.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some("[REDACTED]".into());
    }
    if shown.telegram.bot_token.is_some() {
        shown.telegram.bot_token = Some("[REDACTED]".into());
    }
    shown
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set STREAMGRAM_API_KEY or OPENAI_API_KEY)");
            }
            if config.telegram.bot_token.is_none() {
                warnings.push("No Telegram bot token set; `send` is unavailable");
            }
            if config.render.flush_threshold > config.render.page_capacity {
                warnings.push("render.flush_threshold exceeds page_capacity; pages update only when full");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Endpoint:  {}", config.provider.api_url);
            println!("   Model:     {}", config.provider.default_model);
            println!("   Paging:    {} chars, flush every {}", config.render.page_capacity, config.render.flush_threshold);
            println!("   Attempts:  {}", config.conversation.max_attempts);
            println!("   History:   {}", config.history.backend);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(&config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
