//! `tinyrag config` — Configuration management commands.

use tinyrag_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Server:    {}:{}", config.server.host, config.server.port);
            println!("   Backend:   {}", config.backend.base_url);
            println!("   Chat:      {}", config.backend.chat_model);
            println!("   Embedding: {}", config.backend.embed_model);
            println!("   Database:  {}", config.storage.db_path);
            println!(
                "   Retrieval: high={:.2} relaxed={:.2} search={:.2}",
                config.retrieval.high_confidence, config.retrieval.relaxed_threshold, config.retrieval.search_threshold
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Valid but probably unintended settings.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.storage.db_path.is_empty() {
        warnings.push("storage.db_path is empty; chunks are kept in memory only");
    }
    if config.storage.chats_path.is_empty() {
        warnings.push("storage.chats_path is empty; conversations are not persisted");
    }
    if config.server.host == "0.0.0.0" {
        warnings.push("server.host 0.0.0.0 exposes the API on every interface");
    }
    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let config_path = dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}
