//! `tinyrag serve` — Start the HTTP API server.

pub async fn run(port: Option<u16>, host: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    println!("tinyRAG server");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Database:  {}", display_path(&config.storage.db_path));
    println!("   Settings:  {}", config.storage.settings_path);

    tinyrag_gateway::start(config).await?;

    Ok(())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "(in memory)" } else { path }
}
