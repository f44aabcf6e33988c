pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod knowledge;
pub mod serve;

use tinyrag_config::AppConfig;
use tinyrag_gateway::AppState;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open stores and backend exactly as the server does.
pub(crate) async fn open_state() -> Result<AppState, Box<dyn std::error::Error>> {
    AppState::open(load_config()?).await
}
