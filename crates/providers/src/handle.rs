//! Hot-swappable provider handle.
//!
//! The active backend (endpoint + models) can be replaced at runtime from
//! the settings API. Requests take a snapshot `Arc` at their start and keep
//! using it; a swap only affects requests that start afterwards.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tinyrag_config::Settings;
use tinyrag_core::error::ProviderError;
use tinyrag_core::provider::{ModelInfo, Provider};

use crate::openai_compat::OpenAiCompatProvider;

/// Shared, atomically replaceable reference to the active provider.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<RwLock<Arc<dyn Provider>>>,
}

impl ProviderHandle {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(provider)),
        }
    }

    /// The provider in effect right now.
    pub fn current(&self) -> Arc<dyn Provider> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the provider, returning the previous one.
    pub fn swap(&self, provider: Arc<dyn Provider>) -> Arc<dyn Provider> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::info!(
            base_url = %provider.models().base_url,
            chat_model = %provider.models().chat_model,
            "Switching completion backend"
        );
        std::mem::replace(&mut *guard, provider)
    }

    pub fn models(&self) -> ModelInfo {
        self.current().models()
    }
}

/// Build the backend client described by the user settings.
pub fn build_from_settings(settings: &Settings, timeout: Duration) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = OpenAiCompatProvider::new(
        &settings.base_url,
        settings.chat_model.clone(),
        settings.embed_model.clone(),
        timeout,
    )?;
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrag_config::BackendDefaults;

    #[test]
    fn swap_replaces_whole_snapshot() {
        let first = Settings::from_defaults(&BackendDefaults::default());
        let mut second = first.clone();
        second.base_url = "http://localhost:11434".into();
        second.chat_model = "llama3".into();
        second.embed_model = "nomic-embed-text".into();

        let handle = ProviderHandle::new(build_from_settings(&first, Duration::from_secs(1)).unwrap());
        let before = handle.current();

        let old = handle.swap(build_from_settings(&second, Duration::from_secs(1)).unwrap());
        assert_eq!(old.models(), before.models());

        let now = handle.models();
        assert_eq!(now.base_url, "http://localhost:11434");
        assert_eq!(now.chat_model, "llama3");
        assert_eq!(now.embed_model, "nomic-embed-text");

        // a snapshot taken before the swap is unaffected
        assert_eq!(before.models().base_url, "http://localhost:1234");
    }

    #[test]
    fn clones_share_the_slot() {
        let settings = Settings::from_defaults(&BackendDefaults::default());
        let handle = ProviderHandle::new(build_from_settings(&settings, Duration::from_secs(1)).unwrap());
        let clone = handle.clone();

        let mut other = settings.clone();
        other.chat_model = "other".into();
        handle.swap(build_from_settings(&other, Duration::from_secs(1)).unwrap());
        assert_eq!(clone.models().chat_model, "other");
    }
}
