//! Knowledge base commands: `ingest`, `search`, `sources`, `count`, `delete`.

use std::path::PathBuf;
use std::time::Duration;

use tinyrag_agent::{ContextAssembler, RetrievalPolicy};
use tinyrag_core::store::InsertOutcome;
use tinyrag_gateway::AppState;
use tinyrag_memory::chunk_text;
use tinyrag_tools::{WebClient, WikipediaTool};

/// Where ingested text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    File { path: PathBuf, title: Option<String> },
    Text { text: String, title: Option<String> },
    Wiki { article: String, title: String, lang: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestReport {
    pub title: String,
    pub chars: usize,
    pub chunks: usize,
    pub skipped: bool,
    pub total: usize,
}

pub async fn ingest(source: IngestSource) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    let report = ingest_into(&state, source).await?;

    if report.skipped {
        println!("'{}' already exists, nothing added", report.title);
    } else {
        println!(
            "Added '{}': {} chars in {} chunks",
            report.title, report.chars, report.chunks
        );
    }
    println!("Total chunks: {}", report.total);
    Ok(())
}

pub(crate) async fn ingest_into(
    state: &AppState,
    source: IngestSource,
) -> Result<IngestReport, Box<dyn std::error::Error>> {
    let (title, text) = match source {
        IngestSource::File { path, title } => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            let title = title.unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(manual_title)
            });
            (title, text)
        }
        IngestSource::Text { text, title } => (title.unwrap_or_else(manual_title), text),
        IngestSource::Wiki { article, title, lang } => {
            let lang = lang.unwrap_or_else(|| state.settings.snapshot().lang);
            let web = WebClient::new(Duration::from_secs(state.config.tools.http_timeout_secs))?;
            let text = WikipediaTool::new(web, &lang).fetch(&article).await?;
            (title, text)
        }
    };

    if text.trim().is_empty() {
        return Err(format!("Nothing to ingest for '{title}'").into());
    }

    let chunks = chunk_text(&text, state.settings.snapshot().chunk_size());
    let provider = state.provider.current();
    let outcome = state.store.insert(provider.as_ref(), &title, &chunks).await?;
    let total = state.store.count_all().await?;
    tracing::info!(article = %title, chunks = chunks.len(), total, "Ingestion finished");

    Ok(IngestReport {
        chars: text.len(),
        chunks: chunks.len(),
        skipped: matches!(outcome, InsertOutcome::Skipped { .. }),
        total,
        title,
    })
}

fn manual_title() -> String {
    format!("manual-{}", chrono::Utc::now().timestamp())
}

pub async fn search(query: &str, k: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    let k = k.filter(|k| *k > 0).unwrap_or_else(|| state.settings.snapshot().k());

    let assembler = ContextAssembler::new(state.store.clone(), RetrievalPolicy::from(&state.config.retrieval));
    let provider = state.provider.current();
    let chunks = assembler.search(provider.as_ref(), query, k).await?;

    if chunks.is_empty() {
        println!("No chunks above the search threshold for \"{query}\"");
        return Ok(());
    }
    for chunk in &chunks {
        let marker = if chunk.is_neighbor { "  neighbor" } else { "" };
        println!("[{:.3}] {}#{}{marker}", chunk.score, chunk.article, chunk.chunk_idx);
        for line in chunk.content.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

pub async fn sources() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    let articles = state.store.list_articles().await?;
    if articles.is_empty() {
        println!("The knowledge base is empty.");
        return Ok(());
    }
    for entry in &articles {
        println!("{:>6}  {}", entry.chunks, entry.article);
    }
    Ok(())
}

pub async fn count() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    println!("{}", state.store.count_all().await?);
    Ok(())
}

pub async fn delete(article: &str) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    let removed = state.store.delete_article(article).await?;
    if removed == 0 {
        println!("No chunks stored for '{article}'");
    } else {
        println!("Deleted {removed} chunks of '{article}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tinyrag_config::{AppConfig, Settings, SettingsStore};
    use tinyrag_core::error::ProviderError;
    use tinyrag_core::provider::{ChatRequest, ModelInfo, Provider, TokenStream};
    use tinyrag_memory::{ChatStore, InMemoryChunkStore};
    use tinyrag_providers::ProviderHandle;

    struct MockProvider;

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "cli_mock"
        }

        fn models(&self) -> ModelInfo {
            ModelInfo {
                base_url: "http://mock".into(),
                chat_model: "mock-chat".into(),
                embed_model: "mock-embed".into(),
            }
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn stream_chat(&self, _request: ChatRequest) -> Result<TokenStream, ProviderError> {
            Err(ProviderError::NotConfigured("no chat in tests".into()))
        }
    }

    fn state(dir: &tempfile::TempDir) -> AppState {
        let config = AppConfig::default();
        let settings = Settings::from_defaults(&config.backend);
        AppState {
            settings: SettingsStore::with_settings(dir.path().join("settings.json"), settings),
            provider: ProviderHandle::new(Arc::new(MockProvider)),
            store: Arc::new(InMemoryChunkStore::new()),
            chats: Arc::new(ChatStore::ephemeral()),
            config,
        }
    }

    #[tokio::test]
    async fn file_title_defaults_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mars-notes.txt");
        std::fs::write(&path, "Mars ist rot.\n\nMars hat zwei Monde.\n").unwrap();
        let state = state(&dir);

        let report = ingest_into(&state, IngestSource::File { path, title: None })
            .await
            .unwrap();
        assert_eq!(report.title, "mars-notes");
        assert_eq!(report.chunks, 1);
        assert!(!report.skipped);
        assert_eq!(report.total, 1);
    }

    #[tokio::test]
    async fn existing_article_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let text = |t: &str| IngestSource::Text {
            text: t.into(),
            title: Some("Notiz".into()),
        };

        ingest_into(&state, text("eins")).await.unwrap();
        let again = ingest_into(&state, text("zwei")).await.unwrap();
        assert!(again.skipped);
        assert_eq!(again.total, 1);
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let result = ingest_into(
            &state,
            IngestSource::Text {
                text: " \n ".into(),
                title: None,
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(state.store.count_all().await.unwrap(), 0);
    }
}
