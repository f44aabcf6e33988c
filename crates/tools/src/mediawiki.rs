//! Wikipedia and Wiktionary lookups via the MediaWiki extracts API.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tinyrag_core::error::ToolError;
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput};

use crate::web::WebClient;

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: ExtractQuery,
}

#[derive(Default, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
}

/// The plain-text extract of `title`, or `None` when the wiki has no such page.
async fn fetch_extract(
    web: &WebClient,
    tool: &str,
    endpoint: &str,
    title: &str,
) -> Result<Option<(String, String)>, ToolError> {
    let url = format!(
        "{endpoint}?action=query&prop=extracts&explaintext=1&titles={}&format=json",
        urlencoding::encode(title)
    );
    let page = web.get(tool, &url).await?;
    if page.status != 200 {
        return Err(ToolError::failed(
            tool,
            format!("API returned HTTP {} for \"{title}\"", page.status),
        ));
    }
    if !page.content_type.contains("json") {
        return Err(ToolError::failed(
            tool,
            format!("API returned unexpected content-type \"{}\" for \"{title}\"", page.content_type),
        ));
    }
    let parsed: ExtractResponse = serde_json::from_str(&page.body)
        .map_err(|e| ToolError::failed(tool, format!("JSON parse error for \"{title}\": {e}")))?;

    Ok(parsed
        .query
        .pages
        .into_values()
        .next()
        .filter(|p| !p.extract.is_empty())
        .map(|p| (p.title, p.extract)))
}

fn wiki_endpoint(site: &str, lang: &str) -> String {
    let lang = if lang.trim().is_empty() { "de" } else { lang.trim() };
    format!("https://{lang}.{site}.org/w/api.php")
}

/// Full-text encyclopedia article lookup.
pub struct WikipediaTool {
    web: WebClient,
    endpoint: String,
}

impl WikipediaTool {
    pub fn new(web: WebClient, lang: &str) -> Self {
        Self::with_endpoint(web, wiki_endpoint("wikipedia", lang))
    }

    pub fn with_endpoint(web: WebClient, endpoint: impl Into<String>) -> Self {
        Self { web, endpoint: endpoint.into() }
    }

    /// The article text, used by the tool and by direct article ingestion.
    pub async fn fetch(&self, article: &str) -> Result<String, ToolError> {
        match fetch_extract(&self.web, self.name(), &self.endpoint, article).await? {
            Some((_, extract)) => Ok(extract),
            None => Err(ToolError::failed(
                self.name(),
                format!("article \"{article}\" has no content"),
            )),
        }
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> String {
        "Sucht einen Wikipedia-Artikel und lädt dessen Volltext. Verwende dies für Fakten über Personen, Orte, Ereignisse, Wissenschaft etc.".into()
    }

    fn param_hint(&self) -> String {
        "Artikelname (z.B. 'Sonnensystem', 'Albert_Einstein')".into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Lookup
    }

    fn source_name(&self, query: &str) -> String {
        format!("wiki:{query}")
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let text = self.fetch(query).await?;
        Ok(ToolOutput { source: self.source_name(query), text })
    }
}

/// Dictionary lookup.
pub struct WiktionaryTool {
    web: WebClient,
    endpoint: String,
}

impl WiktionaryTool {
    pub fn new(web: WebClient, lang: &str) -> Self {
        Self::with_endpoint(web, wiki_endpoint("wiktionary", lang))
    }

    pub fn with_endpoint(web: WebClient, endpoint: impl Into<String>) -> Self {
        Self { web, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl Tool for WiktionaryTool {
    fn name(&self) -> &str {
        "wiktionary"
    }

    fn description(&self) -> String {
        "Schlägt ein Wort im Wiktionary (Wörterbuch) nach. Liefert Bedeutung, Etymologie, Übersetzungen.".into()
    }

    fn param_hint(&self) -> String {
        "Einzelnes Wort (z.B. 'Apfel', 'serendipity')".into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Lookup
    }

    fn source_name(&self, query: &str) -> String {
        format!("wikt:{query}")
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        match fetch_extract(&self.web, self.name(), &self.endpoint, query).await? {
            Some((title, extract)) => Ok(ToolOutput {
                source: self.source_name(query),
                text: format!("Wiktionary: {title}\n\n{extract}"),
            }),
            None => Err(ToolError::failed(
                self.name(),
                format!("no entry found for \"{query}\""),
            )),
        }
    }
}
