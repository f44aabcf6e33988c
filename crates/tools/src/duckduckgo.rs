//! DuckDuckGo-backed search tools.
//!
//! One implementation serves three catalog entries: the plain DuckDuckGo
//! lookup, the general web search and the StackOverflow-restricted search.
//! The Instant Answer API is tried first; when it has nothing, result
//! snippets are scraped from the HTML endpoint.

use async_trait::async_trait;
use scraper::Selector;
use serde::Deserialize;
use std::sync::LazyLock;
use tinyrag_core::error::ToolError;
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput};

use crate::web::{WebClient, select_text};

const API_ENDPOINT: &str = "https://api.duckduckgo.com/";
const HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_RELATED: usize = 5;
const MAX_SNIPPETS: usize = 10;

static SNIPPET: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("a.result__snippet").ok());

/// Which catalog entry a [`DuckDuckGoTool`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFlavor {
    DuckDuckGo,
    WebSearch,
    StackOverflow,
}

impl SearchFlavor {
    fn name(self) -> &'static str {
        match self {
            Self::DuckDuckGo => "duckduckgo",
            Self::WebSearch => "websearch",
            Self::StackOverflow => "stackoverflow",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::DuckDuckGo => "ddg",
            Self::WebSearch => "web",
            Self::StackOverflow => "so",
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "Abstract")]
    abstract_: String,
    #[serde(default)]
    abstract_source: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    answer: serde_json::Value,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: String,
}

pub struct DuckDuckGoTool {
    web: WebClient,
    flavor: SearchFlavor,
    api_endpoint: String,
    html_endpoint: String,
}

impl DuckDuckGoTool {
    pub fn new(web: WebClient, flavor: SearchFlavor) -> Self {
        Self::with_endpoints(web, flavor, API_ENDPOINT, HTML_ENDPOINT)
    }

    pub fn with_endpoints(
        web: WebClient,
        flavor: SearchFlavor,
        api_endpoint: impl Into<String>,
        html_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            web,
            flavor,
            api_endpoint: api_endpoint.into(),
            html_endpoint: html_endpoint.into(),
        }
    }

    fn search_terms(&self, query: &str) -> String {
        match self.flavor {
            SearchFlavor::StackOverflow => format!("site:stackoverflow.com {query}"),
            _ => query.to_string(),
        }
    }

    async fn instant_answer(&self, terms: &str) -> Result<String, ToolError> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.api_endpoint,
            urlencoding::encode(terms)
        );
        let page = self.web.get(self.name(), &url).await?;
        let parsed: InstantAnswer = serde_json::from_str(&page.body)
            .map_err(|e| ToolError::failed(self.name(), format!("invalid Instant Answer JSON: {e}")))?;
        Ok(format_instant_answer(&parsed))
    }

    async fn html_snippets(&self, terms: &str) -> Result<String, ToolError> {
        let url = format!("{}?q={}", self.html_endpoint, urlencoding::encode(terms));
        let page = self
            .web
            .get(self.name(), &url)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("HTML fallback failed: {e}")))?;

        let snippets = extract_snippets(&page.body, MAX_SNIPPETS);
        if snippets.is_empty() {
            return Err(ToolError::failed(
                self.name(),
                format!("no results for \"{terms}\""),
            ));
        }
        let lines: Vec<String> = snippets.into_iter().map(|s| format!("- {s}")).collect();
        Ok(format!("DuckDuckGo-Suchergebnisse für \"{terms}\":\n\n{}", lines.join("\n")))
    }
}

fn format_instant_answer(answer: &InstantAnswer) -> String {
    let mut parts = Vec::new();
    if !answer.heading.is_empty() {
        parts.push(format!("# {}", answer.heading));
    }
    let abstract_text = if answer.abstract_.is_empty() {
        &answer.abstract_text
    } else {
        &answer.abstract_
    };
    if !abstract_text.is_empty() {
        parts.push(abstract_text.clone());
        if !answer.abstract_source.is_empty() {
            parts.push(format!("(Quelle: {}, {})", answer.abstract_source, answer.abstract_url));
        }
    }
    let direct = match &answer.answer {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    if !direct.is_empty() {
        parts.push(format!("Antwort: {direct}"));
    }
    parts.extend(
        answer
            .related_topics
            .iter()
            .take(MAX_RELATED)
            .filter(|t| !t.text.is_empty())
            .map(|t| format!("- {}", t.text)),
    );
    parts.join("\n\n")
}

/// Text of the `result__snippet` anchors in a DuckDuckGo HTML result page.
pub fn extract_snippets(html: &str, max: usize) -> Vec<String> {
    match SNIPPET.as_ref() {
        Some(selector) => select_text(html, selector, max),
        None => Vec::new(),
    }
}

#[async_trait]
impl Tool for DuckDuckGoTool {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn description(&self) -> String {
        match self.flavor {
            SearchFlavor::DuckDuckGo => "Durchsucht das Web über DuckDuckGo und liefert eine Kurzantwort. Gut für aktuelle Fakten, Definitionen, kurze Zusammenfassungen.",
            SearchFlavor::WebSearch => "Allgemeine Websuche (DuckDuckGo-basiert) für breite Recherchen.",
            SearchFlavor::StackOverflow => "Sucht relevante StackOverflow-Antworten (gut für Programmierfragen).",
        }
        .into()
    }

    fn param_hint(&self) -> String {
        match self.flavor {
            SearchFlavor::DuckDuckGo => "Suchbegriff (z.B. 'Hauptstadt von Frankreich')",
            SearchFlavor::WebSearch => "Suchbegriff (z.B. 'Wetter Berlin heute')",
            SearchFlavor::StackOverflow => "Suchbegriff (z.B. 'go http client timeout')",
        }
        .into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Lookup
    }

    fn source_name(&self, query: &str) -> String {
        format!("{}:{query}", self.flavor.prefix())
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let terms = self.search_terms(query);
        let mut text = self.instant_answer(&terms).await?;
        if text.trim().is_empty() {
            tracing::debug!(tool = self.name(), "No instant answer, trying HTML results");
            text = self.html_snippets(&terms).await?;
        }
        Ok(ToolOutput { source: self.source_name(query), text })
    }
}
