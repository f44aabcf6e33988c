//! Lookup tools against an in-process HTTP server.

use axum::{
    Json, Router,
    extract::Query,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tinyrag_config::CustomApi;
use tinyrag_core::{Tool, ToolError};
use tinyrag_tools::{DuckDuckGoTool, SearchFlavor, TemplateApiTool, WebClient, WikipediaTool, WiktionaryTool};

async fn wiki(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let title = params.get("titles").cloned().unwrap_or_default();
    let pages = match title.as_str() {
        "Mars" => json!({"123": {"title": "Mars", "extract": "Mars ist der vierte Planet."}}),
        _ => json!({"-1": {"title": title, "missing": ""}}),
    };
    Json(json!({"query": {"pages": pages}}))
}

async fn ddg_api(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    match params.get("q").map(String::as_str) {
        Some("Rust") => Json(json!({
            "Heading": "Rust",
            "AbstractText": "A systems language.",
            "RelatedTopics": []
        })),
        _ => Json(json!({"Heading": "", "AbstractText": "", "RelatedTopics": []})),
    }
}

async fn ddg_html(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let q = params.get("q").cloned().unwrap_or_default();
    let body = format!(r#"<html><a class="result__snippet" href="/1">Answer about {q}</a></html>"#);
    ([(header::CONTENT_TYPE, "text/html")], body)
}

async fn docs(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    match params.get("q").map(String::as_str) {
        Some("short") => (StatusCode::OK, "<p>tiny</p>".to_string()),
        Some("gone") => (StatusCode::NOT_FOUND, "missing".to_string()),
        Some(q) => (
            StatusCode::OK,
            format!(
                "<html><script>ignored()</script><body><h1>Docs</h1><p>Result for {q}: a sufficiently long paragraph of documentation text.</p></body></html>"
            ),
        ),
        None => (StatusCode::BAD_REQUEST, String::new()),
    }
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/w/api.php", get(wiki))
        .route("/ddg/", get(ddg_api))
        .route("/html/", get(ddg_html))
        .route("/docs", get(docs));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn web() -> WebClient {
    WebClient::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn wikipedia_returns_extract() {
    let base = spawn_server().await;
    let tool = WikipediaTool::with_endpoint(web(), format!("{base}/w/api.php"));

    let out = tool.execute("Mars").await.unwrap();
    assert_eq!(out.source, "wiki:Mars");
    assert_eq!(out.text, "Mars ist der vierte Planet.");

    let err = tool.execute("Nowhere").await.unwrap_err();
    assert!(err.to_string().contains("no content"), "{err}");
}

#[tokio::test]
async fn wiktionary_prefixes_title() {
    let base = spawn_server().await;
    let tool = WiktionaryTool::with_endpoint(web(), format!("{base}/w/api.php"));
    let out = tool.execute("Mars").await.unwrap();
    assert_eq!(out.source, "wikt:Mars");
    assert!(out.text.starts_with("Wiktionary: Mars\n\n"));
}

#[tokio::test]
async fn duckduckgo_instant_answer_then_html_fallback() {
    let base = spawn_server().await;
    let tool = DuckDuckGoTool::with_endpoints(
        web(),
        SearchFlavor::DuckDuckGo,
        format!("{base}/ddg/"),
        format!("{base}/html/"),
    );

    let direct = tool.execute("Rust").await.unwrap();
    assert_eq!(direct.text, "# Rust\n\nA systems language.");
    assert_eq!(direct.source, "ddg:Rust");

    let fallback = tool.execute("tokio select").await.unwrap();
    assert_eq!(
        fallback.text,
        "DuckDuckGo-Suchergebnisse für \"tokio select\":\n\n- Answer about tokio select"
    );
}

#[tokio::test]
async fn stackoverflow_restricts_site() {
    let base = spawn_server().await;
    let tool = DuckDuckGoTool::with_endpoints(
        web(),
        SearchFlavor::StackOverflow,
        format!("{base}/ddg/"),
        format!("{base}/html/"),
    );
    let out = tool.execute("borrow checker").await.unwrap();
    assert!(out.text.contains("site:stackoverflow.com borrow checker"));
    assert_eq!(out.source, "so:borrow checker");
}

#[tokio::test]
async fn template_api_fetches_and_strips() {
    let base = spawn_server().await;
    let tool = TemplateApiTool::new(
        web(),
        CustomApi {
            id: "api-7".into(),
            name: "Docs".into(),
            template: format!("{base}/docs?q=$q"),
            desc: String::new(),
        },
    );

    let out = tool.execute("axum router").await.unwrap();
    assert_eq!(out.source, "api:Docs:axum router");
    assert!(out.text.contains("Result for axum router"));
    assert!(!out.text.contains("ignored()"));

    let short = tool.execute("short").await.unwrap_err();
    assert!(short.to_string().contains("page too short"));

    let gone = tool.execute("gone").await.unwrap_err();
    assert!(matches!(gone, ToolError::ExecutionFailed { ref reason, .. } if reason.starts_with("HTTP 404")));
}
