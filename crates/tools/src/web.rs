//! Shared HTTP client and HTML-to-text helpers for the lookup tools.

use scraper::{Html, Node, Selector};
use std::time::Duration;
use tinyrag_core::error::ToolError;

pub const USER_AGENT: &str = "tinyRAG/1.1";

/// Text shorter than this after stripping is treated as an empty page.
pub const MIN_PAGE_CHARS: usize = 50;

const SKIPPED_BLOCKS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// A plain HTTP response body with the bits the tools inspect.
pub struct Fetched {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Thin wrapper over `reqwest::Client` with the tool user agent and timeout.
#[derive(Clone)]
pub struct WebClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebClient {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::failed("http", e))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and read the whole body. Non-2xx statuses are returned, not raised.
    pub async fn get(&self, tool: &str, url: &str) -> Result<Fetched, ToolError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: tool.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ToolError::failed(tool, e)
            }
        })?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp.text().await.map_err(|e| ToolError::failed(tool, e))?;
        tracing::debug!(tool, url, status, bytes = body.len(), "Fetched");
        Ok(Fetched { status, content_type, body })
    }

    /// Fetch a page and reduce it to plain text.
    pub async fn fetch_page_text(&self, tool: &str, url: &str) -> Result<String, ToolError> {
        let page = self.get(tool, url).await?;
        if page.status != 200 {
            return Err(ToolError::failed(tool, format!("HTTP {} for {url}", page.status)));
        }
        let text = strip_html(&page.body);
        if text.chars().count() < MIN_PAGE_CHARS {
            return Err(ToolError::failed(
                tool,
                format!("page too short after stripping HTML ({} chars)", text.chars().count()),
            ));
        }
        Ok(text)
    }
}

/// Reduce an HTML document to readable text.
///
/// Text inside script, style and page-chrome blocks is dropped, element
/// boundaries become spaces and whitespace runs of three or more
/// characters become a single line break.
pub fn strip_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(e) => SKIPPED_BLOCKS.contains(&e.name()),
            _ => false,
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out).trim().to_string()
}

/// Text of every element matching `selector`, in document order.
pub fn select_text(html: &str, selector: &Selector, max: usize) -> Vec<String> {
    Html::parse_document(html)
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .take(max)
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            run.push(ch);
            continue;
        }
        flush_run(&mut out, &mut run);
        out.push(ch);
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.chars().count() >= 3 {
        out.push('\n');
    } else {
        out.push_str(run);
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_chrome() {
        let html = r#"<html><head><style>body{color:red}</style><script>alert("x<y")</script></head>
<body><NAV class="top"><a href="/">Home</a></NAV><h1>Mars</h1><p>The fourth planet &amp; red.</p>
<footer>© 2024</footer></body></html>"#;
        let text = strip_html(html);
        assert!(text.contains("Mars"));
        assert!(text.contains("The fourth planet & red."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("2024"));
    }

    #[test]
    fn long_whitespace_runs_become_line_breaks() {
        let text = strip_html("<p>one</p>\n\n<p>two words</p>");
        assert_eq!(text, "one\ntwo words");
    }

    #[test]
    fn header_prefix_does_not_match_other_tags() {
        let text = strip_html("<headline>kept</headline>");
        assert_eq!(text, "kept");
    }

    #[test]
    fn unterminated_block_drops_the_rest() {
        assert_eq!(strip_html("before <script>never closed"), "before");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(strip_html("<p>a &lt;b&gt; &#228; &#x41;</p>"), "a <b> ä A");
    }

    #[test]
    fn selects_matching_elements() {
        let selector = Selector::parse("p.hit").unwrap();
        let html = r#"<p class="hit">one</p><p>skip</p><p class="hit"> </p><p class="hit"><b>two</b></p>"#;
        assert_eq!(select_text(html, &selector, 10), vec!["one", "two"]);
        assert_eq!(select_text(html, &selector, 1), vec!["one"]);
    }
}
