//! User-registered URL template tools.

use async_trait::async_trait;
use tinyrag_config::{CustomApi, QUERY_PLACEHOLDER};
use tinyrag_core::error::ToolError;
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput};

use crate::web::WebClient;

/// Fetches `template` with the encoded query substituted for `$q` and
/// returns the page as plain text.
pub struct TemplateApiTool {
    web: WebClient,
    api: CustomApi,
}

impl TemplateApiTool {
    pub fn new(web: WebClient, api: CustomApi) -> Self {
        Self { web, api }
    }

    pub fn url_for(&self, query: &str) -> String {
        self.api
            .template
            .replace(QUERY_PLACEHOLDER, &urlencoding::encode(query))
    }
}

#[async_trait]
impl Tool for TemplateApiTool {
    fn name(&self) -> &str {
        &self.api.id
    }

    fn description(&self) -> String {
        if self.api.desc.is_empty() {
            format!("Custom API: {}", self.api.template)
        } else {
            self.api.desc.clone()
        }
    }

    fn param_hint(&self) -> String {
        "Suchbegriff (wird in $q eingesetzt)".into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Template
    }

    fn source_name(&self, query: &str) -> String {
        format!("api:{}:{query}", self.api.name)
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let url = self.url_for(query);
        let text = self.web.fetch_page_text(self.name(), &url).await?;
        Ok(ToolOutput { source: self.source_name(query), text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api(desc: &str) -> CustomApi {
        CustomApi {
            id: "api-1".into(),
            name: "Docs".into(),
            template: "https://docs.example.com/search?q=$q&lang=en".into(),
            desc: desc.into(),
        }
    }

    #[test]
    fn substitutes_encoded_query() {
        let tool = TemplateApiTool::new(WebClient::new(Duration::from_secs(1)).unwrap(), api(""));
        assert_eq!(
            tool.url_for("a b&c"),
            "https://docs.example.com/search?q=a%20b%26c&lang=en"
        );
    }

    #[test]
    fn catalog_entry() {
        let web = WebClient::new(Duration::from_secs(1)).unwrap();
        let plain = TemplateApiTool::new(web.clone(), api(""));
        assert_eq!(plain.name(), "api-1");
        assert_eq!(plain.description(), "Custom API: https://docs.example.com/search?q=$q&lang=en");
        assert_eq!(plain.source_name("tokio"), "api:Docs:tokio");

        let described = TemplateApiTool::new(web, api("Project docs"));
        assert_eq!(described.description(), "Project docs");
    }
}
