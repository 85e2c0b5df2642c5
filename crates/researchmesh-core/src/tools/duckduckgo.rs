//! Web search over DuckDuckGo's HTML endpoint (no API key required).

use std::borrow::Cow;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::{ToolDefinition, ToolError, Toolkit, http_client, optional_usize, required_str, to_json};
use crate::config::ToolsConfig;

const MAX_RESULTS_CAP: usize = 10;

static TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a").expect("invalid title selector"));
static SNIPPET_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__snippet").expect("invalid snippet selector"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
    pub body: String,
}

pub struct DuckDuckGoTools {
    client: reqwest::Client,
    endpoint: String,
    default_max_results: usize,
}

impl DuckDuckGoTools {
    pub const NAME: &'static str = "duckduckgo";

    /// Functions advertised to the model; needs no client.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "duckduckgo_search",
            "Search the web with DuckDuckGo. Returns titles, URLs and snippets.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results (1-10, default 5)"
                    }
                },
                "required": ["query"]
            }),
        )]
    }

    pub fn new(config: &ToolsConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(config)?,
            endpoint: config.duckduckgo_url.clone(),
            default_max_results: config.default_max_results.clamp(1, MAX_RESULTS_CAP),
        })
    }

    #[instrument(name = "tool.duckduckgo.search", skip(self))]
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        // POST avoids the CAPTCHA served to GET requests with non-ASCII queries.
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query), ("kl", "wt-wt")])
            .header("Referer", "https://html.duckduckgo.com/")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::Status {
                url: self.endpoint.clone(),
                status: response.status().as_u16(),
            });
        }

        let html = response.text().await?;
        debug!(html_len = html.len(), "search page received");

        if html.contains("anomaly-modal") {
            warn!("DuckDuckGo served a CAPTCHA page");
            return Err(ToolError::Upstream(
                "DuckDuckGo CAPTCHA triggered; search temporarily blocked".into(),
            ));
        }

        Ok(parse_results(&html, max_results))
    }
}

#[async_trait]
impl Toolkit for DuckDuckGoTools {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        Self::definitions()
    }

    async fn invoke(&self, function: &str, arguments: Value) -> Result<String, ToolError> {
        match function {
            "duckduckgo_search" => {
                let query = required_str(&arguments, "query")?;
                let max_results = optional_usize(&arguments, "max_results")
                    .unwrap_or(self.default_max_results)
                    .clamp(1, MAX_RESULTS_CAP);
                to_json(&self.search(query, max_results).await?)
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let snippets: Vec<String> = document
        .select(&SNIPPET_SEL)
        .map(|snippet| normalize_space(&snippet.text().collect::<String>()))
        .collect();

    document
        .select(&TITLE_SEL)
        .enumerate()
        .map(|(index, link)| SearchHit {
            title: normalize_space(&link.text().collect::<String>()),
            href: real_url(link.value().attr("href").unwrap_or_default()),
            body: snippets.get(index).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.href.is_empty() && !hit.title.is_empty())
        .take(max_results)
        .collect()
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Result links are wrapped in a redirect: `//duckduckgo.com/l/?uddg=REAL_URL&...`.
fn real_url(raw: &str) -> String {
    let Some(pos) = raw.find("uddg=") else {
        return raw.to_string();
    };
    let rest = &raw[pos + 5..];
    let encoded = &rest[..rest.find('&').unwrap_or(rest.len())];
    urlencoding::decode(encoded)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| encoded.to_string())
}
