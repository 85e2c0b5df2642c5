//! Article fetching and readable-text extraction.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{ToolDefinition, ToolError, Toolkit, http_client, required_str, to_json};
use crate::config::ToolsConfig;

/// Elements whose text never belongs to the article body.
const NOISE_TAGS: [&str; 9] = [
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid article selector")
}

static TITLE_SEL: Lazy<Selector> = Lazy::new(|| selector("title"));
static META_SEL: Lazy<Selector> = Lazy::new(|| selector("meta[content]"));
static TIME_SEL: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static ARTICLE_SEL: Lazy<Selector> = Lazy::new(|| selector("article"));
static BODY_SEL: Lazy<Selector> = Lazy::new(|| selector("body"));
static PARAGRAPH_SEL: Lazy<Selector> = Lazy::new(|| selector("p"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub url: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publish_date: Option<String>,
    pub text: String,
}

/// Reads a web page and returns its main text.
pub struct ArticleReaderTools {
    client: reqwest::Client,
    max_chars: usize,
}

impl ArticleReaderTools {
    pub const NAME: &'static str = "article_reader";

    /// Functions advertised to the model; needs no client.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "read_article",
            "Fetch an article by URL and return its title, authors, publish date and main text.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Absolute http(s) URL of the article"
                    }
                },
                "required": ["url"]
            }),
        )]
    }

    pub fn new(config: &ToolsConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(config)?,
            max_chars: config.article_max_chars,
        })
    }

    #[instrument(name = "tool.article.read", skip(self))]
    pub async fn read(&self, url: &str) -> Result<Article, ToolError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!(
                "`{url}` is not an http(s) URL"
            )));
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let html = response.text().await?;
        let article = extract_article(url, &html, self.max_chars);
        debug!(chars = article.text.len(), title = ?article.title, "article extracted");
        Ok(article)
    }
}

#[async_trait]
impl Toolkit for ArticleReaderTools {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        Self::definitions()
    }

    async fn invoke(&self, function: &str, arguments: Value) -> Result<String, ToolError> {
        match function {
            "read_article" => {
                let url = required_str(&arguments, "url")?;
                to_json(&self.read(url).await?)
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

pub fn extract_article(url: &str, html: &str, max_chars: usize) -> Article {
    let document = Html::parse_document(html);
    let metas = collect_meta(&document);
    let meta = |key: &str| {
        metas
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, content)| content.clone())
    };

    let title = meta("og:title").or_else(|| {
        document
            .select(&TITLE_SEL)
            .next()
            .map(|title| normalize_space(&title.text().collect::<String>()))
            .filter(|title| !title.is_empty())
    });

    let mut authors: Vec<String> = Vec::new();
    for (name, content) in &metas {
        if (name == "author" || name == "article:author")
            && !content.starts_with("http")
            && !authors.contains(content)
        {
            authors.push(content.clone());
        }
    }

    let publish_date = meta("article:published_time")
        .or_else(|| meta("date"))
        .or_else(|| {
            document
                .select(&TIME_SEL)
                .find_map(|time| time.value().attr("datetime"))
                .map(|datetime| datetime.trim().to_string())
        });

    let scope = document
        .select(&ARTICLE_SEL)
        .next()
        .or_else(|| document.select(&BODY_SEL).next())
        .unwrap_or_else(|| document.root_element());

    let paragraphs: Vec<String> = scope
        .select(&PARAGRAPH_SEL)
        .map(visible_text)
        .filter(|paragraph| !paragraph.is_empty())
        .collect();

    let text = if paragraphs.is_empty() {
        visible_text(scope)
    } else {
        paragraphs.join("\n\n")
    };

    Article {
        url: url.to_string(),
        title,
        authors,
        publish_date,
        text: truncate_chars(&text, max_chars),
    }
}

/// `(property-or-name, content)` pairs of every `<meta>` tag, names lowercased.
fn collect_meta(document: &Html) -> Vec<(String, String)> {
    document
        .select(&META_SEL)
        .filter_map(|tag| {
            let element = tag.value();
            let key = element.attr("property").or_else(|| element.attr("name"))?;
            let content = element.attr("content")?.trim();
            (!content.is_empty()).then(|| (key.to_ascii_lowercase(), content.to_string()))
        })
        .collect()
}

/// Text of `element` with navigation, chrome and script content left out.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|parent| NOISE_TAGS.contains(&parent.value().name()));
        if !hidden {
            text.push_str(fragment);
        }
    }
    normalize_space(&text)
}

fn normalize_space(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((cut, _)) => input[..cut].to_string(),
        None => input.to_string(),
    }
}
