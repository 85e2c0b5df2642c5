use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{ToolDefinition, ToolError, Toolkit, http_client, optional_usize, required_str, to_json};
use crate::config::ToolsConfig;

const DEFAULT_NUM_STORIES: usize = 10;
const MAX_NUM_STORIES: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: u64,
    #[serde(default, rename(deserialize = "by"))]
    pub username: Option<String>,
    #[serde(default)]
    pub time: u64,
    #[serde(default)]
    pub descendants: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HackerNewsUser {
    pub id: String,
    pub karma: i64,
    pub about: Option<String>,
    pub total_items_submitted: usize,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    karma: i64,
    about: Option<String>,
    #[serde(default)]
    submitted: Vec<u64>,
}

/// HackerNews story and user lookups via the public Firebase API.
pub struct HackerNewsTools {
    client: reqwest::Client,
    base_url: String,
}

impl HackerNewsTools {
    pub const NAME: &'static str = "hackernews";

    /// Functions advertised to the model; needs no client.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "get_top_hackernews_stories",
                "Get the current top stories from HackerNews with title, url, score and author.",
                json!({
                    "type": "object",
                    "properties": {
                        "num_stories": {
                            "type": "integer",
                            "description": "Number of stories to return (default 10, max 30)"
                        }
                    }
                }),
            ),
            ToolDefinition::new(
                "get_user_details",
                "Get karma, bio and submission count for a HackerNews user.",
                json!({
                    "type": "object",
                    "properties": {
                        "username": {
                            "type": "string",
                            "description": "HackerNews username"
                        }
                    },
                    "required": ["username"]
                }),
            ),
        ]
    }

    pub fn new(config: &ToolsConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.hackernews_base_url.trim_end_matches('/').to_string(),
        })
    }

    #[instrument(name = "tool.hackernews.top_stories", skip(self))]
    pub async fn top_stories(&self, num_stories: usize) -> Result<Vec<Story>, ToolError> {
        let ids: Vec<u64> = self.get_json("topstories.json".to_string()).await?;
        let wanted: Vec<u64> = ids.into_iter().take(num_stories).collect();
        debug!(requested = num_stories, fetching = wanted.len(), "fetching story details");

        let stories = try_join_all(
            wanted
                .iter()
                .map(|id| self.get_json::<Option<Story>>(format!("item/{id}.json"))),
        )
        .await?;

        Ok(stories.into_iter().flatten().collect())
    }

    #[instrument(name = "tool.hackernews.user", skip(self))]
    pub async fn user_details(&self, username: &str) -> Result<HackerNewsUser, ToolError> {
        if !is_valid_username(username) {
            return Err(ToolError::InvalidArguments(format!(
                "`{username}` is not a HackerNews username"
            )));
        }
        let raw: Option<RawUser> = self.get_json(format!("user/{username}.json")).await?;
        let raw = raw.ok_or_else(|| {
            ToolError::InvalidArguments(format!("HackerNews user `{username}` does not exist"))
        })?;

        Ok(HackerNewsUser {
            id: raw.id,
            karma: raw.karma,
            about: raw.about,
            total_items_submitted: raw.submitted.len(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: String,
    ) -> Result<T, ToolError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ToolError::Upstream(format!("{url}: {err}")))
    }
}

/// HackerNews ids are ASCII letters, digits, `-` and `_`.
fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 64
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl Toolkit for HackerNewsTools {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        Self::definitions()
    }

    async fn invoke(&self, function: &str, arguments: Value) -> Result<String, ToolError> {
        match function {
            "get_top_hackernews_stories" => {
                let num_stories = optional_usize(&arguments, "num_stories")
                    .unwrap_or(DEFAULT_NUM_STORIES)
                    .clamp(1, MAX_NUM_STORIES);
                to_json(&self.top_stories(num_stories).await?)
            }
            "get_user_details" => {
                let username = required_str(&arguments, "username")?;
                to_json(&self.user_details(username).await?)
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn tools_for(server: &MockServer) -> HackerNewsTools {
        let config = ToolsConfig {
            hackernews_base_url: server.uri(),
            ..ToolsConfig::default()
        };
        HackerNewsTools::new(&config).expect("client")
    }

    #[tokio::test]
    async fn top_stories_are_fetched_in_rank_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([11, 22, 33])))
            .mount(&server)
            .await;
        for (id, title) in [(11, "Rust 2024"), (22, "Show HN: ResearchMesh")] {
            Mock::given(method("GET"))
                .and(path(format!("/item/{id}.json")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": id,
                    "title": title,
                    "url": format!("https://example.com/{id}"),
                    "score": 100,
                    "by": "pg",
                    "time": 1_700_000_000u64,
                    "descendants": 4,
                    "type": "story"
                })))
                .mount(&server)
                .await;
        }

        let tools = tools_for(&server).await;
        let output = tools
            .invoke("get_top_hackernews_stories", json!({"num_stories": 2}))
            .await
            .expect("stories");
        let stories: Vec<Value> = serde_json::from_str(&output).expect("json");

        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0]["title"], "Rust 2024");
        assert_eq!(stories[1]["username"], "pg");
    }

    #[tokio::test]
    async fn user_details_counts_submissions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/dang.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "dang",
                "karma": 42,
                "about": "moderator",
                "submitted": [1, 2, 3]
            })))
            .mount(&server)
            .await;

        let user = tools_for(&server)
            .await
            .user_details("dang")
            .await
            .expect("user");
        assert_eq!(user.total_items_submitted, 3);
        assert_eq!(user.karma, 42);
    }

    #[tokio::test]
    async fn path_like_usernames_are_rejected_before_any_request() {
        let server = MockServer::start().await;
        let tools = tools_for(&server).await;

        for username in ["../topstories", "dang?print=pretty", "a b"] {
            let err = tools
                .invoke("get_user_details", json!({"username": username}))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{username}");
            assert!(err.is_recoverable());
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
        assert!(is_valid_username("some_user-1"));
    }

    #[tokio::test]
    async fn upstream_failure_is_not_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topstories.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = tools_for(&server)
            .await
            .invoke("get_top_hackernews_stories", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Status { status: 503, .. }));
        assert!(!err.is_recoverable());
    }
}
