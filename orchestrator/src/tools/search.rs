use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{recover, unavailable, ToolOutput, WebSearch};
use crate::error::PlanError;

const TOOL: &str = "web_search";
const SERPER_URL: &str = "https://google.serper.dev/search";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

pub struct MockSearch;

impl MockSearch {
    fn hits(query: &str) -> Vec<SearchHit> {
        ["Top attractions", "Local food guide", "Neighbourhoods to stay in"]
            .iter()
            .enumerate()
            .map(|(i, topic)| SearchHit {
                title: format!("{topic}: {query}"),
                link: format!("https://example.com/sample/{}", i + 1),
                snippet: "Sample result, no live search was performed.".into(),
            })
            .collect()
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str) -> ToolOutput<Vec<SearchHit>> {
        ToolOutput::mock(TOOL, Self::hits(query))
    }
}

pub struct SerperSearch {
    http: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

impl SerperSearch {
    pub fn new(http: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            http,
            api_key,
            timeout,
        }
    }

    async fn fetch(&self, query: &str) -> Result<Vec<SearchHit>, PlanError> {
        let resp = self
            .http
            .post(SERPER_URL)
            .timeout(self.timeout)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": 5 }))
            .send()
            .await
            .map_err(|e| unavailable(TOOL, e))?;

        if !resp.status().is_success() {
            return Err(unavailable(TOOL, format!("HTTP {}", resp.status())));
        }
        let body: SerperResponse = resp.json().await.map_err(|e| unavailable(TOOL, e))?;
        if body.organic.is_empty() {
            return Err(unavailable(TOOL, "no results"));
        }
        Ok(body.organic.into_iter().take(5).collect())
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    async fn search(&self, query: &str) -> ToolOutput<Vec<SearchHit>> {
        recover(TOOL, self.fetch(query).await, || MockSearch::hits(query))
    }
}
