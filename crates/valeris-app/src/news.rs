// Market news client.
//
// Feeds differ in envelope and field names, so the body is read as loose
// JSON and normalised into `Article`s.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use valeris_core::config::Config;

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news feed URL is not configured")]
    NotConfigured,

    #[error("news request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("news feed returned HTTP {0}")]
    Status(u16),

    #[error("news feed returned an unexpected body: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
}

pub struct NewsClient {
    http: reqwest::Client,
    feed_url: String,
    api_key: Option<String>,
    max_articles: usize,
}

impl NewsClient {
    pub fn new(feed_url: String, api_key: Option<String>, max_articles: usize) -> Self {
        NewsClient {
            http: reqwest::Client::new(),
            feed_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_articles,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        NewsClient::new(
            config.news.feed_url.clone(),
            config.credentials.news_api_key.clone(),
            config.news.max_articles,
        )
    }

    /// Fetch articles matching `query` (all recent articles when empty).
    pub async fn fetch(&self, query: &str) -> Result<Vec<Article>, NewsError> {
        if self.feed_url.trim().is_empty() {
            return Err(NewsError::NotConfigured);
        }

        let mut request = self.http.get(&self.feed_url);
        let query = query.trim();
        if !query.is_empty() {
            request = request.query(&[("q", query)]);
        }
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("News feed returned HTTP {}", status);
            return Err(NewsError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| NewsError::Parse(e.to_string()))?;
        let articles = normalize(&body, self.max_articles)?;
        debug!("Fetched {} news articles for query {:?}", articles.len(), query);
        Ok(articles)
    }
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Read the `articles` (or `data`) array, drop entries without a title or
/// URL, keep the first occurrence of each URL, and return the newest
/// `max` articles. Undated articles sort last.
pub fn normalize(body: &Value, max: usize) -> Result<Vec<Article>, NewsError> {
    let items = body
        .get("articles")
        .or_else(|| body.get("data"))
        .and_then(Value::as_array)
        .ok_or_else(|| NewsError::Parse("no `articles` or `data` array".to_string()))?;

    let mut seen = HashSet::new();
    let mut articles: Vec<Article> = items
        .iter()
        .filter_map(parse_article)
        .filter(|a| seen.insert(a.url.clone()))
        .collect();

    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles.truncate(max);
    Ok(articles)
}

/// First non-blank string among `keys`.
fn text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_article(item: &Value) -> Option<Article> {
    let title = text(item, &["title", "headline"])?;
    let url = text(item, &["url", "link"])?;

    // Either a plain string or `{ "name": ... }`.
    let source = match item.get("source") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(obj @ Value::Object(_)) => obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    let published_at = text(item, &["published_at", "publishedAt", "date"])
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc));

    Some(Article {
        title,
        source,
        url,
        published_at,
        summary: text(item, &["summary", "description"]).unwrap_or_default(),
    })
}
