//! ============================================================================
//! Corpus Ingestion - Paginated fetch from the message API with a file cache
//! ============================================================================
//! Messages come from an upstream paginated endpoint (`?skip=&limit=`).
//! A JSON cache file avoids re-fetching the whole corpus on every start;
//! `force_refresh` bypasses it.
//! ============================================================================

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::Message;

/// Items fetched per page
const PAGE_SIZE: usize = 100;

/// One message as the upstream API serves it
#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: Uuid,
    user_id: String,
    user_name: String,
    timestamp: DateTime<Utc>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    items: Vec<ApiMessage>,
}

impl From<ApiMessage> for Message {
    fn from(api: ApiMessage) -> Self {
        Message {
            id: api.id,
            member_id: api.user_id,
            member_name: api.user_name,
            timestamp: api.timestamp,
            text: api.message,
        }
    }
}

/// Fetch the full message corpus, page by page.
///
/// Stops at the first short page; a 403 (page/permission limit on the
/// public endpoint) stops early with whatever was fetched so far.
pub async fn fetch_messages(base_url: &str) -> Result<Vec<Message>> {
    let client = Client::new();
    let mut all: Vec<Message> = Vec::new();
    let mut skip = 0usize;

    info!("Fetching messages from {}", base_url);

    loop {
        let url = format!("{}/?skip={}&limit={}", base_url.trim_end_matches('/'), skip, PAGE_SIZE);
        let response = client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("Hit API page/permission limit at skip={}, stopping early", skip);
            break;
        }
        if !response.status().is_success() {
            return Err(anyhow!("Message API error ({}) at {}", response.status(), url));
        }

        let page: ApiPage = response
            .json()
            .await
            .with_context(|| format!("Failed to parse page at skip={}", skip))?;

        let count = page.items.len();
        all.extend(page.items.into_iter().map(Message::from));
        info!("Fetched {} items (total so far: {})", count, all.len());

        if count < PAGE_SIZE {
            break;
        }
        skip += PAGE_SIZE;
    }

    info!("Fetch complete: {} messages", all.len());
    Ok(all)
}

/// Load messages from the cache file, or fetch and cache them.
pub async fn load_messages(
    base_url: &str,
    cache_path: &Path,
    force_refresh: bool,
) -> Result<Vec<Message>> {
    if !force_refresh && cache_path.exists() {
        let raw = std::fs::read_to_string(cache_path)
            .with_context(|| format!("Failed to read cache {}", cache_path.display()))?;
        let messages: Vec<Message> =
            serde_json::from_str(&raw).context("Failed to parse message cache")?;
        info!(
            "Loaded {} messages from cache {}",
            messages.len(),
            cache_path.display()
        );
        return Ok(messages);
    }

    let messages = fetch_messages(base_url).await?;

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
    }
    std::fs::write(cache_path, serde_json::to_string(&messages)?)
        .with_context(|| format!("Failed to write cache {}", cache_path.display()))?;
    info!(
        "Fetched {} messages and cached to {}",
        messages.len(),
        cache_path.display()
    );

    Ok(messages)
}
