use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, instrument};

static HISTORY_FILE: &str = "history.json";

/// 作品地址的稳定标识
pub fn title_id(manga_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manga_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[allow(async_fn_in_trait)]
pub trait HistoryStore {
    async fn record(&self, title_id: &str, chapters: &[String]) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub chapters: Vec<String>,
    pub updated_at: String,
}

pub struct JsonHistory {
    path: PathBuf,
}

impl JsonHistory {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: base_dir.into().join(HISTORY_FILE),
        }
    }

    pub async fn load(&self) -> Result<HashMap<String, HistoryEntry>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("历史记录 {} 解析失败: {}", self.path.display(), e))
    }
}

impl HistoryStore for JsonHistory {
    #[instrument(skip_all)]
    async fn record(&self, title_id: &str, chapters: &[String]) -> Result<()> {
        let mut history = self.load().await?;
        let entry = history.entry(title_id.to_string()).or_default();
        for chapter in chapters {
            if !entry.chapters.contains(chapter) {
                entry.chapters.push(chapter.clone());
            }
        }
        entry.updated_at = chrono::Local::now().to_rfc3339();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&history)?).await?;
        info!("已记录 {} 章到历史", chapters.len());
        Ok(())
    }
}
