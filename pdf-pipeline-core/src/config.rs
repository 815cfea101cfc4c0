use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Default tag used on completion messages whose job carried none.
pub const DEFAULT_TAG: &str = "pdf_processed";

/// Full worker configuration as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub queue: QueueConfig,
    #[serde(default)]
    pub topic: Option<TopicConfig>,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub temp: TempDirs,
    #[serde(default)]
    pub notice: NoticeConfig,
    #[serde(default)]
    pub service: ServiceSettings,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            queue = %self.queue.queue_name,
            topic = self.topic.as_ref().map(|t| t.topic_name.as_str()).unwrap_or("<none>"),
            bucket = %self.storage.bucket_name,
            webhook = self.notice.hook_url.is_some(),
            wait_seconds = self.service.wait_seconds,
            max_runtime_seconds = self.service.max_runtime_seconds,
            heartbeat_period_seconds = self.service.heartbeat_period_seconds,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub endpoint: String,
    pub queue_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub topic_name: String,
    /// Tag substituted when a job has none.
    #[serde(default = "default_tag")]
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub endpoint: String,
    /// Per-request timeout for classify/parse calls. Conversions can be slow.
    #[serde(default = "default_engine_timeout")]
    pub timeout_seconds: u64,
}

/// Local working directories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TempDirs {
    pub pdf_dir: PathBuf,
    pub image_dir: PathBuf,
    pub markdown_dir: PathBuf,
}

impl TempDirs {
    pub fn all(&self) -> [&PathBuf; 3] {
        [&self.pdf_dir, &self.image_dir, &self.markdown_dir]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoticeConfig {
    #[serde(default, alias = "corp_wechat_hook_url")]
    pub hook_url: Option<String>,
}

/// Service loop timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSettings {
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,
    #[serde(default = "default_max_runtime_seconds")]
    pub max_runtime_seconds: u64,
    #[serde(default = "default_heartbeat_period_seconds")]
    pub heartbeat_period_seconds: u64,
    #[serde(default = "default_download_timeout_seconds")]
    pub download_timeout_seconds: u64,
    /// Remove local artifacts after a job succeeds.
    #[serde(default = "default_true")]
    pub cleanup_local: bool,
}

impl ServiceSettings {
    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_seconds)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_period_seconds)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            wait_seconds: default_wait_seconds(),
            max_runtime_seconds: default_max_runtime_seconds(),
            heartbeat_period_seconds: default_heartbeat_period_seconds(),
            download_timeout_seconds: default_download_timeout_seconds(),
            cleanup_local: true,
        }
    }
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_engine_timeout() -> u64 {
    1800
}

fn default_wait_seconds() -> u64 {
    30
}

fn default_max_runtime_seconds() -> u64 {
    6 * 3600
}

fn default_heartbeat_period_seconds() -> u64 {
    300
}

fn default_download_timeout_seconds() -> u64 {
    120
}

fn default_true() -> bool {
    true
}
