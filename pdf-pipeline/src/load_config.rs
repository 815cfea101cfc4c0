/// `load_config` module: reads the worker's static YAML file and injects secrets from the environment.
///
/// The YAML holds no credentials. The gateway access token comes from
/// `PDF_PIPELINE_ACCESS_TOKEN` (a `.env` file is honoured by `main`).
///
/// # Errors
/// All errors use `anyhow::Error` and mention whether reading or parsing failed.
use anyhow::Result;
use pdf_pipeline_core::config::Config;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Environment variable holding the bearer token for the queue/topic/storage gateways.
pub const ACCESS_TOKEN_ENV: &str = "PDF_PIPELINE_ACCESS_TOKEN";

#[derive(Debug)]
pub struct CliConfig {
    pub worker: Config,
    pub access_token: Option<String>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let worker: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let access_token = env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty());
    if access_token.is_none() {
        warn!(env = ACCESS_TOKEN_ENV, "No gateway access token set, requests are unauthenticated");
    }

    worker.trace_loaded();
    Ok(CliConfig {
        worker,
        access_token,
    })
}
