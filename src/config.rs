use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::news::{country_code, MAX_PAGE_SIZE};
use crate::scheduler::{Job, JobTarget, Schedule};

pub const API_KEY_VAR: &str = "NEWS_API_KEY";
pub const DB_HOST_VAR: &str = "DB_HOST";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Articles requested per call, at most 100.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection attempts before giving up; 0 retries forever.
    #[serde(default = "default_connect_retries")]
    pub db_connect_retries: u32,

    /// Language filter for the domain-scoped search.
    #[serde(default = "default_global_language")]
    pub global_language: String,

    #[serde(default = "default_jobs")]
    pub jobs: Vec<Job>,
}

fn default_api_base_url() -> String {
    "https://newsapi.org/v2/".to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_retries() -> u32 {
    10
}

fn default_global_language() -> String {
    "en".to_string()
}

// Three runs a day, jobs staggered five minutes apart.
fn default_jobs() -> Vec<Job> {
    let hours = [9, 12, 15];
    vec![
        Job {
            name: "italy".to_string(),
            times: Schedule::at_minute_past(10, &hours),
            target: JobTarget::Country {
                country: "Italy".to_string(),
                language: "Italian".to_string(),
                query: None,
            },
        },
        Job {
            name: "australia".to_string(),
            times: Schedule::at_minute_past(15, &hours),
            target: JobTarget::Country {
                country: "Australia".to_string(),
                language: "English".to_string(),
                query: None,
            },
        },
        Job {
            name: "global".to_string(),
            times: Schedule::at_minute_past(20, &hours),
            target: JobTarget::Favourites,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout(),
            db_connect_retries: default_connect_retries(),
            global_language: default_global_language(),
            jobs: default_jobs(),
        }
    }
}

impl Config {
    /// Loads the config file, writing the defaults there on first run.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("news-collector")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::config("request_timeout_secs must be positive"));
        }

        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(AppError::config(format!("duplicate job name '{}'", job.name)));
            }
            if job.times.is_empty() {
                return Err(AppError::config(format!("job '{}' has no times", job.name)));
            }
            match &job.target {
                JobTarget::Country { country, .. } if country_code(country).is_none() => {
                    return Err(AppError::config(format!(
                        "job '{}' names unknown country '{country}'",
                        job.name
                    )));
                }
                JobTarget::Domain { domain } if domain.trim().is_empty() => {
                    return Err(AppError::config(format!("job '{}' has an empty domain", job.name)));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Unwraps a value that has to come from the environment.
pub fn require_env(value: Option<String>, var: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::config(format!("{var} is not set in ENV")))
}
