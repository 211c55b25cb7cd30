use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{Config, Environment, File};
use dirs_next::config_dir;
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";
const ENV_PREFIX: &str = "MEDIASRC";

/// Runtime settings. Read-only: nothing here is ever written back to disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Upper bound on concurrent hoster lookups per video list.
    pub concurrency: usize,
    /// Per-source preferences keyed by lowercase source name.
    pub sources: HashMap<String, SourcePrefs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcePrefs {
    pub preferred_quality: Option<String>,
    pub preferred_server: Option<String>,
    pub preferred_scanlator: Option<String>,
    pub base_url: Option<String>,
    pub translation: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            concurrency: 4,
            sources: HashMap::new(),
        }
    }
}

impl Settings {
    /// Layers defaults, the config file and `MEDIASRC__*` environment variables.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("timeout_secs", 30_i64)?
            .set_default("concurrency", 4_i64)?;

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(default) = default_config_path() {
                    builder = builder.add_source(File::from(default).required(false));
                }
            }
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings.normalized())
    }

    pub fn source(&self, name: &str) -> SourcePrefs {
        self.sources
            .get(&source_key(name))
            .cloned()
            .unwrap_or_default()
    }

    fn normalized(mut self) -> Self {
        if self.concurrency == 0 {
            self.concurrency = 1;
        }
        self.sources = self
            .sources
            .into_iter()
            .map(|(name, prefs)| (source_key(&name), prefs))
            .collect();
        self
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("mediasrc").join("config.toml"))
}

fn source_key(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "")
}
