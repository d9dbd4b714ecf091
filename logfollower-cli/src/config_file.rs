use std::collections::BTreeSet;
use std::time::Duration;

use logfollower_base::Error;
use logfollower_core::FollowerConfig;
use logfollower_model::{RestrictMode, RestrictPolicy, Tick};
use serde::Deserialize;

/// The on-disk shape of a follower's TOML config file, mirroring
/// [`FollowerConfig`] one field at a time. Every field is optional so
/// a config file only needs to set what it wants to override from
/// [`FollowerConfig::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub chunk_size: Option<u64>,
    pub initial_tick: Option<u64>,
    pub use_tick: Option<bool>,
    pub include_system: Option<bool>,
    pub restrict_type: Option<String>,
    pub restrict_collections: Option<BTreeSet<String>>,
    pub require_from_present: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_connect_retries: Option<u32>,
    pub checkpoint_interval_secs: Option<u64>,
    pub checkpoint_commit_interval: Option<u64>,
    pub max_backoff_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<FileConfig, Error> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: FileConfig = toml::from_str(&raw)?;
        Ok(parsed)
    }

    fn restrict_policy(&self) -> Result<RestrictPolicy, Error> {
        let mode = match self.restrict_type.as_deref() {
            None | Some("None") => RestrictMode::None,
            Some("Include") => RestrictMode::Include,
            Some("Exclude") => RestrictMode::Exclude,
            Some(other) => {
                return Err(logfollower_base::err(format!(
                    "restrictType must be one of None/Include/Exclude, got `{other}`"
                )))
            }
        };
        Ok(RestrictPolicy {
            mode,
            collections: self.restrict_collections.clone().unwrap_or_default(),
            include_system: self.include_system.unwrap_or(false),
        })
    }

    /// Merges this file's options over [`FollowerConfig::default`].
    /// Validation of the merged result is left to
    /// `FollowerConfig::validate`, called once `Follower::new` runs.
    pub fn into_follower_config(self) -> Result<FollowerConfig, Error> {
        let restrict = self.restrict_policy()?;
        let defaults = FollowerConfig::default();
        Ok(FollowerConfig {
            endpoint: self.endpoint.unwrap_or(defaults.endpoint),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            initial_tick: self.initial_tick.map(Tick),
            use_tick: self.use_tick.unwrap_or(defaults.use_tick),
            restrict,
            require_from_present: self
                .require_from_present
                .unwrap_or(defaults.require_from_present),
            verbose: defaults.verbose,
            connect_timeout: self
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_connect_retries: self
                .max_connect_retries
                .unwrap_or(defaults.max_connect_retries),
            checkpoint_interval: self
                .checkpoint_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.checkpoint_interval),
            checkpoint_commit_interval: self
                .checkpoint_commit_interval
                .unwrap_or(defaults.checkpoint_commit_interval),
            max_backoff: self
                .max_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_backoff),
        })
    }
}
