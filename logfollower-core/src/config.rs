use std::time::Duration;

use logfollower_model::{RestrictMode, RestrictPolicy, Tick};

use crate::error::FollowError;

/// The follower's startup configuration.
///
/// The original syncer reads `chunkSize` off a dynamically-typed
/// options bag as a string it parses at use; here it is a plain `u64`
/// validated once at construction.
#[derive(Clone, Debug)]
pub struct FollowerConfig {
    pub endpoint: String,
    pub chunk_size: u64,
    pub initial_tick: Option<Tick>,
    pub use_tick: bool,
    pub restrict: RestrictPolicy,
    pub require_from_present: bool,
    pub verbose: u8,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_connect_retries: u32,
    pub checkpoint_interval: Duration,
    pub checkpoint_commit_interval: u64,
    pub max_backoff: Duration,
}

impl FollowerConfig {
    /// Validates the combination of options, returning `ConfigInvalid`
    /// on the first violation found.
    pub fn validate(&self) -> Result<(), FollowError> {
        if self.endpoint.trim().is_empty() {
            return Err(FollowError::ConfigInvalid("endpoint must not be empty".to_owned()));
        }
        if self.chunk_size == 0 {
            return Err(FollowError::ConfigInvalid(
                "chunkSize must be greater than zero".to_owned(),
            ));
        }
        if self.use_tick && self.initial_tick.is_none() {
            return Err(FollowError::ConfigInvalid(
                "useTick requires initialTick to be set".to_owned(),
            ));
        }
        match self.restrict.mode {
            RestrictMode::Include | RestrictMode::Exclude if self.restrict.collections.is_empty() => {
                Err(FollowError::ConfigInvalid(
                    "restrictType Include/Exclude requires a non-empty restrictCollections".to_owned(),
                ))
            }
            _ => Ok(()),
        }?;
        if self.checkpoint_commit_interval == 0 {
            return Err(FollowError::ConfigInvalid(
                "checkpoint commit interval must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for FollowerConfig {
    fn default() -> FollowerConfig {
        FollowerConfig {
            endpoint: String::new(),
            chunk_size: 1 << 20,
            initial_tick: None,
            use_tick: false,
            restrict: RestrictPolicy::none(false),
            require_from_present: true,
            verbose: 0,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_connect_retries: 3,
            checkpoint_interval: Duration::from_secs(5),
            checkpoint_commit_interval: 100,
            max_backoff: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_endpoint() {
        let cfg = FollowerConfig {
            endpoint: "  ".to_owned(),
            ..FollowerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FollowError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let cfg = FollowerConfig {
            endpoint: "http://master".to_owned(),
            chunk_size: 0,
            ..FollowerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FollowError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_include_mode_with_no_collections() {
        let cfg = FollowerConfig {
            endpoint: "http://master".to_owned(),
            restrict: RestrictPolicy {
                mode: RestrictMode::Include,
                collections: Default::default(),
                include_system: false,
            },
            ..FollowerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FollowError::ConfigInvalid(_))));
    }

    #[test]
    fn default_config_is_valid_once_endpoint_is_set() {
        let cfg = FollowerConfig {
            endpoint: "http://master".to_owned(),
            ..FollowerConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
