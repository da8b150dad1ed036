//! # Configuration
//!
//! World and reactor settings, loaded once at startup from TOML:
//!
//! ```toml
//! [world]
//! capacity = 65536
//!
//! [reactors]
//! group_pool_prealloc = 64
//! children_pool_prealloc = 256
//! ```
//!
//! Every field has a default, so an empty document is valid.

use std::path::Path;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// Entity world settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Maximum number of simultaneously live entities.
    pub capacity: usize,
}

impl WorldConfig {
    /// Small world for tests and tools.
    #[must_use]
    pub const fn small() -> Self {
        Self { capacity: 1024 }
    }

    /// World sized for a production scene graph.
    #[must_use]
    pub const fn production() -> Self {
        Self { capacity: 1 << 20 }
    }

    /// Overrides the capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the capacity is zero or does
    /// not fit the 32-bit slot index.
    pub fn validate(&self) -> CoreResult<()> {
        if self.capacity == 0 {
            return Err(CoreError::InvalidConfig("world.capacity must be greater than zero".into()));
        }
        if u32::try_from(self.capacity).is_err() {
            return Err(CoreError::InvalidConfig(format!(
                "world.capacity {} exceeds u32::MAX",
                self.capacity
            )));
        }
        Ok(())
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { capacity: 65_536 }
    }
}

/// Free-list warm-up sizes for reactors.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReactorConfig {
    /// Membership sets pre-built for each aggregator.
    pub group_pool_prealloc: usize,
    /// Children sets pre-built for each hierarchy.
    pub children_pool_prealloc: usize,
}

/// Top-level configuration document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TesseraConfig {
    /// `[world]` table.
    pub world: WorldConfig,
    /// `[reactors]` table.
    pub reactors: ReactorConfig,
}

impl TesseraConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigParse`] on malformed TOML or unknown keys,
    /// and [`CoreError::InvalidConfig`] on out-of-range values.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.world.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigIo`] if the file cannot be read, otherwise
    /// as [`TesseraConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
