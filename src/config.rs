//! Configuration module for the recommendation core.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `STYLERANK_` and use double
//! underscores to separate nested levels:
//! - `STYLERANK_INDEX__DIMENSION=384` sets `index.dimension`
//! - `STYLERANK_CACHE__MAX_SIZE=1000` sets `cache.max_size`
//! - `STYLERANK_RANKING__DEFAULT_ALPHA=0.5` sets `ranking.default_alpha`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory where index snapshots are stored
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Inference cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Personalization configuration
    #[serde(default)]
    pub ranking: RankingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Embedding dimension all stored vectors must match
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached inference results
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Seconds an entry stays valid after its last write
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RankingConfig {
    /// Weight of the original retrieval score when blending
    #[serde(default = "default_alpha")]
    pub default_alpha: f32,

    /// Interaction strength used when the caller does not supply one
    #[serde(default = "default_weight")]
    pub default_weight: f32,
}

fn default_version() -> u32 {
    1
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".stylerank/index")
}

fn default_false() -> bool {
    false
}

fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_512
}

fn default_cache_max_size() -> usize {
    500
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_alpha() -> f32 {
    0.7
}

fn default_weight() -> f32 {
    0.5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            debug: default_false(),
            index: IndexConfig::default(),
            cache: CacheConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_alpha: default_alpha(),
            default_weight: default_weight(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from("stylerank.toml")
    }

    /// Load configuration from a specific TOML file path
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Layer in environment variables with STYLERANK_ prefix
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("STYLERANK_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }
}
