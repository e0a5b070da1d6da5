use crate::error::{Result, RetrievalError};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_PERSIST_DIR: &str = "vekta_store";
pub const DEFAULT_DIMENSIONS: usize = 384;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_EMBEDDING_MODEL: &str = "hashing-v1";

/// How the index produces candidate slots before exact rescoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMethod {
    #[default]
    Exact,
    Ann,
}

impl FromStr for SearchMethod {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(SearchMethod::Exact),
            "ann" => Ok(SearchMethod::Ann),
            other => Err(RetrievalError::Config(format!(
                "unknown search_method '{}' (expected 'exact' or 'ann')",
                other
            ))),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Exact => f.write_str("exact"),
            SearchMethod::Ann => f.write_str("ann"),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct VektaConfig {
    pub persist_dir: Option<String>,
    pub dimensions: Option<usize>,
    pub top_k: Option<usize>,
    pub search_method: Option<String>,
    pub ann_num_tables: Option<usize>,
    pub ann_num_projections: Option<usize>,
    pub embedding_model: Option<String>,
}

impl VektaConfig {
    pub fn from_config(config: &Config) -> Self {
        VektaConfig {
            persist_dir: config.get("persist_dir").ok(),
            dimensions: config.get("dimensions").ok(),
            top_k: config.get("top_k").ok(),
            search_method: config.get("search_method").ok(),
            ann_num_tables: config.get("ann_num_tables").ok(),
            ann_num_projections: config.get("ann_num_projections").ok(),
            embedding_model: config.get("embedding_model").ok(),
        }
    }
}

/// Effective settings after layering the config file, `VEKTA_*` variables and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub persist_dir: PathBuf,
    pub dimensions: usize,
    pub top_k: usize,
    pub search_method: SearchMethod,
    pub ann_num_tables: Option<usize>,
    pub ann_num_projections: Option<usize>,
    pub embedding_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            dimensions: DEFAULT_DIMENSIONS,
            top_k: DEFAULT_TOP_K,
            search_method: SearchMethod::Exact,
            ann_num_tables: None,
            ann_num_projections: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

impl Settings {
    /// Reads `vekta_config.{toml,json,yaml}` from the working directory (optional) and
    /// `VEKTA_*` environment variables.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("vekta_config").required(false))
            .add_source(Environment::with_prefix("VEKTA"))
            .build()
            .map_err(|e| RetrievalError::Config(e.to_string()))?;

        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let raw = VektaConfig::from_config(config);
        let defaults = Settings::default();

        let search_method = match raw.search_method {
            Some(s) => s.parse()?,
            None => defaults.search_method,
        };

        let settings = Settings {
            persist_dir: raw
                .persist_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_dir),
            dimensions: raw.dimensions.unwrap_or(defaults.dimensions),
            top_k: raw.top_k.unwrap_or(defaults.top_k),
            search_method,
            ann_num_tables: raw.ann_num_tables,
            ann_num_projections: raw.ann_num_projections,
            embedding_model: raw.embedding_model.unwrap_or(defaults.embedding_model),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(RetrievalError::Config(
                "dimensions must be greater than zero".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(RetrievalError::Config(
                "top_k must be greater than zero".into(),
            ));
        }
        if self.embedding_model != DEFAULT_EMBEDDING_MODEL {
            return Err(RetrievalError::Config(format!(
                "unsupported embedding_model '{}' (available: {})",
                self.embedding_model, DEFAULT_EMBEDDING_MODEL
            )));
        }
        if matches!(self.ann_num_projections, Some(p) if p == 0 || p > 63) {
            return Err(RetrievalError::Config(
                "ann_num_projections must be between 1 and 63".into(),
            ));
        }
        if self.ann_num_tables == Some(0) {
            return Err(RetrievalError::Config(
                "ann_num_tables must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn print_config(&self) {
        println!("persist_dir={}", self.persist_dir.display());
        println!("dimensions={}", self.dimensions);
        println!("top_k={}", self.top_k);
        println!("search_method={}", self.search_method);
        println!(
            "ann_num_tables={}",
            self.ann_num_tables
                .map_or_else(|| "auto".to_string(), |n| n.to_string())
        );
        println!(
            "ann_num_projections={}",
            self.ann_num_projections
                .map_or_else(|| "auto".to_string(), |n| n.to_string())
        );
        println!("embedding_model={}", self.embedding_model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::builder().build().unwrap();
        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.persist_dir, PathBuf::from(DEFAULT_PERSIST_DIR));
        assert_eq!(settings.dimensions, DEFAULT_DIMENSIONS);
        assert_eq!(settings.top_k, DEFAULT_TOP_K);
        assert_eq!(settings.search_method, SearchMethod::Exact);
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::builder()
            .set_override("persist_dir", "/tmp/store")
            .unwrap()
            .set_override("dimensions", 64)
            .unwrap()
            .set_override("top_k", 3)
            .unwrap()
            .set_override("search_method", "ANN")
            .unwrap()
            .set_override("ann_num_tables", 4)
            .unwrap()
            .build()
            .unwrap();
        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.persist_dir, PathBuf::from("/tmp/store"));
        assert_eq!(settings.dimensions, 64);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.search_method, SearchMethod::Ann);
        assert_eq!(settings.ann_num_tables, Some(4));
        assert_eq!(settings.ann_num_projections, None);
    }

    #[test]
    fn rejects_bad_values() {
        let config = Config::builder()
            .set_override("search_method", "hnsw")
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            Settings::from_config(&config),
            Err(RetrievalError::Config(_))
        ));

        let config = Config::builder()
            .set_override("dimensions", 0)
            .unwrap()
            .build()
            .unwrap();
        assert!(Settings::from_config(&config).is_err());

        let config = Config::builder()
            .set_override("embedding_model", "all-MiniLM-L6-v2")
            .unwrap()
            .build()
            .unwrap();
        assert!(Settings::from_config(&config).is_err());
    }
}
