//! Review configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ReviewError;
use crate::stockfish::StockfishFactory;

#[derive(Clone, Debug)]
pub struct ReviewConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Search depth per position
    pub depth: u32,

    /// Lines requested per position
    pub multi_pv: u32,

    /// Engine handles evaluating in parallel
    pub workers_nb: usize,

    /// Upper bound on one position's search before the engine is replaced
    pub eval_timeout: Duration,

    /// Extra attempts for a position whose evaluation failed
    pub max_retries: u32,

    /// Hash table size per engine (MB)
    pub hash_mb: u32,

    /// Search threads per engine
    pub engine_threads: u32,

    /// Optional binary opening book produced by `build-book`
    pub book_path: Option<PathBuf>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            depth: 16,
            multi_pv: 3,
            workers_nb: num_cpus::get().max(1),
            eval_timeout: Duration::from_secs(120),
            max_retries: 1,
            hash_mb: 64,
            engine_threads: 1,
            book_path: None,
        }
    }
}

impl ReviewConfig {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset. Set but unparsable values are rejected.
    pub fn load() -> Result<Self, ReviewError> {
        let defaults = Self::default();

        let config = Self {
            stockfish_path: env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path),
            depth: env_or("ENGINE_DEPTH", defaults.depth)?,
            multi_pv: env_or("ENGINE_MULTI_PV", defaults.multi_pv)?,
            workers_nb: env_or("ENGINE_WORKERS", defaults.workers_nb)?,
            eval_timeout: Duration::from_secs(env_or(
                "ENGINE_TIMEOUT_SECS",
                defaults.eval_timeout.as_secs(),
            )?),
            max_retries: env_or("ENGINE_MAX_RETRIES", defaults.max_retries)?,
            hash_mb: env_or("ENGINE_HASH_MB", defaults.hash_mb)?,
            engine_threads: env_or("ENGINE_THREADS", defaults.engine_threads)?,
            book_path: env::var("BOOK_PATH").ok().map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReviewError> {
        if self.stockfish_path.trim().is_empty() {
            return Err(ReviewError::Config("STOCKFISH_PATH is empty".into()));
        }
        if self.depth == 0 {
            return Err(ReviewError::Config("depth must be at least 1".into()));
        }
        if self.multi_pv == 0 {
            return Err(ReviewError::Config("multi_pv must be at least 1".into()));
        }
        if self.workers_nb == 0 {
            return Err(ReviewError::Config("workers_nb must be at least 1".into()));
        }
        if self.eval_timeout.is_zero() {
            return Err(ReviewError::Config("evaluation timeout must be positive".into()));
        }
        if self.engine_threads == 0 {
            return Err(ReviewError::Config("engine threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Factory producing Stockfish handles with this configuration.
    pub fn stockfish_factory(&self) -> StockfishFactory {
        StockfishFactory {
            path: self.stockfish_path.clone(),
            hash_mb: self.hash_mb,
            threads: self.engine_threads,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ReviewError> {
    match env::var(key) {
        Ok(value) => parse_value(key, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ReviewError> {
    value
        .trim()
        .parse()
        .map_err(|_| ReviewError::Config(format!("{key} has invalid value {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReviewConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.depth, 16);
        assert_eq!(config.multi_pv, 3);
        assert!(config.workers_nb >= 1);
        assert!(config.book_path.is_none());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u32>("ENGINE_DEPTH", " 22 ").unwrap(), 22);
        let err = parse_value::<u32>("ENGINE_DEPTH", "deep").unwrap_err();
        assert!(err.to_string().contains("ENGINE_DEPTH"));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = ReviewConfig {
            multi_pv: 0,
            ..ReviewConfig::default()
        };
        assert!(matches!(config.validate(), Err(ReviewError::Config(_))));

        let config = ReviewConfig {
            workers_nb: 0,
            ..ReviewConfig::default()
        };
        assert!(matches!(config.validate(), Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_stockfish_factory() {
        let config = ReviewConfig {
            stockfish_path: "stockfish".into(),
            hash_mb: 32,
            ..ReviewConfig::default()
        };
        let factory = config.stockfish_factory();
        assert_eq!(factory.path, "stockfish");
        assert_eq!(factory.hash_mb, 32);
        assert_eq!(factory.threads, 1);
    }
}
