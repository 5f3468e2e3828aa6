//! Central configuration for the load client.
//!
//! Loads from `fixflow.toml`. All traffic parameters are runtime-configurable
//! — no recompilation needed. Missing fields fall back to the defaults the
//! original soak profile used (1000 orders over MSFT/AAPL/BAC).

use serde::Deserialize;
use std::path::Path;

use crate::core::{Error, Result};

/// Synthetic order-flow parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Number of new-order requests to generate
    pub order_count: usize,
    /// Symbol universe to draw from
    pub symbols: Vec<String>,
    /// Uniform limit-price range (inclusive)
    pub price_min: f64,
    pub price_max: f64,
    /// Uniform integer quantity range (inclusive)
    pub qty_min: u32,
    pub qty_max: u32,
    /// Chance of scheduling a cancel after each new order
    pub cancel_probability: f64,
    /// Jittered delay before a scheduled cancel goes out (milliseconds)
    pub cancel_delay_ms_min: u64,
    pub cancel_delay_ms_max: u64,
    /// Pause between successive new orders (milliseconds)
    pub order_delay_ms_min: u64,
    pub order_delay_ms_max: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            order_count: 1000,
            symbols: vec!["MSFT".into(), "AAPL".into(), "BAC".into()],
            price_min: 1.0,
            price_max: 100.0,
            qty_min: 1,
            qty_max: 100,
            cancel_probability: 0.5,
            cancel_delay_ms_min: 100,
            cancel_delay_ms_max: 300,
            order_delay_ms_min: 100,
            order_delay_ms_max: 300,
        }
    }
}

/// Session-side knobs: the logon wait and the loopback counterparty's
/// behavior profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long submission may wait for logon before giving up (milliseconds)
    pub logon_timeout_ms: u64,
    /// Sim counterparty: chance an acknowledged order executes at all
    pub fill_probability: f64,
    /// Sim counterparty: chance an execution arrives as two partials
    pub partial_fill_probability: f64,
    /// Sim counterparty: chance a cancel request bounces with a cancel-reject
    pub cancel_reject_probability: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            logon_timeout_ms: 5_000,
            fill_probability: 0.9,
            partial_fill_probability: 0.4,
            cancel_reject_probability: 0.2,
        }
    }
}

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub flow: FlowConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load config from the given TOML file path. Fatal on malformed input.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to built-in defaults
    /// when no file is present.
    pub fn load_default() -> Result<Self> {
        let candidates = ["fixflow.toml", concat!(env!("CARGO_MANIFEST_DIR"), "/fixflow.toml")];

        for path in &candidates {
            let path = Path::new(path);
            if path.exists() {
                let cfg = Self::load(path)?;
                tracing::info!("Loaded config from {}", path.display());
                return Ok(cfg);
            }
        }

        tracing::info!("No fixflow.toml found, using built-in defaults");
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let f = &self.flow;
        if f.symbols.is_empty() {
            return Err(Error::Config("flow.symbols must not be empty".into()));
        }
        if !(f.price_min > 0.0 && f.price_min <= f.price_max) {
            return Err(Error::Config(format!(
                "invalid price range [{}, {}]",
                f.price_min, f.price_max
            )));
        }
        if !(f.qty_min > 0 && f.qty_min <= f.qty_max) {
            return Err(Error::Config(format!(
                "invalid quantity range [{}, {}]",
                f.qty_min, f.qty_max
            )));
        }
        if f.cancel_delay_ms_min > f.cancel_delay_ms_max
            || f.order_delay_ms_min > f.order_delay_ms_max
        {
            return Err(Error::Config("delay ranges must be min <= max".into()));
        }
        for (name, p) in [
            ("flow.cancel_probability", f.cancel_probability),
            ("session.fill_probability", self.session.fill_probability),
            (
                "session.partial_fill_probability",
                self.session.partial_fill_probability,
            ),
            (
                "session.cancel_reject_probability",
                self.session.cancel_reject_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, p)));
            }
        }
        Ok(())
    }
}
