//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// One market monitored by its own worker
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Stable identifier used in logs, telemetry and exchange paths
    pub id: String,
    /// On-chain market address (informational; exchange gateway resolves it)
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub base_currency: String,
    #[serde(default)]
    pub quote_currency: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Forecasting window and training parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Window size fed to the predictor; also the prediction gate
    #[serde(default = "default_history_length")]
    pub history_length: usize,
    /// Look-ahead horizon the predictor is trained on
    #[serde(default = "default_future_steps")]
    pub future_steps: usize,
    /// Minimum labeled samples before incremental training has effect
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Pretrained weights, loaded at startup when present
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// Share one model instance across all workers
    #[serde(default)]
    pub shared: bool,
}

/// Rug-pull and spread thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_spread_threshold")]
    pub spread_threshold: f64,
    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: f64,
    /// 10-tick drawdown fraction (0.1 = 10%)
    #[serde(default = "default_price_drop_threshold")]
    pub price_drop_threshold: f64,
}

/// Stop-loss and take-profit, as fractions of the average entry price
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: f64,
    #[serde(default = "default_take_profit_percent")]
    pub take_profit_percent: f64,
    /// Exchange minimum lot; partial exits round down to a multiple. 0 disables rounding.
    #[serde(default)]
    pub lot_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Unit size for all buy/sell tiers
    #[serde(default = "default_order_size_base")]
    pub order_size_base: f64,
    /// Delay between worker iterations
    #[serde(default = "default_sleep_time_ms")]
    pub sleep_time_ms: u64,
}

impl TradingConfig {
    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Simulated order book, fills everything
    Paper,
    /// REST gateway in front of the DEX
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_kind")]
    pub kind: ExchangeKind,
    #[serde(default = "default_exchange_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Order book levels per side summed into the volume estimate
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
    /// Starting mid price for paper markets
    #[serde(default = "default_paper_start_price")]
    pub paper_start_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

// Default value functions
fn default_markets() -> Vec<MarketConfig> {
    vec![MarketConfig {
        id: "SOL_USDC".to_string(),
        address: String::new(),
        base_currency: "SOL".to_string(),
        quote_currency: "USDC".to_string(),
        enabled: true,
    }]
}

fn default_true() -> bool {
    true
}

fn default_history_length() -> usize {
    100
}

fn default_future_steps() -> usize {
    5
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_model_path() -> String {
    "model.json".to_string()
}

fn default_spread_threshold() -> f64 {
    0.5
}

fn default_volume_threshold() -> f64 {
    1000.0
}

fn default_price_drop_threshold() -> f64 {
    0.1
}

fn default_stop_loss_percent() -> f64 {
    0.05
}

fn default_take_profit_percent() -> f64 {
    0.10
}

fn default_order_size_base() -> f64 {
    0.1
}

fn default_sleep_time_ms() -> u64 {
    5000
}

fn default_exchange_kind() -> ExchangeKind {
    ExchangeKind::Paper
}

fn default_exchange_url() -> String {
    std::env::var("EXCHANGE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".into())
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_depth_levels() -> usize {
    5
}

fn default_paper_start_price() -> f64 {
    100.0
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            history_length: default_history_length(),
            future_steps: default_future_steps(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            model_path: default_model_path(),
            shared: false,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            spread_threshold: default_spread_threshold(),
            volume_threshold: default_volume_threshold(),
            price_drop_threshold: default_price_drop_threshold(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_percent: default_stop_loss_percent(),
            take_profit_percent: default_take_profit_percent(),
            lot_size: 0.0,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            order_size_base: default_order_size_base(),
            sleep_time_ms: default_sleep_time_ms(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: default_exchange_kind(),
            base_url: default_exchange_url(),
            timeout_ms: default_timeout_ms(),
            depth_levels: default_depth_levels(),
            paper_start_price: default_paper_start_price(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("trading.sleep_time_ms", default_sleep_time_ms() as i64)?
            .set_default("exchange.base_url", default_exchange_url())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SENTINEL_)
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Markets that should get a worker
    pub fn enabled_markets(&self) -> impl Iterator<Item = &MarketConfig> {
        self.markets.iter().filter(|m| m.enabled)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate markets
        if self.enabled_markets().next().is_none() {
            anyhow::bail!("At least one enabled market must be configured");
        }

        let id_pattern = regex::Regex::new(r"^[A-Za-z0-9_.\-]+$")
            .context("Failed to compile market id pattern")?;
        let mut seen = HashSet::new();
        for market in &self.markets {
            if !id_pattern.is_match(&market.id) {
                return Err(Error::InvalidMarket(format!("{:?}", market.id)).into());
            }
            if !seen.insert(market.id.as_str()) {
                anyhow::bail!("Duplicate market id: {}", market.id);
            }
        }

        // Validate model window
        if self.model.history_length == 0 {
            anyhow::bail!("history_length must be positive");
        }
        if self.model.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        if self.model.learning_rate <= 0.0 {
            anyhow::bail!("learning_rate must be positive");
        }

        // Validate anomaly thresholds
        if self.anomaly.spread_threshold <= 0.0 {
            anyhow::bail!("spread_threshold must be positive");
        }
        if self.anomaly.volume_threshold < 0.0 {
            anyhow::bail!("volume_threshold cannot be negative");
        }
        if self.anomaly.price_drop_threshold <= 0.0 || self.anomaly.price_drop_threshold >= 1.0 {
            anyhow::bail!("price_drop_threshold must be between 0 and 1");
        }

        // Validate risk fractions
        if self.risk.stop_loss_percent <= 0.0 || self.risk.stop_loss_percent >= 1.0 {
            anyhow::bail!("stop_loss_percent must be between 0 and 1");
        }
        if self.risk.take_profit_percent <= 0.0 {
            anyhow::bail!("take_profit_percent must be positive");
        }
        if self.risk.lot_size < 0.0 {
            anyhow::bail!("lot_size cannot be negative");
        }

        // Validate trading amounts
        if self.trading.order_size_base <= 0.0 {
            anyhow::bail!("order_size_base must be positive");
        }

        // Validate exchange
        if self.exchange.kind == ExchangeKind::Http {
            url::Url::parse(&self.exchange.base_url)
                .with_context(|| format!("Invalid exchange base_url: {}", self.exchange.base_url))?;
        }
        if self.exchange.depth_levels == 0 {
            anyhow::bail!("depth_levels must be positive");
        }

        if self.telemetry.channel_capacity == 0 {
            anyhow::bail!("telemetry channel_capacity must be positive");
        }

        // Warn about tight polling
        if self.trading.sleep_time_ms < 500 && self.exchange.kind == ExchangeKind::Http {
            tracing::warn!(
                "sleep_time_ms={} polls the exchange gateway very aggressively",
                self.trading.sleep_time_ms
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let markets: Vec<String> = self
            .markets
            .iter()
            .map(|m| {
                format!(
                    "{} ({}/{}){}",
                    m.id,
                    m.base_currency,
                    m.quote_currency,
                    if m.enabled { "" } else { " [disabled]" }
                )
            })
            .collect();

        format!(
            r#"Configuration:
  Markets: {:?}
  Model:
    history_length: {}
    future_steps: {}
    batch_size: {}
    model_path: {}
    shared: {}
  Anomaly:
    spread_threshold: {}
    volume_threshold: {}
    price_drop_threshold: {}
  Risk:
    stop_loss: {}
    take_profit: {}
    lot_size: {}
  Trading:
    order_size_base: {}
    sleep_time: {}ms
  Exchange:
    kind: {:?}
    base_url: {}
    timeout: {}ms
"#,
            markets,
            self.model.history_length,
            self.model.future_steps,
            self.model.batch_size,
            self.model.model_path,
            self.model.shared,
            self.anomaly.spread_threshold,
            self.anomaly.volume_threshold,
            self.anomaly.price_drop_threshold,
            self.risk.stop_loss_percent,
            self.risk.take_profit_percent,
            self.risk.lot_size,
            self.trading.order_size_base,
            self.trading.sleep_time_ms,
            self.exchange.kind,
            mask_url(&self.exchange.base_url),
            self.exchange.timeout_ms,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            model: ModelConfig::default(),
            anomaly: AnomalyConfig::default(),
            risk: RiskConfig::default(),
            trading: TradingConfig::default(),
            exchange: ExchangeConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
