//! CLI command implementations

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use dialoguer::Confirm;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ExchangeKind, MarketConfig};
use crate::exchange::{self, sort_history, Exchange, HttpExchange};
use crate::market::FeatureEngine;
use crate::predictor::{Dataset, LogisticPredictor, Predictor, SharedPredictor};
use crate::telemetry::{spawn_logger, TelemetrySink};
use crate::worker::{WorkerLoop, WorkerReport, WorkerSupervisor};

/// Run one worker per selected market until Ctrl-C
pub async fn start(config: &Config, paper: bool, markets: &[String], yes: bool) -> Result<()> {
    let selected = select_markets(config, markets)?;
    let live = !paper && config.exchange.kind == ExchangeKind::Http;

    if live {
        warn!("LIVE mode - orders go to {}", config.exchange.base_url);
        if !yes {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Trade live on {} market(s)? Orders cannot be undone.",
                    selected.len()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                info!("Start cancelled by user");
                return Ok(());
            }
        }
    } else {
        warn!("Running in PAPER mode - no real orders will be placed");
    }

    let exchange: Arc<dyn Exchange> =
        exchange::build(&config.exchange, paper).context("Failed to build exchange")?;
    info!(
        "Exchange: {}, sleep {}ms, H={} F={} B={}",
        exchange.name(),
        config.trading.sleep_time_ms,
        config.model.history_length,
        config.model.future_steps,
        config.model.batch_size
    );

    let (sink, rx) = TelemetrySink::channel(config.telemetry.channel_capacity);
    let logger = spawn_logger(rx);

    let shared = if config.model.shared {
        Some(SharedPredictor::new(
            LogisticPredictor::load_or_baseline(&config.model).await,
        ))
    } else {
        None
    };

    let supervisor = WorkerSupervisor::new();
    for market in &selected {
        let predictor: Box<dyn Predictor> = match &shared {
            Some(shared) => Box::new(shared.clone()),
            None => Box::new(LogisticPredictor::load_or_baseline(&config.model).await),
        };
        let worker = WorkerLoop::new(
            &market.id,
            config,
            Arc::clone(&exchange),
            predictor,
            sink.clone(),
        );
        supervisor.spawn(worker)?;
    }

    info!(
        "Monitoring {} market(s). Press Ctrl-C to stop.",
        supervisor.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received shutdown signal");

    let reports = supervisor.shutdown().await;

    let dropped = sink.dropped();
    drop(sink);
    let rendered = logger.await.context("Telemetry logger failed")?;
    if dropped > 0 {
        warn!("{} telemetry events dropped under backpressure", dropped);
    }
    info!("{} telemetry events rendered", rendered);

    if let Some(shared) = shared {
        let weights = shared.with(|model| model.weights().clone());
        match weights.save(&config.model.model_path).await {
            Ok(()) => info!("Saved shared model to {}", config.model.model_path),
            Err(e) => warn!("Could not save shared model: {}", e),
        }
    }

    print_summary(&reports);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Fetch historical ticks and write a labeled feature dataset
pub async fn backfill(
    config: &Config,
    market: &str,
    start: &str,
    end: &str,
    output: &str,
) -> Result<()> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    if end <= start {
        bail!("End {} is not after start {}", end, start);
    }

    let client = HttpExchange::new(&config.exchange)?;
    let mut points = client
        .fetch_history(market, &start.to_rfc3339(), &end.to_rfc3339())
        .await
        .with_context(|| format!("Failed to fetch history for {}", market))?;

    sort_history(&mut points);

    let mut skipped = 0usize;
    let ticks: Vec<_> = points
        .iter()
        .filter_map(|point| match point.to_tick() {
            Ok(tick) => Some(tick),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!("Skipped {} unusable historical points", skipped);
    }

    let dataset = Dataset {
        market: market.to_string(),
        history_length: config.model.history_length,
        future_steps: config.model.future_steps,
        features: FeatureEngine::new().derive_series(&ticks),
    };
    dataset
        .save(output)
        .await
        .with_context(|| format!("Failed to write {}", output))?;

    println!("\n=== BACKFILL ===\n");
    println!("Market: {}", market);
    println!("Ticks: {}", ticks.len());
    println!("Labeled samples: {}", dataset.sample_count());
    println!("Positive rate: {:.1}%", dataset.positive_rate() * 100.0);
    println!("Written to: {}", output);
    Ok(())
}

/// Fit the logistic model on a dataset and save it to `model.model_path`
pub async fn train(config: &Config, dataset_path: &str, epochs: usize) -> Result<()> {
    let dataset = Dataset::load(dataset_path)
        .await
        .with_context(|| format!("Failed to read dataset {}", dataset_path))?;

    if dataset.history_length != config.model.history_length
        || dataset.future_steps != config.model.future_steps
    {
        warn!(
            "Dataset uses H={} F={}, config has H={} F={}; training with the dataset's",
            dataset.history_length,
            dataset.future_steps,
            config.model.history_length,
            config.model.future_steps
        );
    }

    let mut model_config = config.model.clone();
    model_config.history_length = dataset.history_length;
    model_config.future_steps = dataset.future_steps;

    let mut predictor = LogisticPredictor::new(&model_config);
    let seen = predictor.fit(&dataset, epochs)?;
    predictor.save(&config.model.model_path).await?;

    println!("\n=== TRAINING ===\n");
    println!("Dataset: {} ({})", dataset_path, dataset.market);
    println!("Samples per epoch: {}", dataset.sample_count());
    println!("Epochs: {}", epochs.max(1));
    println!("Samples seen: {}", seen);
    println!("Saved to: {}", config.model.model_path);
    Ok(())
}

fn select_markets<'a>(config: &'a Config, requested: &[String]) -> Result<Vec<&'a MarketConfig>> {
    if requested.is_empty() {
        return Ok(config.enabled_markets().collect());
    }

    requested
        .iter()
        .map(|id| {
            config
                .markets
                .iter()
                .find(|m| &m.id == id)
                .with_context(|| format!("Market {} is not configured", id))
        })
        .collect()
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC)
fn parse_time(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {}", input))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .with_context(|| format!("Invalid date: {}", input))
}

fn print_summary(reports: &[WorkerReport]) {
    println!("\n=== SESSION SUMMARY ===\n");
    if reports.is_empty() {
        println!("No workers reported.");
        return;
    }

    for report in reports {
        let stats = &report.stats;
        println!("{}", report.market_id);
        println!(
            "  Ticks: {} (missed {})",
            stats.ticks, stats.missed_ticks
        );
        println!(
            "  Predictions: {} (failed {})",
            stats.predictions, stats.predictor_failures
        );
        println!("  Anomaly alerts: {}", stats.anomaly_alerts);
        println!(
            "  Orders: {} filled, {} rejected",
            stats.orders_filled, stats.orders_rejected
        );
        println!(
            "  Closed trades: {} (win rate {:.1}%)",
            stats.closed_trades(),
            stats.win_rate()
        );
        println!("  Realized P&L: {:.6}", stats.realized_pnl);
        match report.position.avg_entry_price() {
            Some(avg) => println!(
                "  Open position: {} @ {:.6}",
                report.position.size(),
                avg
            ),
            None => println!("  Open position: none"),
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        let a = parse_time("2024-03-01").unwrap();
        assert_eq!(a.to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let b = parse_time("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(b.to_rfc3339(), "2024-03-01T10:30:00+00:00");

        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_select_markets() {
        let mut config = Config::default();
        let mut second = config.markets[0].clone();
        second.id = "ETH_USDC".into();
        second.enabled = false;
        config.markets.push(second);

        let ids: Vec<_> = select_markets(&config, &[])
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        assert_eq!(ids, vec!["SOL_USDC"]);

        // an explicit request may pick a disabled market
        let picked = select_markets(&config, &["ETH_USDC".to_string()]).unwrap();
        assert_eq!(picked[0].id, "ETH_USDC");

        assert!(select_markets(&config, &["NOPE".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_train_writes_model() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_path = dir.path().join("dataset.json");
        let model_path = dir.path().join("model.json");

        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        let ticks: Vec<_> = prices
            .iter()
            .map(|p| crate::market::Tick::from_quotes(p - 0.05, p + 0.05, 2000.0, Utc::now()).unwrap())
            .collect();
        Dataset {
            market: "SOL_USDC".into(),
            history_length: 10,
            future_steps: 2,
            features: FeatureEngine::new().derive_series(&ticks),
        }
        .save(&dataset_path)
        .await
        .unwrap();

        let mut config = Config::default();
        config.model.model_path = model_path.to_string_lossy().into_owned();

        train(&config, dataset_path.to_str().unwrap(), 2)
            .await
            .unwrap();

        let mut loaded_config = config.model.clone();
        loaded_config.history_length = 10;
        loaded_config.future_steps = 2;
        let model = LogisticPredictor::load(&model_path, &loaded_config)
            .await
            .unwrap();
        assert_eq!(model.weights().trained_samples, 2 * 48);
    }
}
