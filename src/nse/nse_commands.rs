use super::analysis::{
    CycleInput, CycleReport, CycleStatus, error_message, needs_previous_close, run_cycle,
};
use super::config::{EngineConfig, now_ist};
use super::models::Instrument;
use super::nse_api_server;
use super::nse_client::MarketDataSource;
use super::processor::is_market_open;
use super::state::SharedState;
use crate::app_config::AppConfig;
use crate::export;
use crate::notifier::{Notifier, dispatch};
use crate::utility::timing::Timer;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use colored::Colorize;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Collaborators for one analysis cycle. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    pub source: Arc<dyn MarketDataSource>,
    pub notifier: Arc<dyn Notifier>,
    pub state: SharedState,
    pub config: Arc<EngineConfig>,
    pub ignore_market_hours: bool,
}

impl Engine {
    /// Fetch, analyze and notify for one instrument. Failures are reported
    /// through the notifier before being returned.
    pub async fn process_instrument(
        &self,
        instrument: Instrument,
        now: DateTime<FixedOffset>,
    ) -> Result<CycleStatus> {
        if !self.ignore_market_hours && !is_market_open(now) {
            info!("{} skipped: market closed", instrument);
            return Ok(CycleStatus::MarketClosed);
        }

        let _timer = Timer::start(format!("{} cycle", instrument));

        match self.try_process(instrument, now).await {
            Ok(report) => {
                dispatch(Arc::clone(&self.notifier), report.notifications.clone());
                Ok(CycleStatus::Completed(Box::new(report)))
            }
            Err(e) => {
                error!("{} cycle failed: {:#}", instrument, e);
                dispatch(
                    Arc::clone(&self.notifier),
                    vec![error_message(instrument, &format!("{:#}", e))],
                );
                Err(e)
            }
        }
    }

    async fn try_process(
        &self,
        instrument: Instrument,
        now: DateTime<FixedOffset>,
    ) -> Result<CycleReport> {
        let snapshot = self.source.fetch_option_chain(instrument).await?;

        let previous_close = if needs_previous_close(&snapshot, now)? {
            Some(
                self.source
                    .fetch_previous_close(instrument)
                    .await
                    .with_context(|| format!("Previous close lookup for {}", instrument))?,
            )
        } else {
            None
        };

        let profile = self.config.profile(instrument);
        let input = CycleInput {
            snapshot: &snapshot,
            previous_close,
            now,
        };

        let mut store = self.state.write().await;
        let report = run_cycle(store.state_mut(instrument), input, &profile, &self.config)?;
        Ok(report)
    }

    /// One pass over `instruments`. Instruments run concurrently; each
    /// appears once per tick so its own cycles never overlap.
    pub async fn run_tick(
        &self,
        instruments: &[Instrument],
        now: DateTime<FixedOffset>,
    ) -> Vec<(Instrument, Result<CycleStatus>)> {
        let mut unique = instruments.to_vec();
        unique.sort();
        unique.dedup();

        let cycles = unique.into_iter().map(|instrument| async move {
            (instrument, self.process_instrument(instrument, now).await)
        });
        join_all(cycles).await
    }

    /// Ticks forever on `app.refresh`; a slow tick skips the missed ones
    pub async fn watch_loop(self, app: AppConfig) {
        let mut ticker = interval(app.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let results = self.run_tick(&app.instruments, now_ist()).await;
            for (instrument, result) in &results {
                NSECommands::print_result(*instrument, result);
            }
        }
    }
}

/// NSE Command Handler - entry points for each run mode
pub struct NSECommands;

impl NSECommands {
    fn banner(title: &str) {
        println!("{}", "=".repeat(60).blue());
        println!("{}", title.green().bold());
        println!("{}", "=".repeat(60).blue());
        println!();
    }

    /// One cycle per instrument, optional CSV export
    pub async fn run_once(app: &AppConfig, engine: &Engine) -> Result<()> {
        Self::banner("NSE Bias Engine - Single Pass");
        app.print_summary();
        println!();

        let now = now_ist();
        let results = engine.run_tick(&app.instruments, now).await;

        let mut failed = 0;
        for (instrument, result) in &results {
            Self::print_result(*instrument, result);
            if result.is_err() {
                failed += 1;
            }
        }

        if let Some(dir) = &app.export_dir {
            let store = engine.state.read().await;
            for instrument in &app.instruments {
                let Some(snapshot) = store.snapshot(*instrument) else {
                    continue;
                };
                match export::export_snapshot(&snapshot, dir, now) {
                    Ok(paths) => {
                        for path in paths {
                            println!("{} Exported {}", "✓".green(), path.display());
                        }
                    }
                    Err(e) => warn!("{} export failed: {:#}", instrument, e),
                }
            }
        }

        println!();
        println!(
            "{} Completed: {}  {} Failed: {}",
            "✓".green(),
            results.len() - failed,
            "✗".red(),
            failed
        );
        Ok(())
    }

    pub async fn run_watch(app: AppConfig, engine: Engine) -> Result<()> {
        Self::banner("NSE Bias Engine - Watch");
        app.print_summary();
        println!();

        tokio::select! {
            _ = engine.watch_loop(app) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("{} Shutting down", "⏹".yellow());
            }
        }
        Ok(())
    }

    /// Watch loop in the background plus the HTTP API
    pub async fn run_server(app: AppConfig, engine: Engine) -> Result<()> {
        Self::banner("NSE Bias Engine - API Server");
        app.print_summary();
        println!();

        let app_state = nse_api_server::AppState::new(engine.state.clone(), engine.config.clone());
        let port = app.port;
        let watcher = tokio::spawn(engine.watch_loop(app));

        let served = nse_api_server::start_server(port, app_state).await;
        watcher.abort();
        served
    }

    pub fn print_result(instrument: Instrument, result: &Result<CycleStatus>) {
        match result {
            Ok(CycleStatus::MarketClosed) => {
                println!("{} {}: market closed", "⏸".yellow(), instrument.symbol().yellow());
            }
            Ok(CycleStatus::Completed(report)) => Self::print_report(report),
            Err(e) => {
                println!(
                    "{} {} → {}",
                    "✗".red(),
                    instrument.symbol().yellow(),
                    format!("{:#}", e).chars().take(120).collect::<String>()
                );
            }
        }
    }

    fn print_report(report: &CycleReport) {
        println!("{}", "-".repeat(60).blue());
        println!(
            "{} {} ({} mode, expiry {})",
            "✓".green(),
            report.instrument.symbol().yellow().bold(),
            report.mode,
            report.expiry
        );
        println!("  Spot: {:.2}  ATM: {}", report.spot, report.atm_strike.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()));

        let view = report.market_view.to_string();
        let view = if report.market_view.is_bullish() {
            view.green()
        } else if report.market_view.is_bearish() {
            view.red()
        } else {
            view.normal()
        };
        println!("  Market view: {}  Total score: {:.2}", view, report.total_score);
        println!("  Support: {}  Resistance: {}", report.support_zone, report.resistance_zone);
        println!(
            "  OI change (lakhs): CE {:.2} / PE {:.2} ({:?})",
            report.oi_summary.ce_change_lakhs, report.oi_summary.pe_change_lakhs, report.oi_summary.dominance
        );

        if report.signals.is_empty() {
            println!("  Signal: No Signal");
        }
        for s in &report.signals {
            println!(
                "  {} {} {} @ {} → target {} / SL {}",
                "📍",
                s.signal_type.to_string().cyan().bold(),
                s.strike,
                s.ltp,
                s.target,
                s.stop_loss
            );
        }
        for t in &report.transitions {
            println!("  {} {} {} {} at {:.2}", "•", t.strike, t.side, t.status, t.exit_price);
        }
    }

    pub fn print_usage() {
        println!("{}", "Usage:".cyan().bold());
        println!("  NSE_MODE=once    single pass over NSE_SYMBOLS (default)");
        println!("  NSE_MODE=watch   repeat every NSE_REFRESH_SECS");
        println!("  NSE_MODE=server  watch plus HTTP API on NSE_PORT");
    }
}
