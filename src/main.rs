use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod api;
mod config;
mod db;
mod error;
mod leaderboard;
mod predict;
mod progression;
mod results;
mod wagering;

use api::AppState;
use config::Config;
use db::Database;
use predict::{GenerateParams, PredictionEngine};
use results::{start_settlement_monitor, ResultSource, StoredResults};
use wagering::WagerService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let predictions = PredictionEngine::new(db.clone(), config.model(), config.classifier());
    let wagers = WagerService::new(db.clone(), config.stake_policy(), config.starting_bankroll);
    info!(
        "Starting bankroll {:.2}, max stake {}",
        config.starting_bankroll,
        config
            .max_stake
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "unlimited".into())
    );

    let app = api::router(AppState {
        db: db.clone(),
        wagers: wagers.clone(),
        predictions: predictions.clone(),
        leaderboard_min_picks: config.leaderboard_min_picks,
    });
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let sources: Vec<Arc<dyn ResultSource>> = vec![Arc::new(StoredResults::new(db.clone()))];
    let poll_interval = Duration::from_secs(config.settlement_poll_secs);
    let batch = GenerateParams {
        league_ids: config.league_ids.clone(),
        limit: config.prediction_batch_limit,
    };
    let prediction_every = config.prediction_interval_secs;

    tokio::spawn(async move {
        let mut finished = start_settlement_monitor(sources, poll_interval);

        let mut prediction_interval =
            tokio::time::interval(Duration::from_secs(prediction_every.max(1)));
        prediction_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        if prediction_every == 0 {
            info!("Scheduled predictions disabled");
        }

        loop {
            tokio::select! {
                Some(m) = finished.recv() => {
                    let wagers = wagers.clone();
                    let match_id = m.id;
                    let res = tokio::task::spawn_blocking(move || wagers.settle_match(match_id)).await;
                    match res {
                        Ok(Ok(report)) if report.resolved > 0 => info!(
                            "Settled match {}: {} won, {} lost, {} skipped",
                            report.match_id, report.won, report.lost, report.skipped
                        ),
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!("Settlement of match {} failed: {}", match_id, e),
                        Err(e) => error!("Settlement task for match {} panicked: {}", match_id, e),
                    }
                }
                _ = prediction_interval.tick(), if prediction_every > 0 => {
                    let engine = predictions.clone();
                    let params = batch.clone();
                    match tokio::task::spawn_blocking(move || engine.generate_for_upcoming(&params)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!("Prediction batch failed: {:#}", e),
                        Err(e) => error!("Prediction task panicked: {}", e),
                    }
                }
                else => {
                    warn!("Background loop stopped");
                    break;
                }
            }
        }
    });

    axum::serve(listener, app).await?;

    Ok(())
}
