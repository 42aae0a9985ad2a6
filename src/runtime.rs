//! Async actor-per-trader scheduler realizing spec.md §5 concretely (spec.md §4.9).

use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::{Config, ROUND_LENGTH_MS};
use crate::error::LorError;
use crate::system::System;
use crate::trader::BehaviorType;

/// Builds a fresh population of `config.traders` traders (the first `config.randoms` as
/// `RandomVote`, the next `config.bads` as `BadVote`, the rest `Normal`) and cross-
/// replicates them, matching the original's `Init`.
pub async fn init_system(config: &Config) -> anyhow::Result<Arc<Mutex<System>>> {
    let system = Arc::new(Mutex::new(System::new()));
    let mut join_set = JoinSet::new();

    for i in 0..config.traders {
        let behavior = if i < config.randoms {
            BehaviorType::RandomVote
        } else if i < config.randoms + config.bads {
            BehaviorType::BadVote
        } else {
            BehaviorType::Normal
        };
        let account = rand::thread_rng().gen_range(0.0..1000.0);
        let config = config.clone();
        join_set.spawn_blocking(move || crate::trader::Trader::new(behavior, account, &config));
    }

    while let Some(result) = join_set.join_next().await {
        let trader = result??;
        let mut system = system.lock().await;
        system.add_trader(trader)?;
    }

    tracing::info!(
        traders = config.traders,
        randoms = config.randoms,
        bads = config.bads,
        "traders created"
    );
    Ok(system)
}

/// Runs the simulation for `config.run_time_secs`: one task per trader mints coins on a
/// `ROUND_LENGTH_MS` tick and routes them through the shared `System`; a `watch` channel
/// signals every task to stop once the run clock (or an external Ctrl-C) fires.
pub async fn run_simulation(system: Arc<Mutex<System>>, config: &Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trader_ids: Vec<String> = system.lock().await.traders.keys().cloned().collect();

    let mut join_set = JoinSet::new();
    for trader_id in trader_ids {
        let system = Arc::clone(&system);
        let mut shutdown_rx = shutdown_rx.clone();
        let type_count = config.type_count;
        join_set.spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(ROUND_LENGTH_MS));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = mint_and_process(&system, &trader_id, type_count).await {
                            if err != LorError::BadBehavior {
                                warn!(trader = %trader_id, error = %err, "error processing coin");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(config.run_time_secs)) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping simulation early");
        }
    }
    shutdown_tx.send(true).ok();

    while join_set.join_next().await.is_some() {}
    Ok(())
}

async fn mint_and_process(system: &Arc<Mutex<System>>, trader_id: &str, type_count: u32) -> Result<(), LorError> {
    let coin = {
        let system = system.lock().await;
        let trader = system.traders.get(trader_id).ok_or(LorError::UnknownTrader)?;
        if trader.account <= 0.0 {
            return Ok(());
        }
        let amount = rand::thread_rng().gen_range(0.0..10.0);
        let coin_type = rand::thread_rng().gen_range(0..type_count);
        trader.create_coin(amount, coin_type)
    };
    let Some(coin) = coin else { return Ok(()) };
    debug!(trader = %trader_id, coin = %coin.id, amount = coin.amount, "coin minted");

    let mut system = system.lock().await;
    system.process_coin(coin)
}
