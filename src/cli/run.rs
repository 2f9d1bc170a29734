//! Run command implementation

use crate::config::Config;
use crate::feed::{PriceFeed, PriceSource};
use crate::ledger::{Ledger, LedgerWriter};
use crate::maintenance::{Maintenance, MaintenanceConfig};
use crate::round::{Direction, RoundEngine, RoundEvent, RoundListener};
use crate::session::{SessionId, SessionRegistry};
use clap::Args;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Simulated guest participants submitting random choices
    #[arg(long, default_value_t = 0)]
    pub bots: usize,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ledger = Arc::new(Ledger::from_config(&config.ledger)?);
        let (outbox, writer) = LedgerWriter::spawn(ledger.clone());

        let feed = PriceFeed::new(config.feed.symbol.clone(), config.feed.history_capacity);
        let feed_task = feed.start(&config.feed);

        let timeout = Duration::from_millis(config.round.startup_price_timeout_ms);
        let Some(price) = feed.wait_for_price(timeout).await else {
            feed_task.abort();
            anyhow::bail!("No price observed within {:?}; refusing to open a round", timeout);
        };
        tracing::info!(symbol = %feed.symbol(), %price, mode = ?feed.mode(), "Initial price");

        let sessions = Arc::new(SessionRegistry::new(
            config.session.telegram_prompt_after_rounds,
        ));
        let prices: Arc<dyn PriceSource> = Arc::new(feed.clone());
        let engine = RoundEngine::new(
            config.round.clone(),
            prices,
            sessions.clone(),
            outbox.clone(),
        )?;
        engine.subscribe(Arc::new(LogListener));

        let bots = (self.bots > 0).then(|| spawn_bots(&engine, &sessions, self.bots));

        let maintenance = Maintenance::new(
            MaintenanceConfig::from_config(config),
            sessions.clone(),
            ledger,
            outbox.clone(),
        )
        .spawn();

        engine.start().await?;

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");

        engine.stop();
        if let Some(bots) = bots {
            bots.abort();
        }
        maintenance.abort();
        feed_task.abort();

        outbox.flush().await?;
        let stats = outbox.stats();
        tracing::info!(
            applied = stats.applied,
            failed = stats.failed,
            sessions = sessions.len(),
            "Ledger flushed"
        );
        writer.abort();
        Ok(())
    }
}

/// Logs each round event
struct LogListener;

impl RoundListener for LogListener {
    fn on_event(&self, event: &RoundEvent) {
        match event {
            RoundEvent::Started(_) | RoundEvent::BettingClosed { .. } => {}
            RoundEvent::Result(notice) => tracing::debug!(
                round = %notice.round_id,
                session = %notice.identity,
                result = %notice.result,
                points = notice.points_delta,
                total = ?notice.total_points,
                "Result"
            ),
            RoundEvent::Finished(finished) => tracing::info!(
                round = %finished.round_id,
                participants = finished.participants,
                winners = finished.winners,
                move_pct = %percent_move(finished.open_price, finished.close_price),
                "Round finished"
            ),
        }
    }
}

fn percent_move(open: Decimal, close: Decimal) -> Decimal {
    if open.is_zero() {
        return Decimal::ZERO;
    }
    ((close - open) / open * Decimal::ONE_HUNDRED).round_dp(4)
}

/// Guest sessions that pick a random side shortly after each round opens
fn spawn_bots(
    engine: &Arc<RoundEngine>,
    sessions: &SessionRegistry,
    count: usize,
) -> JoinHandle<()> {
    let bots: Vec<SessionId> = (0..count).map(|_| sessions.create_guest().id).collect();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.subscribe(Arc::new(tx));

    let engine = engine.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let RoundEvent::Started(started) = event else {
                continue;
            };
            let window = (started.betting_close_time - started.open_time)
                .num_milliseconds()
                .max(1) as u64;

            for bot in &bots {
                let (delay, direction) = {
                    let mut rng = rand::thread_rng();
                    let direction = if rng.gen_bool(0.5) {
                        Direction::Up
                    } else {
                        Direction::Down
                    };
                    (rng.gen_range(0..window), direction)
                };
                let engine = engine.clone();
                let bot = *bot;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = engine.submit_choice(bot, direction, None).await;
                });
            }
        }
    })
}
