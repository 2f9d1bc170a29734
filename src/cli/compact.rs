//! Compact command implementation

use crate::config::Config;
use crate::ledger::Ledger;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Retention in seconds; defaults to the configured value
    #[arg(long)]
    pub retention_secs: Option<u64>,
}

impl CompactArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ledger = Ledger::from_config(&config.ledger)?;
        let retention_secs = self
            .retention_secs
            .unwrap_or(config.ledger.session_retention_secs);
        let retention = chrono::Duration::try_seconds(retention_secs as i64)
            .ok_or_else(|| anyhow::anyhow!("Retention out of range: {}", retention_secs))?;

        let removed = ledger.compact_sessions(retention, Utc::now()).await?;
        println!(
            "Removed {} session records older than {}s from {}",
            removed,
            retention_secs,
            ledger.data_dir().display()
        );
        Ok(())
    }
}
