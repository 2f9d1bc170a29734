//! Leaderboard command implementation

use crate::config::Config;
use crate::ledger::Ledger;
use clap::Args;

#[derive(Args, Debug)]
pub struct LeaderboardArgs {
    /// Number of players to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,
}

impl LeaderboardArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ledger = Ledger::from_config(&config.ledger)?;
        let players = ledger.top_players(self.limit).await?;

        if players.is_empty() {
            println!("No players recorded in {}", ledger.data_dir().display());
            return Ok(());
        }

        println!("{:>4}  {:<16}  {:>8}  telegram", "rank", "wallet", "points");
        for (rank, player) in players.iter().enumerate() {
            println!(
                "{:>4}  {:<16}  {:>8}  {}",
                rank + 1,
                shorten_wallet(&player.wallet),
                player.points,
                player.telegram_handle.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }
}

/// `0x1234...abcd` form for display
pub fn shorten_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 10 {
        return wallet.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
