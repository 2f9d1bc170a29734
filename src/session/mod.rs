//! Session registry
//!
//! Guests are created with zero points and may later link a wallet.
//! Linking a wallet that already has a live session folds the guest's
//! points into it.

mod registry;
mod types;

pub use registry::SessionRegistry;
pub use types::{LinkOutcome, Session, SessionError, SessionId};

use crate::ledger::Ledger;

/// Link a wallet and restore its persisted balance
///
/// Only an in-place promotion reads the ledger: a merge lands on a live
/// session that already carries the wallet's points, and a session that
/// was already linked restored them when it was first promoted. A ledger
/// read failure is logged and the link still succeeds.
pub async fn connect_wallet(
    registry: &SessionRegistry,
    ledger: &Ledger,
    id: &SessionId,
    wallet: &str,
) -> Result<LinkOutcome, SessionError> {
    let outcome = registry.link_wallet(id, wallet)?;

    let LinkOutcome::Promoted(session) = &outcome else {
        return Ok(outcome);
    };

    let wallet = session.wallet.clone().unwrap_or_else(|| wallet.to_string());
    match ledger.player(&wallet).await {
        Ok(Some(player)) if player.points > 0 => {
            let total = registry.add_points(id, player.points)?;
            tracing::info!(
                session = %id,
                restored = player.points,
                total,
                "Restored persisted points"
            );
            let session = registry.get(id).ok_or(SessionError::UnknownSession(*id))?;
            Ok(LinkOutcome::Promoted(session))
        }
        Ok(_) => Ok(outcome),
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "Could not load persisted points");
            Ok(outcome)
        }
    }
}
