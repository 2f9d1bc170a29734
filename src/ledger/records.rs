//! Ledger row types
//!
//! Timestamps are stored as Unix milliseconds.

use crate::round::{Direction, RoundResult};
use chrono::{DateTime, TimeZone, Utc};
use csv_async::StringRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const PLAYERS_HEADER: [&str; 3] = ["wallet", "points", "telegram_handle"];
pub const ROUNDS_HEADER: [&str; 8] = [
    "timestamp",
    "round_id",
    "identity",
    "choice",
    "p0",
    "p1",
    "result",
    "latency_ms",
];
pub const SESSIONS_HEADER: [&str; 5] = [
    "session_id",
    "temp_points",
    "created_at",
    "last_seen",
    "is_guest",
];

/// Maps a record to and from its row fields
pub trait LedgerRow: Sized {
    const HEADER: &'static [&'static str];

    fn to_fields(&self) -> StringRecord;

    fn from_fields(record: &StringRecord) -> Result<Self, String>;
}

/// Persisted points for a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub wallet: String,
    pub points: u64,
    pub telegram_handle: Option<String>,
}

/// One settled choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcomeRecord {
    pub timestamp: DateTime<Utc>,
    pub round_id: String,
    /// Wallet when linked, session id otherwise
    pub identity: String,
    pub direction: Direction,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub result: RoundResult,
    /// Settlement time minus receipt time
    pub latency_ms: i64,
}

/// Point-in-time session snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub points: u64,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_guest: bool,
}

impl LedgerRow for PlayerRecord {
    const HEADER: &'static [&'static str] = &PLAYERS_HEADER;

    fn to_fields(&self) -> StringRecord {
        StringRecord::from(vec![
            self.wallet.clone(),
            self.points.to_string(),
            self.telegram_handle.clone().unwrap_or_default(),
        ])
    }

    fn from_fields(record: &StringRecord) -> Result<Self, String> {
        let [wallet, points, handle] = expect_fields::<3>(record)?;
        Ok(Self {
            wallet: wallet.to_string(),
            points: parse(points, "points")?,
            telegram_handle: (!handle.is_empty()).then(|| handle.to_string()),
        })
    }
}

impl LedgerRow for RoundOutcomeRecord {
    const HEADER: &'static [&'static str] = &ROUNDS_HEADER;

    fn to_fields(&self) -> StringRecord {
        StringRecord::from(vec![
            self.timestamp.timestamp_millis().to_string(),
            self.round_id.clone(),
            self.identity.clone(),
            self.direction.as_str().to_string(),
            self.open_price.to_string(),
            self.close_price.to_string(),
            self.result.as_str().to_string(),
            self.latency_ms.to_string(),
        ])
    }

    fn from_fields(record: &StringRecord) -> Result<Self, String> {
        let [ts, round_id, identity, choice, p0, p1, result, latency] =
            expect_fields::<8>(record)?;
        Ok(Self {
            timestamp: parse_millis(ts)?,
            round_id: round_id.to_string(),
            identity: identity.to_string(),
            direction: choice.parse()?,
            open_price: parse(p0, "p0")?,
            close_price: parse(p1, "p1")?,
            result: result.parse()?,
            latency_ms: parse(latency, "latency_ms")?,
        })
    }
}

impl LedgerRow for SessionRecord {
    const HEADER: &'static [&'static str] = &SESSIONS_HEADER;

    fn to_fields(&self) -> StringRecord {
        StringRecord::from(vec![
            self.session_id.clone(),
            self.points.to_string(),
            self.created_at.timestamp_millis().to_string(),
            self.last_seen.timestamp_millis().to_string(),
            self.is_guest.to_string(),
        ])
    }

    fn from_fields(record: &StringRecord) -> Result<Self, String> {
        let [id, points, created, seen, guest] = expect_fields::<5>(record)?;
        Ok(Self {
            session_id: id.to_string(),
            points: parse(points, "temp_points")?,
            created_at: parse_millis(created)?,
            last_seen: parse_millis(seen)?,
            is_guest: parse(guest, "is_guest")?,
        })
    }
}

fn expect_fields<const N: usize>(record: &StringRecord) -> Result<[&str; N], String> {
    if record.len() != N {
        return Err(format!("expected {} fields, found {}", N, record.len()));
    }
    let mut fields = [""; N];
    for (slot, field) in fields.iter_mut().zip(record.iter()) {
        *slot = field;
    }
    Ok(fields)
}

fn parse<T: FromStr>(value: &str, name: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {name}: {value:?}"))
}

fn parse_millis(value: &str) -> Result<DateTime<Utc>, String> {
    let millis: i64 = parse(value, "timestamp")?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| format!("timestamp out of range: {millis}"))
}
