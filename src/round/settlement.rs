//! Settlement rules

use super::{Direction, RoundResult};
use rust_decimal::Decimal;

/// Result and award for one choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub result: RoundResult,
    pub points_delta: u64,
}

/// Compare close to open for a direction
///
/// An unchanged price is a draw whichever side was taken.
pub fn decide(open: Decimal, close: Decimal, direction: Direction) -> RoundResult {
    match (close.cmp(&open), direction) {
        (std::cmp::Ordering::Equal, _) => RoundResult::Draw,
        (std::cmp::Ordering::Greater, Direction::Up) => RoundResult::Win,
        (std::cmp::Ordering::Less, Direction::Down) => RoundResult::Win,
        _ => RoundResult::Lose,
    }
}

/// Wins earn the fixed award, everything else earns nothing
pub fn settle_choice(
    open: Decimal,
    close: Decimal,
    direction: Direction,
    points_per_win: u64,
) -> Settlement {
    let result = decide(open, close, direction);
    let points_delta = match result {
        RoundResult::Win => points_per_win,
        RoundResult::Lose | RoundResult::Draw | RoundResult::Void => 0,
    };
    Settlement {
        result,
        points_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const POINTS_PER_WIN: u64 = 10;

    #[test]
    fn test_up_wins_on_rise() {
        let s = settle_choice(dec!(100), dec!(110), Direction::Up, POINTS_PER_WIN);
        assert_eq!(s.result, RoundResult::Win);
        assert_eq!(s.points_delta, POINTS_PER_WIN);
    }

    #[test]
    fn test_up_loses_on_fall() {
        let s = settle_choice(dec!(100), dec!(90), Direction::Up, POINTS_PER_WIN);
        assert_eq!(s.result, RoundResult::Lose);
        assert_eq!(s.points_delta, 0);
    }

    #[test]
    fn test_down_wins_on_fall() {
        let s = settle_choice(dec!(100), dec!(90), Direction::Down, POINTS_PER_WIN);
        assert_eq!(s.result, RoundResult::Win);
        assert_eq!(s.points_delta, POINTS_PER_WIN);
    }

    #[test]
    fn test_down_loses_on_rise() {
        assert_eq!(
            decide(dec!(100), dec!(100.01), Direction::Down),
            RoundResult::Lose
        );
    }

    #[test]
    fn test_unchanged_price_is_draw_for_both_sides() {
        let down = settle_choice(dec!(100), dec!(100), Direction::Down, POINTS_PER_WIN);
        assert_eq!(down.result, RoundResult::Draw);
        assert_eq!(down.points_delta, 0);

        let up = settle_choice(dec!(100), dec!(100.00), Direction::Up, POINTS_PER_WIN);
        assert_eq!(up.result, RoundResult::Draw);
    }
}
