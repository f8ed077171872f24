//! Fixed-point money.
//!
//! All monetary values are signed 64-bit integers in system units,
//! 1 USDT = 10^10 units. External token amounts arrive as 18-decimal wei
//! strings and convert by integer division on ingest. Floating point is
//! never used at a persisted boundary.

use crate::error::AppError;

/// System units per whole USDT.
pub const UNITS_PER_COIN: i64 = 10_000_000_000; // 10^10

/// Wei per system unit (18-decimal wei -> 10-decimal units).
pub const WEI_PER_UNIT: u128 = 100_000_000; // 10^8

/// A recognised deposit tier. Any other on-chain amount is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositTier {
    pub level: i64,
    /// Seed value routed through the placement engine, in system units.
    pub seed: i64,
    /// Location cap, five times the seed.
    pub current_max: i64,
}

const LEVEL_1_WEI: u128 = 10_000_000_000_000_000; // 10^16
const LEVEL_2_WEI: u128 = 20_000_000_000_000_000;
const LEVEL_3_WEI: u128 = 50_000_000_000_000_000;

/// Look up the deposit tier for an on-chain wei amount.
pub fn tier_for_wei(wei: u128) -> Option<DepositTier> {
    match wei {
        LEVEL_1_WEI => Some(DepositTier {
            level: 1,
            seed: 1_000_000_000_000,
            current_max: 5_000_000_000_000,
        }),
        LEVEL_2_WEI => Some(DepositTier {
            level: 2,
            seed: 2_000_000_000_000,
            current_max: 10_000_000_000_000,
        }),
        LEVEL_3_WEI => Some(DepositTier {
            level: 3,
            seed: 5_000_000_000_000,
            current_max: 25_000_000_000_000,
        }),
        _ => None,
    }
}

/// Parse a decimal wei string as reported by the block explorer.
pub fn parse_wei(s: &str) -> Result<u128, AppError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!("bad wei amount: {s:?}")));
    }
    s.parse::<u128>()
        .map_err(|_| AppError::InvalidInput(format!("wei amount out of range: {s:?}")))
}

/// Convert a wei amount to system units by truncating division.
pub fn wei_to_units(wei: u128) -> Result<i64, AppError> {
    i64::try_from(wei / WEI_PER_UNIT)
        .map_err(|_| AppError::InvalidInput(format!("amount exceeds ledger range: {wei} wei")))
}

/// Parse a user-supplied decimal amount ("12", "12.5") into system units.
///
/// At most ten fractional digits are accepted; anything finer cannot be
/// represented and is rejected rather than silently truncated.
pub fn parse_units(s: &str) -> Result<i64, AppError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AppError::InvalidInput("empty amount".to_string()));
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(AppError::InvalidInput(format!("malformed amount: {s:?}")));
    }
    if frac.len() > 10 {
        return Err(AppError::InvalidInput(format!(
            "amount has more than 10 decimal places: {s:?}"
        )));
    }
    let whole: i64 = whole
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("amount out of range: {s:?}")))?;
    let mut frac_units: i64 = 0;
    if !frac.is_empty() {
        frac_units = frac
            .parse::<i64>()
            .map_err(|_| AppError::InvalidInput(format!("amount out of range: {s:?}")))?;
        frac_units *= 10_i64.pow(10 - frac.len() as u32);
    }
    whole
        .checked_mul(UNITS_PER_COIN)
        .and_then(|u| u.checked_add(frac_units))
        .ok_or_else(|| AppError::InvalidInput(format!("amount out of range: {s:?}")))
}

/// Render system units as a locale-independent two-decimal string.
///
/// Truncates toward zero; a displayed value never exceeds the stored one.
pub fn format_units(units: i64) -> String {
    let sign = if units < 0 { "-" } else { "" };
    let abs = units.unsigned_abs();
    let whole = abs / UNITS_PER_COIN as u64;
    let cents = (abs % UNITS_PER_COIN as u64) / 100_000_000;
    format!("{sign}{whole}.{cents:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table() {
        let t1 = tier_for_wei(10_000_000_000_000_000).unwrap();
        assert_eq!((t1.level, t1.seed, t1.current_max), (1, 1_000_000_000_000, 5_000_000_000_000));

        let t2 = tier_for_wei(20_000_000_000_000_000).unwrap();
        assert_eq!((t2.level, t2.seed, t2.current_max), (2, 2_000_000_000_000, 10_000_000_000_000));

        let t3 = tier_for_wei(50_000_000_000_000_000).unwrap();
        assert_eq!((t3.level, t3.seed, t3.current_max), (3, 5_000_000_000_000, 25_000_000_000_000));

        // The cap is five times the seed on every tier
        for t in [t1, t2, t3] {
            assert_eq!(t.current_max, t.seed * 5);
        }
    }

    #[test]
    fn test_off_tier_amounts_rejected() {
        assert!(tier_for_wei(0).is_none());
        assert!(tier_for_wei(10_000_000_000_000_001).is_none());
        assert!(tier_for_wei(30_000_000_000_000_000).is_none());
        assert!(tier_for_wei(100_000_000_000_000_000).is_none());
    }

    #[test]
    fn test_parse_wei() {
        assert_eq!(parse_wei("10000000000000000").unwrap(), 10_000_000_000_000_000);
        assert!(parse_wei("").is_err());
        assert!(parse_wei("12a").is_err());
        assert!(parse_wei("-5").is_err());
    }

    #[test]
    fn test_wei_to_units_truncates() {
        assert_eq!(wei_to_units(100_000_000).unwrap(), 1);
        assert_eq!(wei_to_units(199_999_999).unwrap(), 1);
        // 10^20 wei (100 whole tokens) -> 10^12 units
        assert_eq!(wei_to_units(100_000_000_000_000_000_000).unwrap(), 1_000_000_000_000);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1").unwrap(), UNITS_PER_COIN);
        assert_eq!(parse_units("0.5").unwrap(), 5_000_000_000);
        assert_eq!(parse_units("12.25").unwrap(), 122_500_000_000);
        assert_eq!(parse_units("0.0000000001").unwrap(), 1);
        assert!(parse_units("").is_err());
        assert!(parse_units("1.").is_ok());
        assert!(parse_units(".5").is_err());
        assert!(parse_units("1.00000000001").is_err());
        assert!(parse_units("-3").is_err());
        assert!(parse_units("abc").is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(0), "0.00");
        assert_eq!(format_units(UNITS_PER_COIN), "1.00");
        assert_eq!(format_units(5_000_000_000), "0.50");
        assert_eq!(format_units(122_500_000_000), "12.25");
        // Truncation, never rounding up
        assert_eq!(format_units(199_999_999), "0.01");
        assert_eq!(format_units(-122_500_000_000), "-12.25");
    }
}
