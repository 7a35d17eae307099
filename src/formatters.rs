use alloy_primitives::U256;
use chrono::{TimeZone, Utc};

// Helpers that turn raw contract values into something fit for a response.

const WEI_PER_COIN: f64 = 1e18;

/// Converts an 18-decimal fixed-point amount (wei, or the RPL equivalent) into
/// a coin amount rounded to `decimals_to_show` places.
///
/// The amount goes through `f64`, so values wider than 53 bits of mantissa
/// lose precision. That is fine for display.
pub fn format_coin_value(amount: U256, decimals_to_show: u32) -> f64 {
    let converted = amount.to_string().parse::<f64>().unwrap_or_default() / WEI_PER_COIN;
    round_to(converted, decimals_to_show)
}

/// Rounds to `decimals` places, half away from zero on the decimal digits.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    format!("{:.*}", decimals as usize, value).parse().unwrap_or(value)
}

/// Turns a registration timestamp into a date like "March 3, 2023".
pub fn format_registration_date(ts: u64) -> String {
    let datetime = i64::try_from(ts)
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

    if let Some(dt) = datetime {
        dt.format("%B %-d, %Y").to_string()
    } else {
        // Fallback for invalid timestamps.
        "Invalid Timestamp".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_wei_to_coins() {
        assert_eq!(format_coin_value(U256::from(1_500_000_000_000_000_000u128), 2), 1.5);
        assert_eq!(format_coin_value(U256::ZERO, 3), 0.0);
        assert_eq!(format_coin_value(U256::from(32_000_000_000_000_000_000u128), 0), 32.0);
    }

    #[test]
    fn rounds_to_requested_decimals() {
        assert_eq!(format_coin_value(U256::from(1_234_567_890_000_000_000u128), 4), 1.2346);
        assert_eq!(format_coin_value(U256::from(140_000_000_000_000_000u128), 2), 0.14);
        assert_eq!(format_coin_value(U256::from(999_999_999_999_999u128), 2), 0.0);
    }

    #[test]
    fn accepts_amounts_wider_than_u128() {
        let huge = U256::from(10u8).pow(U256::from(40u8));
        let coins = format_coin_value(huge, 0);
        assert!((coins - 1e22).abs() / 1e22 < 1e-12);
    }

    #[test]
    fn formats_registration_dates() {
        assert_eq!(format_registration_date(1_677_801_600), "March 3, 2023");
        assert_eq!(format_registration_date(u64::MAX), "Invalid Timestamp");
    }
}
