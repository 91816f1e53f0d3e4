//! Price feed reads and update validation.
//!
//! Feeds are program-owned PDAs written by a feed authority (a bridge relayer
//! on remote deployments). Reads enforce staleness and positivity; writes
//! enforce monotonic timestamps, no future-dating, and a bounded step from
//! the previous price.

use solana_program::{account_info::AccountInfo, program_error::ProgramError, pubkey::Pubkey};

use crate::error::VaultError;
use crate::state::{PriceFeed, PRICE_FEED_SIZE};

/// Tolerated clock skew for inbound update timestamps (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Validity checks shared by every read of a feed.
pub fn check_price(feed: &PriceFeed, now: i64, max_age_secs: u64) -> Result<u64, VaultError> {
    if feed.is_initialized != 1 || feed.price_e18 == 0 {
        return Err(VaultError::InvalidPrice);
    }
    let age = now.saturating_sub(feed.updated_at);
    if age > max_age_secs as i64 {
        return Err(VaultError::OracleStale);
    }
    Ok(feed.price_e18)
}

/// Read a price feed account and return its validated price.
///
/// The caller has already matched the account key against the registry;
/// ownership by this program is checked here.
pub fn read_price_account(
    feed_ai: &AccountInfo,
    program_id: &Pubkey,
    now: i64,
    max_age_secs: u64,
) -> Result<u64, ProgramError> {
    if feed_ai.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let data = feed_ai.try_borrow_data()?;
    if data.len() < PRICE_FEED_SIZE {
        return Err(ProgramError::InvalidAccountData);
    }
    let feed: &PriceFeed = bytemuck::from_bytes(&data[..PRICE_FEED_SIZE]);
    Ok(check_price(feed, now, max_age_secs)?)
}

/// Gate an inbound price update.
///
/// Rejects zero prices, non-monotonic or future-dated timestamps, and any
/// step that diverges from the last stored price by more than the feed's
/// configured bps bound (skipped while the feed has no price yet).
pub fn validate_push(
    feed: &PriceFeed,
    price_e18: u64,
    timestamp: i64,
    now: i64,
) -> Result<(), VaultError> {
    if price_e18 == 0 {
        return Err(VaultError::InvalidPrice);
    }
    if timestamp <= feed.updated_at {
        return Err(VaultError::StalePriceUpdate);
    }
    if timestamp > now.saturating_add(MAX_FUTURE_SKEW_SECS) {
        return Err(VaultError::FuturePriceUpdate);
    }
    if feed.price_e18 > 0 {
        let old = feed.price_e18 as u128;
        let diff = (price_e18 as u128).abs_diff(old);
        // diff / old > max_deviation_bps / 10_000, cross-multiplied
        if diff * 10_000 > old * feed.max_deviation_bps as u128 {
            return Err(VaultError::PriceDeviation);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    fn feed(price: u64, updated_at: i64, max_dev_bps: u16) -> PriceFeed {
        let mut f = PriceFeed::zeroed();
        f.is_initialized = 1;
        f.price_e18 = price;
        f.updated_at = updated_at;
        f.max_deviation_bps = max_dev_bps;
        f
    }

    #[test]
    fn test_fresh_price_reads() {
        let f = feed(1_000, 100, 500);
        assert_eq!(check_price(&f, 150, 3_600), Ok(1_000));
    }

    #[test]
    fn test_stale_price_rejected() {
        let f = feed(1_000, 100, 500);
        assert_eq!(check_price(&f, 100 + 3_601, 3_600), Err(VaultError::OracleStale));
    }

    #[test]
    fn test_zero_price_rejected() {
        let f = feed(0, 100, 500);
        assert_eq!(check_price(&f, 100, 3_600), Err(VaultError::InvalidPrice));
    }

    #[test]
    fn test_uninitialized_feed_rejected() {
        let mut f = feed(1_000, 100, 500);
        f.is_initialized = 0;
        assert_eq!(check_price(&f, 100, 3_600), Err(VaultError::InvalidPrice));
    }

    #[test]
    fn test_push_monotonic_timestamp() {
        let f = feed(1_000, 100, 500);
        assert_eq!(
            validate_push(&f, 1_010, 100, 200),
            Err(VaultError::StalePriceUpdate)
        );
        assert_eq!(validate_push(&f, 1_010, 101, 200), Ok(()));
    }

    #[test]
    fn test_push_future_dated_rejected() {
        let f = feed(1_000, 100, 500);
        assert_eq!(
            validate_push(&f, 1_010, 200 + MAX_FUTURE_SKEW_SECS + 1, 200),
            Err(VaultError::FuturePriceUpdate)
        );
    }

    #[test]
    fn test_push_deviation_bound() {
        // 5% bound: 1000 → 1050 is exactly at the bound, 1051 is over
        let f = feed(1_000, 100, 500);
        assert_eq!(validate_push(&f, 1_050, 150, 200), Ok(()));
        assert_eq!(
            validate_push(&f, 1_051, 150, 200),
            Err(VaultError::PriceDeviation)
        );
        // symmetric downward
        assert_eq!(validate_push(&f, 950, 150, 200), Ok(()));
        assert_eq!(
            validate_push(&f, 949, 150, 200),
            Err(VaultError::PriceDeviation)
        );
    }

    #[test]
    fn test_first_push_skips_deviation() {
        let f = PriceFeed::zeroed();
        assert_eq!(validate_push(&f, 123_456, 10, 20), Ok(()));
    }

    #[test]
    fn test_push_zero_price_rejected() {
        let f = feed(1_000, 100, 500);
        assert_eq!(validate_push(&f, 0, 150, 200), Err(VaultError::InvalidPrice));
    }
}
