//! Pure share-pricing and fee math — extracted for Kani formal verification.
//!
//! No Solana/Pubkey dependencies. Just arithmetic.
//! Values are u128 in e18-aware fixed point; token amounts are u64 base units.

/// Fixed-point scale for prices and the mint inflation fraction.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator.
pub const BPS_DENOM: u64 = 10_000;

/// Value of `amount` base units at `price_e18` (value per base unit, e18).
///
/// `value = amount * price / WAD`, rounded down.
pub fn value_of(amount: u64, price_e18: u64) -> Option<u128> {
    (amount as u128)
        .checked_mul(price_e18 as u128)?
        .checked_div(WAD)
}

/// Token base units worth `value` at `price_e18`. Rounds DOWN (pool-favoring).
///
/// Returns `None` on zero price or if the result exceeds u64.
pub fn amount_for_value(value: u128, price_e18: u64) -> Option<u64> {
    if price_e18 == 0 {
        return None;
    }
    let amount = value.checked_mul(WAD)?.checked_div(price_e18 as u128)?;
    if amount > u64::MAX as u128 {
        None
    } else {
        Some(amount as u64)
    }
}

/// Shares to mint for a deposit adding `new_value` to a pool currently worth
/// `current_value` with `existing_supply` shares outstanding.
///
/// # Invariant
/// Bootstrap (`current_value == 0 || existing_supply == 0`): mints `new_value`
/// 1:1. Otherwise the deposit buys an inflation fraction
/// `f = new / (current + new)` of the post-deposit supply:
/// `minted = supply * WAD / (WAD - f*WAD) - supply` (rounded down).
///
/// Returns `None` on overflow. A result of 0 is returned as `Some(0)`;
/// callers reject it (`ZeroMintAmount`) — this also keeps dust deposits from
/// gaming the bootstrap branch.
pub fn calculate_mint_amount(
    current_value: u128,
    new_value: u128,
    existing_supply: u128,
) -> Option<u128> {
    if current_value == 0 || existing_supply == 0 {
        return Some(new_value);
    }
    let combined = current_value.checked_add(new_value)?;
    let inflation = WAD.checked_mul(new_value)?.checked_div(combined)?;
    // inflation < WAD whenever new_value < combined, which holds for combined > 0
    let denom = WAD.checked_sub(inflation)?;
    if denom == 0 {
        return None;
    }
    let new_supply = existing_supply.checked_mul(WAD)?.checked_div(denom)?;
    new_supply.checked_sub(existing_supply)
}

/// Value redeemed for burning `shares` out of `total_supply` against
/// `current_value`. Proportional, rounded down.
///
/// Returns `None` on zero supply or overflow. A result of 0 is `Some(0)`;
/// callers reject it (`ZeroRedeemAmount`).
pub fn calculate_redeem_amount(
    shares: u128,
    total_supply: u128,
    current_value: u128,
) -> Option<u128> {
    if total_supply == 0 {
        return None;
    }
    current_value.checked_mul(shares)?.checked_div(total_supply)
}

/// Drawdown floor for an instant withdrawal: `target * limit_bps / 10_000`.
pub fn drawdown_floor(target: u64, drawdown_limit_bps: u16) -> u64 {
    ((target as u128) * (drawdown_limit_bps as u128) / (BPS_DENOM as u128)) as u64
}

/// Instant-withdraw fee rate in bps, linear in remaining buffer capacity.
///
/// `remaining = (free_after - floor) / (target - floor)`:
/// buffer untouched (`free_after == target`) → `min_fee_bps`;
/// buffer drawn to the floor (`free_after == floor`) → `max_fee_bps` exactly.
/// Degenerate targets (`target <= floor`) charge `max_fee_bps`.
pub fn instant_fee_bps(
    free_after: u64,
    target: u64,
    floor: u64,
    min_fee_bps: u16,
    max_fee_bps: u16,
) -> u16 {
    if max_fee_bps <= min_fee_bps {
        return min_fee_bps;
    }
    if target <= floor || free_after <= floor {
        return max_fee_bps;
    }
    let span = (target - floor) as u128;
    let headroom = (free_after.min(target) - floor) as u128;
    let spread = (max_fee_bps - min_fee_bps) as u128;
    // rounds the discount down, i.e. the fee up
    let discount = spread * headroom / span;
    max_fee_bps - discount as u16
}

/// Fee taken from `amount` at `fee_bps`. Rounds UP (pool-favoring).
pub fn fee_amount(amount: u64, fee_bps: u16) -> Option<u64> {
    let num = (amount as u128).checked_mul(fee_bps as u128)?;
    let fee = num.div_ceil(BPS_DENOM as u128);
    if fee > u64::MAX as u128 {
        None
    } else {
        Some(fee as u64)
    }
}
