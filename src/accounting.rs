//! Total-value aggregation and deposit/withdraw routing.
//!
//! Pure functions over vault state plus live operator balances — the
//! processor reads the operator pool accounts and price feeds, this module
//! does the arithmetic. Delegate counts are small (tens), so selection stays
//! an explicit O(n) scan in registry order.

use crate::math;
use crate::state::{Vault, MAX_ASSETS, MAX_DELEGATES};

/// Snapshot of priced balances for one instruction.
///
/// `amounts` is per delegate per asset; `grand_total` includes undeployed
/// liquidity (free buffer capacity and staged native deposits) on top of the
/// deployed operator totals. Kept lean — this lives on the SBF stack.
#[derive(Debug, Clone, Copy)]
pub struct Totals {
    pub amounts: [[u64; MAX_ASSETS]; MAX_DELEGATES],
    pub delegate_totals: [u128; MAX_DELEGATES],
    pub deployed_total: u128,
    pub grand_total: u128,
    pub prices: [u64; MAX_ASSETS],
}

/// Price the full system: O(delegates x assets).
///
/// `balances[d][a]` / `native_staked[d]` come straight out of the operator
/// pool accounts; `prices[a]` out of the feeds, in registry order. A
/// registered native asset's slot carries the delegate's native stake as its
/// amount; stake with no native asset registered is priced at par and still
/// backs the shares. Undeployed value is every buffer's free capacity plus
/// the native staging balance.
pub fn aggregate_totals(
    vault: &Vault,
    balances: &[[u64; MAX_ASSETS]; MAX_DELEGATES],
    native_staked: &[u64; MAX_DELEGATES],
    prices: &[u64; MAX_ASSETS],
) -> Option<Totals> {
    let native_slot = vault
        .assets
        .iter()
        .position(|a| a.in_use == 1 && a.is_native == 1);
    let native_price = native_slot.map(|i| prices[i]).unwrap_or(math::WAD as u64);

    let mut totals = Totals {
        amounts: [[0; MAX_ASSETS]; MAX_DELEGATES],
        delegate_totals: [0; MAX_DELEGATES],
        deployed_total: 0,
        grand_total: 0,
        prices: *prices,
    };

    for (d, delegate) in vault.delegates.iter().enumerate() {
        if delegate.in_use != 1 {
            continue;
        }
        let mut delegate_total: u128 = 0;
        for (a, asset) in vault.assets.iter().enumerate() {
            if asset.in_use != 1 {
                continue;
            }
            let amount = if asset.is_native == 1 {
                native_staked[d]
            } else {
                balances[d][a]
            };
            totals.amounts[d][a] = amount;
            delegate_total = delegate_total.checked_add(math::value_of(amount, prices[a])?)?;
        }
        if native_slot.is_none() {
            delegate_total =
                delegate_total.checked_add(math::value_of(native_staked[d], native_price)?)?;
        }
        totals.delegate_totals[d] = delegate_total;
        totals.deployed_total = totals.deployed_total.checked_add(delegate_total)?;
    }

    let mut undeployed = math::value_of(vault.native_staged, native_price)?;
    for (a, asset) in vault.assets.iter().enumerate() {
        if asset.in_use != 1 {
            continue;
        }
        let free = math::value_of(asset.buffer.free_capacity(), prices[a])?;
        undeployed = undeployed.checked_add(free)?;
    }

    totals.grand_total = totals.deployed_total.checked_add(undeployed)?;
    Some(totals)
}

/// Deposit routing: single pass, first delegate whose share of total value
/// sits below its allocation threshold; if none qualify, the first delegate
/// in registry order (deterministic default).
pub fn choose_delegate_for_deposit(vault: &Vault, totals: &Totals) -> Option<u8> {
    let mut first_active = None;
    for (d, delegate) in vault.delegates.iter().enumerate() {
        if delegate.in_use != 1 {
            continue;
        }
        if first_active.is_none() {
            first_active = Some(d as u8);
        }
        // value_share < allocation, cross-multiplied to stay in integers
        let lhs = totals.delegate_totals[d].checked_mul(10_000)?;
        let rhs = totals.grand_total.checked_mul(delegate.allocation_bps as u128)?;
        if lhs < rhs {
            return Some(d as u8);
        }
    }
    first_active
}

/// Withdraw sourcing: pass 1 prefers a delegate already above its allocation
/// (rebalancing the pull) that holds enough of the target asset; pass 2 falls
/// back to any delegate holding enough. `None` if neither pass succeeds.
pub fn choose_delegate_for_withdraw(
    vault: &Vault,
    totals: &Totals,
    asset_index: u8,
    amount: u64,
) -> Option<u8> {
    let a = asset_index as usize;
    for (d, delegate) in vault.delegates.iter().enumerate() {
        if delegate.in_use != 1 || totals.amounts[d][a] < amount {
            continue;
        }
        let lhs = totals.delegate_totals[d].checked_mul(10_000)?;
        let rhs = totals.grand_total.checked_mul(delegate.allocation_bps as u128)?;
        if lhs > rhs {
            return Some(d as u8);
        }
    }
    vault
        .delegates
        .iter()
        .enumerate()
        .find(|(d, del)| del.in_use == 1 && totals.amounts[*d][a] >= amount)
        .map(|(d, _)| d as u8)
}

/// Total value the system holds in one asset: delegate balances plus free
/// buffer capacity, and for the native asset the staged deposits too. Drives
/// the per-asset cap.
pub fn asset_total_value(vault: &Vault, totals: &Totals, asset_index: u8) -> Option<u128> {
    let a = asset_index as usize;
    let price = totals.prices[a];
    let asset = vault.asset(asset_index)?;
    let mut value = math::value_of(asset.buffer.free_capacity(), price)?;
    if asset.is_native == 1 {
        value = value.checked_add(math::value_of(vault.native_staged, price)?)?;
    }
    for (d, delegate) in vault.delegates.iter().enumerate() {
        if delegate.in_use != 1 {
            continue;
        }
        value = value.checked_add(math::value_of(totals.amounts[d][a], price)?)?;
    }
    Some(value)
}

/// Total system holdings of one asset: every delegate's live balance plus
/// unpromised buffer liquidity (and staged deposits for native). A withdrawal
/// that exceeds this can never be satisfied and is rejected instead of queued.
pub fn total_asset_holdings(vault: &Vault, totals: &Totals, asset_index: u8) -> Option<u64> {
    let a = asset_index as usize;
    let asset = vault.asset(asset_index)?;
    let mut sum = asset.buffer.free_capacity();
    if asset.is_native == 1 {
        sum = sum.checked_add(vault.native_staged)?;
    }
    for (d, delegate) in vault.delegates.iter().enumerate() {
        if delegate.in_use != 1 {
            continue;
        }
        sum = sum.checked_add(totals.amounts[d][a])?;
    }
    Some(sum)
}

/// Quote a share burn against the current snapshot: redeem value and the
/// token amount it converts to for the target asset.
pub fn quote_redeem(
    vault: &Vault,
    totals: &Totals,
    shares: u64,
    asset_index: u8,
) -> Option<(u128, u64)> {
    let value = math::calculate_redeem_amount(
        shares as u128,
        vault.total_shares as u128,
        totals.grand_total,
    )?;
    let amount = math::amount_for_value(value, totals.prices[asset_index as usize])?;
    Some((value, amount))
}
