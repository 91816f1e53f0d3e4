//! Kani formal verification for restake-vault share, fee, and buffer math.
//!
//! ZERO dependencies. Pure Rust. CBMC-friendly.
//!
//! KEY DESIGN DECISION: Functions use u32 inputs / u64 intermediates and a
//! small WAD. The production code uses u64/u128 with an e18 WAD, but the
//! arithmetic properties (conservation, monotonicity, bounds, buffer
//! invariants) are scale-invariant. Narrow types keep SAT formulas tractable
//! for CBMC (<60s per proof).
//!
//! Run all:   cargo kani --lib
//! Run one:   cargo kani --harness proof_bootstrap_exact

/// Fixed-point scale (production uses 1e18; scale-invariant properties only).
pub const WAD: u64 = 1_000;
pub const BPS_DENOM: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════
// Share math (u32/u64 mirror of restake-vault/src/math.rs)
// Arithmetic is IDENTICAL — just narrower types for CBMC tractability.
// ═══════════════════════════════════════════════════════════════

/// Shares minted for a deposit. Bootstrap 1:1; otherwise the deposit buys an
/// inflation fraction of the post-deposit supply, rounded down.
pub fn mint_amount(current_value: u32, new_value: u32, supply: u32) -> Option<u64> {
    if current_value == 0 || supply == 0 {
        return Some(new_value as u64);
    }
    let combined = (current_value as u64).checked_add(new_value as u64)?;
    let inflation = WAD.checked_mul(new_value as u64)?.checked_div(combined)?;
    let denom = WAD.checked_sub(inflation)?;
    if denom == 0 {
        return None;
    }
    let new_supply = (supply as u64).checked_mul(WAD)?.checked_div(denom)?;
    new_supply.checked_sub(supply as u64)
}

/// Value redeemed for burning shares. Proportional, rounded down.
pub fn redeem_amount(shares: u32, supply: u32, value: u32) -> Option<u32> {
    if supply == 0 {
        return None;
    }
    let v = (value as u64)
        .checked_mul(shares as u64)?
        .checked_div(supply as u64)?;
    Some(v as u32)
}

/// Instant-exit fee rate, linear between min (untouched) and max (at floor).
pub fn fee_bps(free_after: u32, target: u32, floor: u32, min_fee: u16, max_fee: u16) -> u16 {
    if max_fee <= min_fee {
        return min_fee;
    }
    if target <= floor || free_after <= floor {
        return max_fee;
    }
    let span = (target - floor) as u64;
    let headroom = (free_after.min(target) - floor) as u64;
    let spread = (max_fee - min_fee) as u64;
    let discount = spread * headroom / span;
    max_fee - discount as u16
}

/// Fee taken from an amount, rounded up (pool-favoring).
pub fn fee_amount(amount: u32, bps: u16) -> u64 {
    let num = (amount as u64) * (bps as u64);
    num.div_ceil(BPS_DENOM)
}

// ═══════════════════════════════════════════════════════════════
// Buffer deficit ledger (u32 mirror of state::BufferState)
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Copy)]
pub struct Buffer {
    pub available: u32,
    pub claim_reserve: u32,
    pub queue_to_fill: u32,
    pub queue_filled: u32,
}

impl Buffer {
    pub fn free_capacity(&self) -> u32 {
        self.available.saturating_sub(self.claim_reserve)
    }

    pub fn deficit(&self) -> u32 {
        self.queue_to_fill.saturating_sub(self.queue_filled)
    }

    /// Reserve what free capacity covers, queue the shortfall.
    /// Returns (reserved, fill_at watermark; 0 when fully covered).
    pub fn admit(&mut self, amount: u32) -> Option<(u32, u32)> {
        let free = self.free_capacity();
        if amount <= free {
            self.claim_reserve = self.claim_reserve.checked_add(amount)?;
            Some((amount, 0))
        } else {
            let shortfall = amount - free;
            self.claim_reserve = self.claim_reserve.checked_add(free)?;
            self.queue_to_fill = self.queue_to_fill.checked_add(shortfall)?;
            Some((free, self.queue_to_fill))
        }
    }

    /// Pay the deficit down first, remainder is free capacity.
    pub fn apply_fill(&mut self, amount: u32) -> Option<(u32, u32)> {
        let to_deficit = amount.min(self.deficit());
        self.queue_filled = self.queue_filled.checked_add(to_deficit)?;
        self.claim_reserve = self.claim_reserve.checked_add(to_deficit)?;
        self.available = self.available.checked_add(amount)?;
        Some((to_deficit, amount - to_deficit))
    }

    /// Release a reservation, paying out at most what was reserved.
    pub fn release_claim(&mut self, reserved: u32, payout: u32) -> Option<()> {
        if payout > reserved {
            return None;
        }
        self.claim_reserve = self.claim_reserve.checked_sub(reserved)?;
        self.available = self.available.checked_sub(payout)?;
        Some(())
    }

    fn invariant(&self) -> bool {
        self.claim_reserve <= self.available && self.queue_filled <= self.queue_to_fill
    }
}

// ═══════════════════════════════════════════════════════════════
// KANI PROOFS
// ═══════════════════════════════════════════════════════════════

#[cfg(kani)]
mod proofs {
    use super::*;

    // ── 1. Share conservation ──

    /// Bootstrap mints exactly the deposited value.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_bootstrap_exact() {
        let value: u32 = kani::any();
        assert_eq!(mint_amount(0, value, 0), Some(value as u64));
        assert_eq!(mint_amount(0, value, 7), Some(value as u64));
        assert_eq!(mint_amount(7, value, 0), Some(value as u64));
    }

    /// Mint then full redeem: can't get back more value than deposited.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_mint_redeem_no_inflation() {
        let current: u32 = kani::any();
        let supply: u32 = kani::any();
        let deposit: u32 = kani::any();
        kani::assume(current > 0 && current < 200);
        kani::assume(supply > 0 && supply < 200);
        kani::assume(deposit > 0 && deposit < 200);

        let minted = match mint_amount(current, deposit, supply) {
            Some(m) if m > 0 && m <= u32::MAX as u64 => m as u32,
            _ => return,
        };
        let back = match redeem_amount(minted, supply + minted, current + deposit) {
            Some(v) => v,
            None => return,
        };
        assert!(back <= deposit);
    }

    /// Minting never lowers NAV per share for existing holders.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_mint_no_dilution() {
        let current: u32 = kani::any();
        let supply: u32 = kani::any();
        let deposit: u32 = kani::any();
        kani::assume(current > 0 && current < 100);
        kani::assume(supply > 0 && supply < 100);
        kani::assume(deposit > 0 && deposit < 100);

        let minted = match mint_amount(current, deposit, supply) {
            Some(m) => m,
            None => return,
        };
        let new_supply = supply as u64 + minted;
        let new_value = (current + deposit) as u64;
        // current/supply <= new_value/new_supply, cross-multiplied
        assert!((current as u64) * new_supply <= new_value * (supply as u64));
    }

    /// Full-supply redeem drains exactly the value; partial never exceeds it.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_redeem_bounded() {
        let shares: u32 = kani::any();
        let supply: u32 = kani::any();
        let value: u32 = kani::any();
        kani::assume(supply > 0 && supply < 1_000);
        kani::assume(shares <= supply);
        kani::assume(value < 1_000);

        let redeemed = redeem_amount(shares, supply, value).unwrap();
        assert!(redeemed <= value);
        if shares == supply {
            assert_eq!(redeemed, value);
        }
    }

    // ── 2. Arithmetic safety ──

    /// mint_amount never panics for any inputs.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_mint_no_panic() {
        let current: u32 = kani::any();
        let new: u32 = kani::any();
        let supply: u32 = kani::any();
        let _ = mint_amount(current, new, supply);
    }

    /// redeem_amount never panics for any inputs.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_redeem_no_panic() {
        let shares: u32 = kani::any();
        let supply: u32 = kani::any();
        let value: u32 = kani::any();
        let _ = redeem_amount(shares, supply, value);
    }

    /// Fee helpers never panic for any inputs.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_fee_no_panic() {
        let free_after: u32 = kani::any();
        let target: u32 = kani::any();
        let floor: u32 = kani::any();
        let min_fee: u16 = kani::any();
        let max_fee: u16 = kani::any();
        let _ = fee_bps(free_after, target, floor, min_fee, max_fee);

        let amount: u32 = kani::any();
        let bps: u16 = kani::any();
        let _ = fee_amount(amount, bps);
    }

    // ── 3. Fairness ──

    /// Equal deposits mint equal shares (deterministic).
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_equal_deposits_equal_shares() {
        let current: u32 = kani::any();
        let supply: u32 = kani::any();
        let amount: u32 = kani::any();
        assert_eq!(
            mint_amount(current, amount, supply),
            mint_amount(current, amount, supply)
        );
    }

    /// Larger deposit never mints fewer shares.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_larger_deposit_more_shares() {
        let current: u32 = kani::any();
        let supply: u32 = kani::any();
        let small: u32 = kani::any();
        let large: u32 = kani::any();
        kani::assume(current > 0 && current < 100);
        kani::assume(supply > 0 && supply < 100);
        kani::assume(small > 0 && large > small && large < 100);

        let m_small = match mint_amount(current, small, supply) {
            Some(v) => v,
            None => return,
        };
        let m_large = match mint_amount(current, large, supply) {
            Some(v) => v,
            None => return,
        };
        assert!(m_large >= m_small);
    }

    /// Burning more shares never redeems less value.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_larger_burn_more_value() {
        let supply: u32 = kani::any();
        let value: u32 = kani::any();
        let small: u32 = kani::any();
        let large: u32 = kani::any();
        kani::assume(supply > 0 && supply < 1_000);
        kani::assume(value < 1_000);
        kani::assume(small > 0 && large > small && large <= supply);

        let r_small = redeem_amount(small, supply, value).unwrap();
        let r_large = redeem_amount(large, supply, value).unwrap();
        assert!(r_large >= r_small);
    }

    // ── 4. Fee bounds ──

    /// The fee rate stays inside [min, max] whenever min ≤ max.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_fee_bps_in_band() {
        let free_after: u32 = kani::any();
        let target: u32 = kani::any();
        let floor: u32 = kani::any();
        let min_fee: u16 = kani::any();
        let max_fee: u16 = kani::any();
        kani::assume(min_fee <= max_fee);

        let fee = fee_bps(free_after, target, floor, min_fee, max_fee);
        assert!(fee >= min_fee && fee <= max_fee);
    }

    /// A shallower drawdown never pays a higher fee.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_fee_monotone_in_drawdown() {
        let target: u32 = kani::any();
        let floor: u32 = kani::any();
        let lo: u32 = kani::any();
        let hi: u32 = kani::any();
        let min_fee: u16 = kani::any();
        let max_fee: u16 = kani::any();
        kani::assume(floor < target && target < 1_000);
        kani::assume(lo <= hi);
        kani::assume(min_fee <= max_fee);

        let fee_lo = fee_bps(lo, target, floor, min_fee, max_fee);
        let fee_hi = fee_bps(hi, target, floor, min_fee, max_fee);
        assert!(fee_lo >= fee_hi);
    }

    /// The fee never exceeds the amount and rounds against the exiter.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_fee_amount_bounds() {
        let amount: u32 = kani::any();
        let bps: u16 = kani::any();
        kani::assume(bps <= 10_000);

        let fee = fee_amount(amount, bps);
        assert!(fee <= amount as u64);
        assert!(fee * 10_000 >= (amount as u64) * (bps as u64));
    }

    // ── 5. Buffer deficit ledger ──

    fn any_buffer() -> Buffer {
        let b = Buffer {
            available: kani::any(),
            claim_reserve: kani::any(),
            queue_to_fill: kani::any(),
            queue_filled: kani::any(),
        };
        kani::assume(b.available < 10_000);
        kani::assume(b.claim_reserve <= b.available);
        kani::assume(b.queue_to_fill < 10_000);
        kani::assume(b.queue_filled <= b.queue_to_fill);
        b
    }

    /// Admission preserves the buffer invariants.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_admit_preserves_invariants() {
        let mut b = any_buffer();
        let amount: u32 = kani::any();
        kani::assume(amount < 10_000);

        if b.admit(amount).is_some() {
            assert!(b.invariant());
        }
    }

    /// A fill splits exactly between deficit and free capacity, and never
    /// overshoots the deficit counter.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_fill_splits_exactly() {
        let mut b = any_buffer();
        let amount: u32 = kani::any();
        kani::assume(amount < 10_000);

        let deficit_before = b.deficit();
        if let Some((to_deficit, to_free)) = b.apply_fill(amount) {
            assert_eq!(to_deficit + to_free, amount);
            assert_eq!(to_deficit, amount.min(deficit_before));
            assert!(b.invariant());
        }
    }

    /// Admission followed by a covering fill funds the watermark.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_fill_funds_watermark() {
        let mut b = any_buffer();
        let amount: u32 = kani::any();
        kani::assume(amount > 0 && amount < 1_000);

        let (_, fill_at) = match b.admit(amount) {
            Some(v) => v,
            None => return,
        };
        let deficit = b.deficit();
        if b.apply_fill(deficit).is_some() {
            assert!(fill_at <= b.queue_filled);
            assert_eq!(b.deficit(), 0);
        }
    }

    /// Releasing a claim preserves the invariants when the reservation was
    /// actually held.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_release_preserves_invariants() {
        let mut b = any_buffer();
        let reserved: u32 = kani::any();
        let payout: u32 = kani::any();
        kani::assume(reserved <= b.claim_reserve);

        if b.release_claim(reserved, payout).is_some() {
            assert!(payout <= reserved);
            assert!(b.invariant());
        }
    }

    /// A reduced payout leaves the surplus as free capacity.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_reduced_payout_frees_surplus() {
        let mut b = any_buffer();
        let reserved: u32 = kani::any();
        let payout: u32 = kani::any();
        kani::assume(reserved <= b.claim_reserve);
        kani::assume(payout <= reserved);

        let free_before = b.free_capacity();
        if b.release_claim(reserved, payout).is_some() {
            assert_eq!(b.free_capacity(), free_before + (reserved - payout));
        }
    }

    /// The cumulative counters never decrease across any operation.
    #[kani::proof]
    #[kani::unwind(33)]
    fn proof_counters_monotone() {
        let mut b = any_buffer();
        let (tf0, qf0) = (b.queue_to_fill, b.queue_filled);

        let op: u8 = kani::any();
        let amount: u32 = kani::any();
        kani::assume(amount < 10_000);
        match op % 3 {
            0 => {
                let _ = b.admit(amount);
            }
            1 => {
                let _ = b.apply_fill(amount);
            }
            _ => {
                let payout: u32 = kani::any();
                let _ = b.release_claim(amount, payout);
            }
        }
        assert!(b.queue_to_fill >= tf0);
        assert!(b.queue_filled >= qf0);
    }
}
