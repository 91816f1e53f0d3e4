//! Kani formal verification proofs for the vault share and fee math.
//!
//! Proves critical safety properties on the PURE MATH layer:
//! 1. Share conservation: no value creation through mint/redeem
//! 2. Arithmetic safety: no overflow/panic at any input
//! 3. Fairness: monotonicity, determinism
//! 4. Fee bounds: fee stays inside the configured band
//!
//! Run all:  cargo kani --tests
//! Run one:  cargo kani --harness <name>

#[cfg(kani)]
mod kani_proofs {
    use restake_vault::math::{
        calculate_mint_amount, calculate_redeem_amount, drawdown_floor, fee_amount,
        instant_fee_bps,
    };

    // ═══════════════════════════════════════════════════════════
    // 1. Share Conservation
    // ═══════════════════════════════════════════════════════════

    /// PROOF: First depositor mints exactly the deposited value.
    #[kani::proof]
    fn proof_bootstrap_exact() {
        let value: u128 = kani::any();
        kani::assume(value > 0);

        assert_eq!(calculate_mint_amount(0, value, 0), Some(value));
        assert_eq!(calculate_mint_amount(0, value, 123), Some(value));
        assert_eq!(calculate_mint_amount(123, value, 0), Some(value));
    }

    /// PROOF: Mint then immediate full redeem returns ≤ deposited value.
    #[kani::proof]
    fn proof_mint_redeem_no_inflation() {
        let current: u128 = kani::any();
        let supply: u128 = kani::any();
        let deposit: u128 = kani::any();

        kani::assume(current > 0 && current <= 1_000_000);
        kani::assume(supply > 0 && supply <= 1_000_000);
        kani::assume(deposit > 0 && deposit <= 1_000_000);

        let minted = match calculate_mint_amount(current, deposit, supply) {
            Some(m) if m > 0 => m,
            _ => return,
        };
        let back = match calculate_redeem_amount(minted, supply + minted, current + deposit) {
            Some(v) => v,
            None => return,
        };
        assert!(back <= deposit, "INFLATION: deposited {} redeemed {}", deposit, back);
    }

    /// PROOF: Redeem never exceeds the total value, and redeeming the whole
    /// supply drains it exactly.
    #[kani::proof]
    fn proof_redeem_bounded() {
        let shares: u128 = kani::any();
        let supply: u128 = kani::any();
        let value: u128 = kani::any();

        kani::assume(supply > 0 && supply <= 1_000_000);
        kani::assume(shares <= supply);
        kani::assume(value <= 1_000_000);

        let redeemed = calculate_redeem_amount(shares, supply, value).unwrap();
        assert!(redeemed <= value);
        if shares == supply {
            assert_eq!(redeemed, value);
        }
    }

    // ═══════════════════════════════════════════════════════════
    // 2. Arithmetic Safety — No Panics
    // ═══════════════════════════════════════════════════════════

    /// PROOF: calculate_mint_amount never panics for bounded inputs.
    #[kani::proof]
    fn proof_mint_no_panic() {
        let current: u128 = kani::any();
        let new: u128 = kani::any();
        let supply: u128 = kani::any();
        kani::assume(current <= u64::MAX as u128);
        kani::assume(new <= u64::MAX as u128);
        kani::assume(supply <= u64::MAX as u128);
        let _ = calculate_mint_amount(current, new, supply);
    }

    /// PROOF: calculate_redeem_amount never panics.
    #[kani::proof]
    fn proof_redeem_no_panic() {
        let shares: u128 = kani::any();
        let supply: u128 = kani::any();
        let value: u128 = kani::any();
        kani::assume(shares <= u64::MAX as u128);
        kani::assume(value <= u64::MAX as u128);
        let _ = calculate_redeem_amount(shares, supply, value);
    }

    /// PROOF: the fee helpers never panic for any inputs.
    #[kani::proof]
    fn proof_fee_no_panic() {
        let amount: u64 = kani::any();
        let bps: u16 = kani::any();
        let _ = fee_amount(amount, bps);

        let target: u64 = kani::any();
        let limit: u16 = kani::any();
        let free_after: u64 = kani::any();
        let min_fee: u16 = kani::any();
        let max_fee: u16 = kani::any();
        let floor = drawdown_floor(target, limit);
        let _ = instant_fee_bps(free_after, target, floor, min_fee, max_fee);
    }

    // ═══════════════════════════════════════════════════════════
    // 3. Fairness
    // ═══════════════════════════════════════════════════════════

    /// PROOF: Larger deposit never mints fewer shares.
    #[kani::proof]
    fn proof_larger_deposit_more_shares() {
        let current: u128 = kani::any();
        let supply: u128 = kani::any();
        let small: u128 = kani::any();
        let large: u128 = kani::any();

        kani::assume(current > 0 && current <= 10_000);
        kani::assume(supply > 0 && supply <= 10_000);
        kani::assume(small > 0 && large > small && large <= 10_000);

        let m_small = match calculate_mint_amount(current, small, supply) {
            Some(v) => v,
            None => return,
        };
        let m_large = match calculate_mint_amount(current, large, supply) {
            Some(v) => v,
            None => return,
        };
        assert!(m_large >= m_small);
    }

    /// PROOF: Redeem is monotone in shares burned.
    #[kani::proof]
    fn proof_larger_burn_more_value() {
        let supply: u128 = kani::any();
        let value: u128 = kani::any();
        let small: u128 = kani::any();
        let large: u128 = kani::any();

        kani::assume(supply > 0 && supply <= 1_000_000);
        kani::assume(value <= 1_000_000);
        kani::assume(small > 0 && large > small && large <= supply);

        let r_small = calculate_redeem_amount(small, supply, value).unwrap();
        let r_large = calculate_redeem_amount(large, supply, value).unwrap();
        assert!(r_large >= r_small);
    }

    // ═══════════════════════════════════════════════════════════
    // 4. Fee Bounds
    // ═══════════════════════════════════════════════════════════

    /// PROOF: the fee rate stays inside [min, max] whenever min ≤ max.
    #[kani::proof]
    fn proof_fee_bps_in_band() {
        let target: u64 = kani::any();
        let limit: u16 = kani::any();
        let free_after: u64 = kani::any();
        let min_fee: u16 = kani::any();
        let max_fee: u16 = kani::any();

        kani::assume(limit <= 10_000);
        kani::assume(min_fee <= max_fee);

        let floor = drawdown_floor(target, limit);
        let fee = instant_fee_bps(free_after, target, floor, min_fee, max_fee);
        assert!(fee >= min_fee && fee <= max_fee);
    }

    /// PROOF: fee_amount never exceeds the amount for bps ≤ 10_000, and
    /// rounds against the exiter.
    #[kani::proof]
    fn proof_fee_amount_bounds() {
        let amount: u64 = kani::any();
        let bps: u16 = kani::any();
        kani::assume(bps <= 10_000);

        let fee = fee_amount(amount, bps).unwrap();
        assert!(fee <= amount);
        assert!((fee as u128) * 10_000 >= (amount as u128) * (bps as u128));
    }
}
