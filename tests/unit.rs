//! Unit tests for vault state: buffer admission/fill/claim lifecycle,
//! withdraw ledger bookkeeping, registry views, and pause/cooldown logic.

use bytemuck::Zeroable;
use solana_program::{
    account_info::AccountInfo, program_option::COption, program_pack::Pack, pubkey::Pubkey,
    system_program,
};
use spl_token::state::{Account as TokenAccount, AccountState};

use restake_vault::error::VaultError;
use restake_vault::math;
use restake_vault::processor::verify_claim_destination;
use restake_vault::state::{
    BufferState, RiskParams, Vault, WithdrawLedger, WithdrawRequest, MAX_REQUESTS,
    PAUSE_CLAIM, PAUSE_DEPOSIT, PAUSE_WITHDRAW,
};

// ═══════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════

fn buffer(target: u64, available: u64) -> BufferState {
    let mut b = BufferState::zeroed();
    b.target = target;
    b.available = available;
    b
}

fn request_for(owner: u8, shares: u64, amount: u64) -> WithdrawRequest {
    let mut r = WithdrawRequest::zeroed();
    r.owner = [owner; 32];
    r.shares = shares;
    r.amount = amount;
    r
}

// ═══════════════════════════════════════════════════════════════
// Buffer admission
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_admit_fully_covered() {
    let mut b = buffer(10, 10);
    let adm = b.admit(4).unwrap();
    assert_eq!(adm.reserved, 4);
    assert!(!adm.queued);
    assert_eq!(b.claim_reserve, 4);
    assert_eq!(b.free_capacity(), 6);
    assert_eq!(b.deficit(), 0);
}

#[test]
fn test_admit_queues_shortfall() {
    // Buffer holds 2, request is 5: reserve the 2, queue 3
    let mut b = buffer(10, 2);
    let adm = b.admit(5).unwrap();
    assert_eq!(adm.reserved, 2);
    assert!(adm.queued);
    assert_eq!(adm.fill_at, 3);
    assert_eq!(b.claim_reserve, 2);
    assert_eq!(b.free_capacity(), 0);
    assert_eq!(b.deficit(), 3);
}

#[test]
fn test_admit_exact_boundary_not_queued() {
    let mut b = buffer(10, 5);
    let adm = b.admit(5).unwrap();
    assert!(!adm.queued);
    assert_eq!(b.free_capacity(), 0);
    assert_eq!(b.deficit(), 0);
}

#[test]
fn test_admit_against_reserved_capacity_queues() {
    // available 10 but 8 already promised: only 2 free
    let mut b = buffer(10, 10);
    b.claim_reserve = 8;
    let adm = b.admit(5).unwrap();
    assert_eq!(adm.reserved, 2);
    assert!(adm.queued);
    assert_eq!(adm.fill_at, 3);
}

#[test]
fn test_admit_watermarks_accumulate() {
    let mut b = buffer(100, 0);
    let first = b.admit(5).unwrap();
    let second = b.admit(7).unwrap();
    assert_eq!(first.fill_at, 5);
    assert_eq!(second.fill_at, 12);
    assert_eq!(b.deficit(), 12);
}

// ═══════════════════════════════════════════════════════════════
// Buffer fills
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_fill_pays_deficit_first_then_free() {
    // Scenario: target 10, available 2; withdraw 5 reserves 2, queues 3.
    // A fill of 8 covers the 3-deficit and leaves 5 free.
    let mut b = buffer(10, 2);
    let adm = b.admit(5).unwrap();
    assert_eq!(adm.fill_at, 3);
    let free_before = b.free_capacity();
    assert_eq!(free_before, 0);

    let (to_deficit, to_free) = b.apply_fill(8).unwrap();
    assert_eq!(to_deficit, 3);
    assert_eq!(to_free, 5);
    assert_eq!(b.queue_filled, 3);
    assert_eq!(b.deficit(), 0);
    // the request is now fully funded...
    assert!(adm.fill_at <= b.queue_filled);
    // ...and free capacity grew by exactly the surplus
    assert_eq!(b.free_capacity(), free_before + 5);
}

#[test]
fn test_partial_fill_leaves_request_unfunded() {
    let mut b = buffer(10, 0);
    let adm = b.admit(5).unwrap();
    b.apply_fill(3).unwrap();
    assert!(adm.fill_at > b.queue_filled);
    assert_eq!(b.deficit(), 2);
    // the 3 filled tokens are promised, not free
    assert_eq!(b.free_capacity(), 0);

    b.apply_fill(2).unwrap();
    assert!(adm.fill_at <= b.queue_filled);
    assert_eq!(b.deficit(), 0);
}

#[test]
fn test_fill_order_is_fifo_by_watermark() {
    let mut b = buffer(100, 0);
    let first = b.admit(4).unwrap();
    let second = b.admit(4).unwrap();
    b.apply_fill(5).unwrap();
    // enough for the first watermark (4) but not the second (8)
    assert!(first.fill_at <= b.queue_filled);
    assert!(second.fill_at > b.queue_filled);
}

#[test]
fn test_counters_never_decrease() {
    let mut b = buffer(10, 2);
    b.admit(5).unwrap();
    let (tf1, qf1) = (b.queue_to_fill, b.queue_filled);
    b.apply_fill(8).unwrap();
    assert!(b.queue_to_fill >= tf1);
    assert!(b.queue_filled >= qf1);
    b.admit(3).unwrap();
    assert!(b.queue_to_fill > tf1);
}

#[test]
fn test_fill_never_overshoots_deficit_counter() {
    let mut b = buffer(10, 0);
    b.admit(3).unwrap();
    b.apply_fill(100).unwrap();
    // queue_filled caps at queue_to_fill
    assert_eq!(b.queue_filled, b.queue_to_fill);
    assert_eq!(b.free_capacity(), 97);
}

// ═══════════════════════════════════════════════════════════════
// Claim release
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_release_claim_full_payout() {
    let mut b = buffer(10, 10);
    b.admit(4).unwrap();
    b.release_claim(4, 4).unwrap();
    assert_eq!(b.available, 6);
    assert_eq!(b.claim_reserve, 0);
}

#[test]
fn test_release_claim_nav_reduced_payout_frees_surplus() {
    // reserved 4, repriced payout 3: the 1-token surplus stays free
    let mut b = buffer(10, 10);
    b.admit(4).unwrap();
    assert_eq!(b.free_capacity(), 6);
    b.release_claim(4, 3).unwrap();
    assert_eq!(b.available, 7);
    assert_eq!(b.claim_reserve, 0);
    assert_eq!(b.free_capacity(), 7);
}

#[test]
fn test_release_claim_rejects_payout_above_reservation() {
    let mut b = buffer(10, 10);
    b.admit(4).unwrap();
    assert!(b.release_claim(4, 5).is_none());
}

#[test]
fn test_claim_reserve_never_exceeds_available() {
    // invariant: claim_reserve <= available through a full lifecycle
    let mut b = buffer(10, 2);
    b.admit(5).unwrap();
    assert!(b.claim_reserve <= b.available);
    b.apply_fill(8).unwrap();
    assert!(b.claim_reserve <= b.available);
    b.release_claim(5, 5).unwrap();
    assert!(b.claim_reserve <= b.available);
}

#[test]
fn test_draw_free_respects_reservations() {
    let mut b = buffer(10, 10);
    b.admit(6).unwrap();
    assert!(b.draw_free(5).is_none());
    b.draw_free(4).unwrap();
    assert_eq!(b.available, 6);
    assert_eq!(b.free_capacity(), 0);
}

// ═══════════════════════════════════════════════════════════════
// Withdraw ledger
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_ledger_push_assigns_nonces() {
    let mut ledger = WithdrawLedger::zeroed();
    let a = ledger.push(request_for(1, 10, 10)).unwrap();
    let b = ledger.push(request_for(2, 20, 20)).unwrap();
    assert_eq!((a, b), (0, 1));
    assert_eq!(ledger.get(0).unwrap().nonce, 0);
    assert_eq!(ledger.get(1).unwrap().nonce, 1);
    assert_eq!(ledger.count, 2);
}

#[test]
fn test_ledger_full() {
    let mut ledger = WithdrawLedger::zeroed();
    for i in 0..MAX_REQUESTS {
        ledger.push(request_for(i as u8, 1, 1)).unwrap();
    }
    assert!(ledger.push(request_for(99, 1, 1)).is_none());
}

#[test]
fn test_ledger_swap_remove_moves_last() {
    let mut ledger = WithdrawLedger::zeroed();
    ledger.push(request_for(1, 10, 10)).unwrap();
    ledger.push(request_for(2, 20, 20)).unwrap();
    ledger.push(request_for(3, 30, 30)).unwrap();

    let removed = ledger.swap_remove(0).unwrap();
    assert_eq!(removed.owner, [1; 32]);
    assert_eq!(ledger.count, 2);
    // the last request now occupies slot 0
    assert_eq!(ledger.get(0).unwrap().owner, [3; 32]);
    // the vacated tail slot is zeroed
    assert_eq!(ledger.requests[2].shares, 0);
}

#[test]
fn test_ledger_remove_out_of_range() {
    let mut ledger = WithdrawLedger::zeroed();
    ledger.push(request_for(1, 10, 10)).unwrap();
    assert!(ledger.swap_remove(1).is_none());
    // removing the same index twice only succeeds once
    assert!(ledger.swap_remove(0).is_some());
    assert!(ledger.swap_remove(0).is_none());
}

#[test]
fn test_ledger_nonces_survive_removal() {
    let mut ledger = WithdrawLedger::zeroed();
    ledger.push(request_for(1, 1, 1)).unwrap();
    ledger.swap_remove(0).unwrap();
    ledger.push(request_for(2, 2, 2)).unwrap();
    // nonce counter keeps going, never reused
    assert_eq!(ledger.get(0).unwrap().nonce, 1);
}

// ═══════════════════════════════════════════════════════════════
// Vault registry and views
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_vault_asset_slot_scanning() {
    let mut vault = Vault::zeroed();
    assert_eq!(vault.free_asset_slot(), Some(0));
    vault.assets[0].in_use = 1;
    vault.assets[1].in_use = 1;
    assert_eq!(vault.free_asset_slot(), Some(2));
    // removal frees the slot for reuse
    vault.assets[0].in_use = 0;
    assert_eq!(vault.free_asset_slot(), Some(0));
}

#[test]
fn test_vault_find_asset_by_mint() {
    let mut vault = Vault::zeroed();
    vault.assets[2].in_use = 1;
    vault.assets[2].mint = [7; 32];
    assert_eq!(vault.find_asset_by_mint(&[7; 32]), Some(2));
    assert_eq!(vault.find_asset_by_mint(&[8; 32]), None);
    // out-of-use slots with a matching mint are ignored
    vault.assets[2].in_use = 0;
    assert_eq!(vault.find_asset_by_mint(&[7; 32]), None);
}

#[test]
fn test_vault_withdraw_views() {
    let mut vault = Vault::zeroed();
    vault.assets[0].in_use = 1;
    vault.assets[0].buffer.available = 10;
    vault.assets[0].buffer.claim_reserve = 4;
    vault.assets[0].buffer.queue_to_fill = 9;
    vault.assets[0].buffer.queue_filled = 6;

    assert_eq!(vault.available_to_withdraw(0), Some(6));
    assert_eq!(vault.withdraw_deficit(0), Some(3));
    assert_eq!(vault.available_to_withdraw(1), None);
}

#[test]
fn test_effective_cooldown_only_extends() {
    let mut vault = Vault::zeroed();
    vault.cooldown_secs = 1_000;

    let mut risk = RiskParams::zeroed();
    assert_eq!(vault.effective_cooldown(&risk), 1_000);
    // an override above the local value extends it
    risk.cooldown_override_secs = 5_000;
    assert_eq!(vault.effective_cooldown(&risk), 5_000);
    // an override below it is ignored
    risk.cooldown_override_secs = 10;
    assert_eq!(vault.effective_cooldown(&risk), 1_000);
}

#[test]
fn test_pause_bits_or_together() {
    let mut vault = Vault::zeroed();
    let mut risk = RiskParams::zeroed();

    assert!(!vault.is_paused(PAUSE_DEPOSIT, &risk));
    vault.pause_flags = PAUSE_DEPOSIT;
    assert!(vault.is_paused(PAUSE_DEPOSIT, &risk));
    assert!(!vault.is_paused(PAUSE_WITHDRAW, &risk));

    // the risk feed can pause independently of the guardian's local bits
    risk.pause_flags = PAUSE_CLAIM;
    assert!(vault.is_paused(PAUSE_CLAIM, &risk));
    vault.pause_flags = 0;
    assert!(vault.is_paused(PAUSE_CLAIM, &risk));
    assert!(!vault.is_paused(PAUSE_DEPOSIT, &risk));
}

// ═══════════════════════════════════════════════════════════════
// Claim gating
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_claim_gate_opens_after_cooldown() {
    let mut vault = Vault::zeroed();
    vault.cooldown_secs = 1_000;
    let mut risk = RiskParams::zeroed();

    let mut req = request_for(1, 10, 10);
    req.created_at = 5_000;
    let gate = req.claimable_at(vault.effective_cooldown(&risk));
    assert_eq!(gate, 6_000);
    // one second early is rejected, the boundary itself passes
    assert!(5_999 < gate);
    assert!(!(6_000 < gate));

    // a risk override extends the gate
    risk.cooldown_override_secs = 2_000;
    assert_eq!(req.claimable_at(vault.effective_cooldown(&risk)), 7_000);
}

#[test]
fn test_claim_gate_saturates_on_huge_cooldown() {
    let mut req = request_for(1, 10, 10);
    req.created_at = i64::MAX - 1;
    assert_eq!(req.claimable_at(u64::MAX), i64::MAX);
}

fn token_account_data(owner: &Pubkey) -> Vec<u8> {
    let acct = TokenAccount {
        mint: Pubkey::default(),
        owner: *owner,
        amount: 0,
        delegate: COption::None,
        state: AccountState::Initialized,
        is_native: COption::None,
        delegated_amount: 0,
        close_authority: COption::None,
    };
    let mut data = vec![0u8; TokenAccount::LEN];
    TokenAccount::pack(acct, &mut data).unwrap();
    data
}

#[test]
fn test_claim_destination_must_belong_to_request_owner() {
    // claiming is permissionless: a third-party caller must not be able to
    // redirect the payout to an account of their choosing
    let alice = Pubkey::new_unique();
    let attacker = Pubkey::new_unique();
    let mut req = WithdrawRequest::zeroed();
    req.owner = alice.to_bytes();

    // native payout goes to the owner's own system account
    let system = system_program::id();
    let mut lamports_a = 0u64;
    let mut empty_a: Vec<u8> = vec![];
    let good =
        AccountInfo::new(&alice, false, true, &mut lamports_a, &mut empty_a, &system, false, 0);
    assert!(verify_claim_destination(&req, true, &good).is_ok());

    let mut lamports_b = 0u64;
    let mut empty_b: Vec<u8> = vec![];
    let hijacked =
        AccountInfo::new(&attacker, false, true, &mut lamports_b, &mut empty_b, &system, false, 0);
    assert_eq!(
        verify_claim_destination(&req, true, &hijacked),
        Err(VaultError::NotRequestOwner.into())
    );

    // SPL payout goes to a token account whose authority is the owner
    let token_program = spl_token::id();
    let dest_key = Pubkey::new_unique();
    let mut lamports_c = 0u64;
    let mut owned_data = token_account_data(&alice);
    let owned = AccountInfo::new(
        &dest_key, false, true, &mut lamports_c, &mut owned_data, &token_program, false, 0,
    );
    assert!(verify_claim_destination(&req, false, &owned).is_ok());

    let mut lamports_d = 0u64;
    let mut stolen_data = token_account_data(&attacker);
    let stolen = AccountInfo::new(
        &dest_key, false, true, &mut lamports_d, &mut stolen_data, &token_program, false, 0,
    );
    assert_eq!(
        verify_claim_destination(&req, false, &stolen),
        Err(VaultError::NotRequestOwner.into())
    );
}

// ═══════════════════════════════════════════════════════════════
// End-to-end lifecycle at the state level
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_queued_withdrawal_lifecycle() {
    // Withdraw 5 against a buffer holding 2, fill with 8, claim at a
    // reduced NAV: payout 4 instead of 5, surplus becomes free capacity.
    let mut b = buffer(10, 2);
    let mut ledger = WithdrawLedger::zeroed();

    let adm = b.admit(5).unwrap();
    let mut req = request_for(1, 50, 5);
    req.queued = adm.queued as u8;
    req.fill_at = adm.fill_at;
    let idx = ledger.push(req).unwrap();

    // not yet claimable
    assert!(ledger.get(idx).unwrap().fill_at > b.queue_filled);

    b.apply_fill(8).unwrap();
    let stored = *ledger.get(idx).unwrap();
    assert!(stored.fill_at <= b.queue_filled);

    // NAV dropped: repriced amount is 4
    let payout = stored.amount.min(4);
    b.release_claim(stored.amount, payout).unwrap();
    ledger.swap_remove(idx).unwrap();

    assert_eq!(b.available, 6); // 2 start + 8 fill - 4 paid
    assert_eq!(b.claim_reserve, 0);
    assert_eq!(b.deficit(), 0);
    assert_eq!(ledger.count, 0);
}

#[test]
fn test_instant_fee_scales_with_drawdown() {
    // target 100, floor at 20%, fees 10..100 bps
    let target = 100u64;
    let floor = math::drawdown_floor(target, 2_000);
    assert_eq!(floor, 20);

    // untouched buffer pays the minimum
    assert_eq!(math::instant_fee_bps(100, target, floor, 10, 100), 10);
    // drawn exactly to the floor pays the maximum
    assert_eq!(math::instant_fee_bps(20, target, floor, 10, 100), 100);
    // halfway through the span pays roughly the midpoint
    let mid = math::instant_fee_bps(60, target, floor, 10, 100);
    assert!(mid > 10 && mid < 100);
    // monotone: less remaining capacity never means a lower fee
    let mut last = 0u16;
    for free_after in (20..=100).rev() {
        let fee = math::instant_fee_bps(free_after, target, floor, 10, 100);
        assert!(fee >= last);
        last = fee;
    }
}
