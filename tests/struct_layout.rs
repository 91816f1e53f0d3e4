//! Struct layout verification tests.
//!
//! Ensures bytemuck Pod compliance and that struct sizes
//! don't accidentally change (would break on-chain state).

use restake_vault::state::{
    AssetBalance, AssetEntry, BufferState, DelegateEntry, InstantWithdrawConfig,
    OperatorPoolState, PriceFeed, RiskParams, Vault, WithdrawLedger, WithdrawRequest,
    OPERATOR_POOL_STATE_SIZE, PRICE_FEED_SIZE, RISK_PARAMS_SIZE, VAULT_SIZE,
    WITHDRAW_LEDGER_SIZE,
};

use bytemuck::{Pod, Zeroable};

#[test]
fn test_vault_size_is_2264() {
    // If this changes, existing on-chain data becomes unreadable.
    // NEVER change this without a migration plan.
    assert_eq!(VAULT_SIZE, 2264);
    assert_eq!(std::mem::size_of::<Vault>(), 2264);
}

#[test]
fn test_withdraw_ledger_size_is_5136() {
    assert_eq!(WITHDRAW_LEDGER_SIZE, 5136);
    assert_eq!(std::mem::size_of::<WithdrawLedger>(), 5136);
}

#[test]
fn test_withdraw_request_size_is_80() {
    assert_eq!(std::mem::size_of::<WithdrawRequest>(), 80);
}

#[test]
fn test_price_feed_size_is_88() {
    assert_eq!(PRICE_FEED_SIZE, 88);
    assert_eq!(std::mem::size_of::<PriceFeed>(), 88);
}

#[test]
fn test_risk_params_size_is_16() {
    assert_eq!(RISK_PARAMS_SIZE, 16);
    assert_eq!(std::mem::size_of::<RiskParams>(), 16);
}

#[test]
fn test_asset_entry_size_is_152() {
    assert_eq!(std::mem::size_of::<AssetEntry>(), 152);
}

#[test]
fn test_delegate_entry_size_is_40() {
    assert_eq!(std::mem::size_of::<DelegateEntry>(), 40);
}

#[test]
fn test_buffer_state_size_is_40() {
    assert_eq!(std::mem::size_of::<BufferState>(), 40);
}

#[test]
fn test_instant_config_size_is_40() {
    assert_eq!(std::mem::size_of::<InstantWithdrawConfig>(), 40);
}

#[test]
fn test_operator_pool_state_size_is_592() {
    assert_eq!(OPERATOR_POOL_STATE_SIZE, 592);
    assert_eq!(std::mem::size_of::<OperatorPoolState>(), 592);
    assert_eq!(std::mem::size_of::<AssetBalance>(), 72);
}

#[test]
fn test_vault_alignment() {
    assert_eq!(std::mem::align_of::<Vault>(), 8);
    assert_eq!(std::mem::align_of::<WithdrawLedger>(), 8);
    assert_eq!(std::mem::align_of::<WithdrawRequest>(), 8);
    assert_eq!(std::mem::align_of::<PriceFeed>(), 8);
    assert_eq!(std::mem::align_of::<RiskParams>(), 8);
}

#[test]
fn test_vault_zeroed_is_not_initialized() {
    let vault = Vault::zeroed();
    assert_eq!(vault.is_initialized, 0);
    assert_eq!(vault.asset_count, 0);
    assert_eq!(vault.delegate_count, 0);
    assert_eq!(vault.total_shares, 0);
    assert_eq!(vault.native_staged, 0);
    assert!(vault.asset(0).is_none());
    assert!(vault.delegate(0).is_none());
}

#[test]
fn test_ledger_zeroed_is_empty() {
    let ledger = WithdrawLedger::zeroed();
    assert_eq!(ledger.is_initialized, 0);
    assert_eq!(ledger.count, 0);
    assert_eq!(ledger.next_nonce, 0);
    assert!(ledger.get(0).is_none());
}

#[test]
fn test_bytemuck_roundtrip_vault() {
    let mut vault = Vault::zeroed();
    vault.is_initialized = 1;
    vault.version = 1;
    vault.bump = 42;
    vault.vault_authority_bump = 99;
    vault.total_shares = 1_000_000;
    vault.global_value_cap = 10_000_000;
    vault.cooldown_secs = 604_800;
    vault.assets[3].in_use = 1;
    vault.assets[3].buffer.target = 777;
    vault.delegates[7].in_use = 1;
    vault.delegates[7].allocation_bps = 2_500;

    let bytes: &[u8] = bytemuck::bytes_of(&vault);
    assert_eq!(bytes.len(), VAULT_SIZE);

    let recovered: &Vault = bytemuck::from_bytes(bytes);
    assert_eq!(recovered.is_initialized, 1);
    assert_eq!(recovered.bump, 42);
    assert_eq!(recovered.vault_authority_bump, 99);
    assert_eq!(recovered.total_shares, 1_000_000);
    assert_eq!(recovered.cooldown_secs, 604_800);
    assert_eq!(recovered.assets[3].buffer.target, 777);
    assert_eq!(recovered.delegates[7].allocation_bps, 2_500);
}

#[test]
fn test_bytemuck_roundtrip_ledger() {
    let mut ledger = WithdrawLedger::zeroed();
    ledger.is_initialized = 1;
    ledger.next_nonce = 55;
    ledger.count = 2;
    ledger.requests[0].shares = 123;
    ledger.requests[1].amount = 456;

    let bytes: &[u8] = bytemuck::bytes_of(&ledger);
    assert_eq!(bytes.len(), WITHDRAW_LEDGER_SIZE);

    let recovered: &WithdrawLedger = bytemuck::from_bytes(bytes);
    assert_eq!(recovered.count, 2);
    assert_eq!(recovered.requests[0].shares, 123);
    assert_eq!(recovered.requests[1].amount, 456);
}

#[test]
fn test_pod_zeroable_impls() {
    // These compile-time checks ensure Pod + Zeroable derive is valid
    fn assert_pod<T: Pod + Zeroable>() {}
    assert_pod::<Vault>();
    assert_pod::<AssetEntry>();
    assert_pod::<DelegateEntry>();
    assert_pod::<BufferState>();
    assert_pod::<InstantWithdrawConfig>();
    assert_pod::<WithdrawLedger>();
    assert_pod::<WithdrawRequest>();
    assert_pod::<PriceFeed>();
    assert_pod::<RiskParams>();
    assert_pod::<OperatorPoolState>();
    assert_pod::<AssetBalance>();
}

/// Field offset verification — ensures no hidden padding changes
#[test]
fn test_vault_field_offsets() {
    let vault = Vault::zeroed();
    let base = &vault as *const _ as usize;

    assert_eq!(&vault.is_initialized as *const _ as usize - base, 0);
    assert_eq!(&vault.version as *const _ as usize - base, 1);
    assert_eq!(&vault.bump as *const _ as usize - base, 2);
    assert_eq!(&vault.vault_authority_bump as *const _ as usize - base, 3);
    assert_eq!(&vault.pause_flags as *const _ as usize - base, 4);
    assert_eq!(&vault.asset_count as *const _ as usize - base, 5);
    assert_eq!(&vault.delegate_count as *const _ as usize - base, 6);
    assert_eq!(&vault.admin as *const _ as usize - base, 8);
    assert_eq!(&vault.manager as *const _ as usize - base, 40);
    assert_eq!(&vault.guardian as *const _ as usize - base, 72);
    assert_eq!(&vault.share_mint as *const _ as usize - base, 104);
    assert_eq!(&vault.share_custody as *const _ as usize - base, 136);
    assert_eq!(&vault.operator_program as *const _ as usize - base, 168);
    assert_eq!(&vault.total_shares as *const _ as usize - base, 200);
    assert_eq!(&vault.global_value_cap as *const _ as usize - base, 208);
    assert_eq!(&vault.cooldown_secs as *const _ as usize - base, 216);
    assert_eq!(&vault.max_price_age_secs as *const _ as usize - base, 224);
    assert_eq!(&vault.native_staged as *const _ as usize - base, 232);
    assert_eq!(&vault.assets as *const _ as usize - base, 240);
    assert_eq!(&vault.delegates as *const _ as usize - base, 1456);
    assert_eq!(&vault.instant_config as *const _ as usize - base, 2096);
    assert_eq!(&vault._reserved as *const _ as usize - base, 2136);
}

#[test]
fn test_withdraw_request_field_offsets() {
    let request = WithdrawRequest::zeroed();
    let base = &request as *const _ as usize;

    assert_eq!(&request.nonce as *const _ as usize - base, 0);
    assert_eq!(&request.owner as *const _ as usize - base, 8);
    assert_eq!(&request.asset_index as *const _ as usize - base, 40);
    assert_eq!(&request.queued as *const _ as usize - base, 41);
    assert_eq!(&request.shares as *const _ as usize - base, 48);
    assert_eq!(&request.amount as *const _ as usize - base, 56);
    assert_eq!(&request.created_at as *const _ as usize - base, 64);
    assert_eq!(&request.fill_at as *const _ as usize - base, 72);
}
