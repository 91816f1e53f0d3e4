//! CPI helpers for calling the operator pool program.
//!
//! Instruction data is assembled by hand so this crate does not depend on
//! the operator program's crate. Tags match its instruction decoder.

use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    instruction::{AccountMeta, Instruction},
    program::{invoke, invoke_signed},
    pubkey::Pubkey,
};

// ═══════════════════════════════════════════════════════════════
// Operator pool instruction tags
// ═══════════════════════════════════════════════════════════════

const TAG_POOL_DEPOSIT: u8 = 0;
const TAG_POOL_INITIATE_WITHDRAW: u8 = 1;
const TAG_POOL_COMPLETE_WITHDRAW: u8 = 2;

// ═══════════════════════════════════════════════════════════════
// Deposit (Tag 0) — user funds move straight into the pool's vault
// ═══════════════════════════════════════════════════════════════
// Accounts: [depositor(signer), source_ata(w), pool_state(w), pool_vault(w),
//            token_program]
// Data: tag(1) + mint(32) + amount(8)

pub fn cpi_pool_deposit<'a>(
    operator_program: &AccountInfo<'a>,
    depositor: &AccountInfo<'a>, // outer-tx signer, no PDA seeds needed
    source_ata: &AccountInfo<'a>,
    pool_state: &AccountInfo<'a>,
    pool_vault: &AccountInfo<'a>,
    token_program: &AccountInfo<'a>,
    mint: &Pubkey,
    amount: u64,
) -> ProgramResult {
    let mut data = Vec::with_capacity(41);
    data.push(TAG_POOL_DEPOSIT);
    data.extend_from_slice(mint.as_ref());
    data.extend_from_slice(&amount.to_le_bytes());

    let ix = Instruction {
        program_id: *operator_program.key,
        accounts: vec![
            AccountMeta::new_readonly(*depositor.key, true),
            AccountMeta::new(*source_ata.key, false),
            AccountMeta::new(*pool_state.key, false),
            AccountMeta::new(*pool_vault.key, false),
            AccountMeta::new_readonly(*token_program.key, false),
        ],
        data,
    };

    invoke(
        &ix,
        &[
            depositor.clone(),
            source_ata.clone(),
            pool_state.clone(),
            pool_vault.clone(),
            token_program.clone(),
        ],
    )
}

// ═══════════════════════════════════════════════════════════════
// InitiateWithdraw (Tag 1) — starts the operator-side unbonding
// ═══════════════════════════════════════════════════════════════
// Accounts: [authority(signer), pool_state(w), clock]
// Data: tag(1) + mint(32) + amount(8)
//
// The vault authority PDA is the depositor of record in the pool, so it
// signs here via seeds.

pub fn cpi_pool_initiate_withdraw<'a>(
    operator_program: &AccountInfo<'a>,
    vault_auth: &AccountInfo<'a>,
    pool_state: &AccountInfo<'a>,
    clock: &AccountInfo<'a>,
    mint: &Pubkey,
    amount: u64,
    vault_auth_seeds: &[&[u8]],
) -> ProgramResult {
    let mut data = Vec::with_capacity(41);
    data.push(TAG_POOL_INITIATE_WITHDRAW);
    data.extend_from_slice(mint.as_ref());
    data.extend_from_slice(&amount.to_le_bytes());

    let ix = Instruction {
        program_id: *operator_program.key,
        accounts: vec![
            AccountMeta::new_readonly(*vault_auth.key, true),
            AccountMeta::new(*pool_state.key, false),
            AccountMeta::new_readonly(*clock.key, false),
        ],
        data,
    };

    invoke_signed(
        &ix,
        &[vault_auth.clone(), pool_state.clone(), clock.clone()],
        &[vault_auth_seeds],
    )
}

// ═══════════════════════════════════════════════════════════════
// CompleteWithdraw (Tag 2) — pays a matured unbonding out
// ═══════════════════════════════════════════════════════════════
// Accounts: [authority(signer), pool_state(w), pool_vault(w),
//            destination(w), token_program]
// Data: tag(1) + request_id(8)
//
// The destination is our buffer token account; the caller measures the
// balance delta rather than trusting a returned amount.

pub fn cpi_pool_complete_withdraw<'a>(
    operator_program: &AccountInfo<'a>,
    vault_auth: &AccountInfo<'a>,
    pool_state: &AccountInfo<'a>,
    pool_vault: &AccountInfo<'a>,
    destination: &AccountInfo<'a>,
    token_program: &AccountInfo<'a>,
    request_id: u64,
    vault_auth_seeds: &[&[u8]],
) -> ProgramResult {
    let mut data = Vec::with_capacity(9);
    data.push(TAG_POOL_COMPLETE_WITHDRAW);
    data.extend_from_slice(&request_id.to_le_bytes());

    let ix = Instruction {
        program_id: *operator_program.key,
        accounts: vec![
            AccountMeta::new_readonly(*vault_auth.key, true),
            AccountMeta::new(*pool_state.key, false),
            AccountMeta::new(*pool_vault.key, false),
            AccountMeta::new(*destination.key, false),
            AccountMeta::new_readonly(*token_program.key, false),
        ],
        data,
    };

    invoke_signed(
        &ix,
        &[
            vault_auth.clone(),
            pool_state.clone(),
            pool_vault.clone(),
            destination.clone(),
            token_program.clone(),
        ],
        &[vault_auth_seeds],
    )
}
