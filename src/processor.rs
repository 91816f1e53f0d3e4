use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::invoke,
    program::invoke_signed,
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    rent::Rent,
    system_instruction,
    sysvar::{clock::Clock, Sysvar},
};

use bytemuck::Zeroable;

use crate::accounting::{self, Totals};
use crate::cpi;
use crate::error::VaultError;
use crate::instruction::VaultInstruction;
use crate::math;
use crate::oracle;
use crate::state::{
    self, RiskParams, Vault, WithdrawLedger, WithdrawRequest, MAX_ASSETS, MAX_DELEGATES,
    MAX_REQUESTS, OPERATOR_POOL_STATE_SIZE, PAUSE_CLAIM, PAUSE_DEPOSIT, PAUSE_INSTANT,
    PAUSE_WITHDRAW, PRICE_FEED_SIZE, RISK_PARAMS_SIZE, VAULT_SIZE, WITHDRAW_LEDGER_SIZE,
};
use crate::state::{OperatorPoolState, PriceFeed};

/// Verify the token program is the real SPL Token program.
/// CRITICAL: Without this check, an attacker can pass a fake token program,
/// receive PDA signer authority via invoke_signed, and drain the buffers.
fn verify_token_program(token_program: &AccountInfo) -> ProgramResult {
    if *token_program.key != spl_token::id() {
        msg!("Error: invalid token program {}", token_program.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// Balance of an SPL token account.
fn token_balance(ai: &AccountInfo) -> Result<u64, ProgramError> {
    let data = ai.try_borrow_data()?;
    Ok(spl_token::state::Account::unpack(&data)?.amount)
}

/// Owner (authority) of an SPL token account.
fn token_owner(ai: &AccountInfo) -> Result<Pubkey, ProgramError> {
    let data = ai.try_borrow_data()?;
    Ok(spl_token::state::Account::unpack(&data)?.owner)
}

/// A claim may only pay the request owner: their system account for native,
/// or a token account they own for SPL. Claiming is permissionless, so the
/// destination must be pinned to the request, never to the caller.
pub fn verify_claim_destination(
    request: &WithdrawRequest,
    is_native: bool,
    dest: &AccountInfo,
) -> ProgramResult {
    let dest_owner = if is_native {
        dest.key.to_bytes()
    } else {
        token_owner(dest)?.to_bytes()
    };
    if dest_owner != request.owner {
        return Err(VaultError::NotRequestOwner.into());
    }
    Ok(())
}

/// Load risk params for a vault, verifying the PDA derivation.
fn load_risk_params(
    program_id: &Pubkey,
    vault_key: &Pubkey,
    risk_ai: &AccountInfo,
) -> Result<RiskParams, ProgramError> {
    let (expected, _) = state::derive_risk_params(program_id, vault_key);
    if *risk_ai.key != expected {
        return Err(VaultError::InvalidPda.into());
    }
    if risk_ai.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let data = risk_ai.try_borrow_data()?;
    if data.len() < RISK_PARAMS_SIZE {
        return Err(ProgramError::InvalidAccountData);
    }
    let risk: &RiskParams = bytemuck::from_bytes(&data[..RISK_PARAMS_SIZE]);
    if risk.is_initialized != 1 {
        return Err(VaultError::NotInitialized.into());
    }
    Ok(*risk)
}

/// Load the withdraw ledger, verifying the PDA derivation.
fn check_ledger_pda(
    program_id: &Pubkey,
    vault_key: &Pubkey,
    ledger_ai: &AccountInfo,
) -> ProgramResult {
    let (expected, _) = state::derive_withdraw_ledger(program_id, vault_key);
    if *ledger_ai.key != expected {
        return Err(VaultError::InvalidPda.into());
    }
    if ledger_ai.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// Read price feeds and live operator balances from the trailing accounts
/// and price the whole system.
///
/// Expects one feed per in-use asset (slot order), then one pool state per
/// in-use delegate (slot order). Every account is matched against the
/// registry by key, so a caller cannot substitute feeds or pools.
fn load_snapshot(
    program_id: &Pubkey,
    vault: &Vault,
    remaining: &[AccountInfo],
    now: i64,
) -> Result<Totals, ProgramError> {
    let mut cursor = remaining.iter();

    let mut prices = [0u64; MAX_ASSETS];
    for (a, asset) in vault.assets.iter().enumerate() {
        if asset.in_use != 1 {
            continue;
        }
        let feed_ai = cursor.next().ok_or(ProgramError::NotEnoughAccountKeys)?;
        if feed_ai.key.to_bytes() != asset.price_feed {
            return Err(VaultError::InvalidPda.into());
        }
        prices[a] = oracle::read_price_account(feed_ai, program_id, now, vault.max_price_age_secs)?;
    }

    let mut balances = [[0u64; MAX_ASSETS]; MAX_DELEGATES];
    let mut native_staked = [0u64; MAX_DELEGATES];
    for (d, delegate) in vault.delegates.iter().enumerate() {
        if delegate.in_use != 1 {
            continue;
        }
        let pool_ai = cursor.next().ok_or(ProgramError::NotEnoughAccountKeys)?;
        if pool_ai.key.to_bytes() != delegate.pool_state {
            return Err(VaultError::DelegateMismatch.into());
        }
        if pool_ai.owner.to_bytes() != vault.operator_program {
            return Err(VaultError::InvalidOperatorProgram.into());
        }
        let data = pool_ai.try_borrow_data()?;
        if data.len() < OPERATOR_POOL_STATE_SIZE {
            return Err(ProgramError::InvalidAccountData);
        }
        let pool: &OperatorPoolState = bytemuck::from_bytes(&data[..OPERATOR_POOL_STATE_SIZE]);
        native_staked[d] = pool.native_staked;
        for (a, asset) in vault.assets.iter().enumerate() {
            if asset.in_use != 1 || asset.is_native == 1 {
                continue;
            }
            balances[d][a] = pool.balance_of(&asset.mint);
        }
    }

    accounting::aggregate_totals(vault, &balances, &native_staked, &prices)
        .ok_or_else(|| VaultError::Overflow.into())
}

pub fn process(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    let instruction = VaultInstruction::unpack(instruction_data)?;

    match instruction {
        VaultInstruction::InitVault {
            cooldown_secs,
            max_price_age_secs,
            global_value_cap,
        } => process_init_vault(program_id, accounts, cooldown_secs, max_price_age_secs, global_value_cap),
        VaultInstruction::RegisterAsset {
            value_cap,
            buffer_target,
            is_native,
        } => process_register_asset(program_id, accounts, value_cap, buffer_target, is_native),
        VaultInstruction::RemoveAsset { asset_index } => {
            process_remove_asset(program_id, accounts, asset_index)
        }
        VaultInstruction::AddDelegate { allocation_bps } => {
            process_add_delegate(program_id, accounts, allocation_bps)
        }
        VaultInstruction::RemoveDelegate { delegate_index } => {
            process_remove_delegate(program_id, accounts, delegate_index)
        }
        VaultInstruction::SetDelegateAllocation {
            delegate_index,
            allocation_bps,
        } => process_set_delegate_allocation(program_id, accounts, delegate_index, allocation_bps),
        VaultInstruction::SetBufferTarget { asset_index, target } => {
            process_set_buffer_target(program_id, accounts, asset_index, target)
        }
        VaultInstruction::UpdateConfig {
            new_cooldown_secs,
            new_global_value_cap,
        } => process_update_config(program_id, accounts, new_cooldown_secs, new_global_value_cap),
        VaultInstruction::SetInstantWithdrawConfig {
            drawdown_limit_bps,
            min_fee_bps,
            max_fee_bps,
        } => process_set_instant_withdraw_config(
            program_id,
            accounts,
            drawdown_limit_bps,
            min_fee_bps,
            max_fee_bps,
        ),
        VaultInstruction::SetPauseFlags { flags } => {
            process_set_pause_flags(program_id, accounts, flags)
        }
        VaultInstruction::SetRiskParams {
            pause_flags,
            cooldown_override_secs,
        } => process_set_risk_params(program_id, accounts, pause_flags, cooldown_override_secs),
        VaultInstruction::InitPriceFeed {
            max_deviation_bps,
            is_native,
        } => process_init_price_feed(program_id, accounts, max_deviation_bps, is_native),
        VaultInstruction::PushPrice { price_e18, timestamp } => {
            process_push_price(program_id, accounts, price_e18, timestamp)
        }
        VaultInstruction::Deposit {
            asset_index,
            amount,
            referral,
        } => process_deposit(program_id, accounts, asset_index, amount, referral),
        VaultInstruction::DepositNative { amount, referral } => {
            process_deposit_native(program_id, accounts, amount, referral)
        }
        VaultInstruction::Withdraw { asset_index, shares } => {
            process_withdraw(program_id, accounts, asset_index, shares)
        }
        VaultInstruction::Claim { request_index } => {
            process_claim(program_id, accounts, request_index)
        }
        VaultInstruction::InstantWithdraw {
            asset_index,
            shares,
            min_out,
        } => process_instant_withdraw(program_id, accounts, asset_index, shares, min_out),
        VaultInstruction::FillBuffer { asset_index, amount } => {
            process_fill_buffer(program_id, accounts, asset_index, amount)
        }
        VaultInstruction::WithdrawFromDelegate { asset_index, amount } => {
            process_withdraw_from_delegate(program_id, accounts, asset_index, amount)
        }
        VaultInstruction::CollectDelegateWithdraw {
            asset_index,
            request_id,
        } => process_collect_delegate_withdraw(program_id, accounts, asset_index, request_id),
    }
}

// ═══════════════════════════════════════════════════════════════
// Helper: validate vault account + role signature
// ═══════════════════════════════════════════════════════════════

enum Role {
    Admin,
    Manager,
    Guardian,
}

/// Validate that the vault account is ours and initialized, and that
/// `signer` is a signer holding `role`.
fn validate_role(
    program_id: &Pubkey,
    vault_ai: &AccountInfo,
    signer: &AccountInfo,
    role: Role,
) -> ProgramResult {
    if !signer.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    if vault_ai.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let data = vault_ai.try_borrow_data()?;
    if data.len() < VAULT_SIZE {
        return Err(ProgramError::InvalidAccountData);
    }
    let vault: &Vault = bytemuck::from_bytes(&data[..VAULT_SIZE]);
    if vault.is_initialized != 1 {
        return Err(VaultError::NotInitialized.into());
    }
    let expected = match role {
        Role::Admin => vault.admin,
        Role::Manager => vault.manager,
        Role::Guardian => vault.guardian,
    };
    if expected != signer.key.to_bytes() {
        return Err(VaultError::Unauthorized.into());
    }
    Ok(())
}

/// Vault account checks for user entry points (no role requirement).
fn check_vault_account(program_id: &Pubkey, vault_ai: &AccountInfo) -> ProgramResult {
    if vault_ai.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let data = vault_ai.try_borrow_data()?;
    if data.len() < VAULT_SIZE {
        return Err(ProgramError::InvalidAccountData);
    }
    let vault: &Vault = bytemuck::from_bytes(&data[..VAULT_SIZE]);
    if vault.is_initialized != 1 {
        return Err(VaultError::NotInitialized.into());
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 0: InitVault
// ═══════════════════════════════════════════════════════════════

fn process_init_vault(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    cooldown_secs: u64,
    max_price_age_secs: u64,
    global_value_cap: u64,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let base = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let ledger_pda = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;
    let share_mint = next_account_info(accounts_iter)?;
    let share_custody = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let manager = next_account_info(accounts_iter)?;
    let guardian = next_account_info(accounts_iter)?;
    let operator_program = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;
    let system_program = next_account_info(accounts_iter)?;
    let rent_sysvar = next_account_info(accounts_iter)?;

    if !admin.is_signer || !base.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let (expected_vault, vault_bump) = state::derive_vault_pda(program_id, base.key);
    if *vault_pda.key != expected_vault {
        return Err(VaultError::InvalidPda.into());
    }
    if !vault_pda.data_is_empty() {
        return Err(VaultError::AlreadyInitialized.into());
    }

    let (expected_auth, vault_auth_bump) = state::derive_vault_authority(program_id, &expected_vault);
    if *vault_auth.key != expected_auth {
        return Err(VaultError::InvalidPda.into());
    }
    let (expected_ledger, ledger_bump) = state::derive_withdraw_ledger(program_id, &expected_vault);
    if *ledger_pda.key != expected_ledger {
        return Err(VaultError::InvalidPda.into());
    }
    let (expected_risk, risk_bump) = state::derive_risk_params(program_id, &expected_vault);
    if *risk_pda.key != expected_risk {
        return Err(VaultError::InvalidPda.into());
    }

    // Validate token program BEFORE any invoke_signed that grants PDA signer authority
    verify_token_program(token_program)?;

    let rent = Rent::from_account_info(rent_sysvar)?;

    let vault_seeds: &[&[u8]] = &[b"vault", base.key.as_ref(), &[vault_bump]];
    invoke_signed(
        &system_instruction::create_account(
            admin.key,
            vault_pda.key,
            rent.minimum_balance(VAULT_SIZE),
            VAULT_SIZE as u64,
            program_id,
        ),
        &[admin.clone(), vault_pda.clone(), system_program.clone()],
        &[vault_seeds],
    )?;

    let ledger_seeds: &[&[u8]] = &[b"withdraw_ledger", vault_pda.key.as_ref(), &[ledger_bump]];
    invoke_signed(
        &system_instruction::create_account(
            admin.key,
            ledger_pda.key,
            rent.minimum_balance(WITHDRAW_LEDGER_SIZE),
            WITHDRAW_LEDGER_SIZE as u64,
            program_id,
        ),
        &[admin.clone(), ledger_pda.clone(), system_program.clone()],
        &[ledger_seeds],
    )?;

    let risk_seeds: &[&[u8]] = &[b"risk_params", vault_pda.key.as_ref(), &[risk_bump]];
    invoke_signed(
        &system_instruction::create_account(
            admin.key,
            risk_pda.key,
            rent.minimum_balance(RISK_PARAMS_SIZE),
            RISK_PARAMS_SIZE as u64,
            program_id,
        ),
        &[admin.clone(), risk_pda.clone(), system_program.clone()],
        &[risk_seeds],
    )?;

    // Share mint, authority = vault_auth PDA
    invoke(
        &spl_token::instruction::initialize_mint(
            token_program.key,
            share_mint.key,
            vault_auth.key,
            Some(vault_auth.key),
            9,
        )?,
        &[share_mint.clone(), rent_sysvar.clone()],
    )?;

    // Custody escrow for shares locked by open withdraw requests
    invoke(
        &spl_token::instruction::initialize_account(
            token_program.key,
            share_custody.key,
            share_mint.key,
            vault_auth.key,
        )?,
        &[
            share_custody.clone(),
            share_mint.clone(),
            vault_auth.clone(),
            rent_sysvar.clone(),
        ],
    )?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    vault.is_initialized = 1;
    vault.version = 1;
    vault.bump = vault_bump;
    vault.vault_authority_bump = vault_auth_bump;
    vault.admin = admin.key.to_bytes();
    vault.manager = manager.key.to_bytes();
    vault.guardian = guardian.key.to_bytes();
    vault.share_mint = share_mint.key.to_bytes();
    vault.share_custody = share_custody.key.to_bytes();
    vault.operator_program = operator_program.key.to_bytes();
    vault.cooldown_secs = cooldown_secs;
    vault.max_price_age_secs = max_price_age_secs;
    vault.global_value_cap = global_value_cap;

    let mut ledger_data = ledger_pda.try_borrow_mut_data()?;
    let ledger: &mut WithdrawLedger =
        bytemuck::from_bytes_mut(&mut ledger_data[..WITHDRAW_LEDGER_SIZE]);
    ledger.is_initialized = 1;
    ledger.bump = ledger_bump;

    let mut risk_data = risk_pda.try_borrow_mut_data()?;
    let risk: &mut RiskParams = bytemuck::from_bytes_mut(&mut risk_data[..RISK_PARAMS_SIZE]);
    risk.is_initialized = 1;
    risk.bump = risk_bump;

    msg!("Vault initialized for base {}", base.key);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 1: RegisterAsset
// ═══════════════════════════════════════════════════════════════

fn process_register_asset(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    value_cap: u64,
    buffer_target: u64,
    is_native: bool,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let mint = next_account_info(accounts_iter)?;
    let price_feed = next_account_info(accounts_iter)?;
    let buffer = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let token_or_system_program = next_account_info(accounts_iter)?;
    let rent_sysvar = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    let mint_bytes: [u8; 32] = if is_native {
        [0u8; 32]
    } else {
        mint.key.to_bytes()
    };
    if vault.find_asset_by_mint(&mint_bytes).is_some() {
        return Err(VaultError::AssetAlreadyRegistered.into());
    }
    let slot = vault.free_asset_slot().ok_or(VaultError::RegistryFull)?;

    let (expected_feed, _) = state::derive_price_feed(program_id, vault_pda.key, &mint_bytes);
    if *price_feed.key != expected_feed {
        return Err(VaultError::InvalidPda.into());
    }
    let (expected_auth, _) = state::derive_vault_authority(program_id, vault_pda.key);
    if *vault_auth.key != expected_auth {
        return Err(VaultError::InvalidPda.into());
    }

    if is_native {
        // The native staging PDA doubles as the buffer: a plain program-owned
        // lamport holder, so claims can debit it directly.
        let (expected_staging, staging_bump) =
            state::derive_native_staging(program_id, vault_pda.key);
        if *buffer.key != expected_staging {
            return Err(VaultError::InvalidPda.into());
        }
        if buffer.owner != program_id {
            let rent = Rent::from_account_info(rent_sysvar)?;
            let staging_seeds: &[&[u8]] =
                &[b"native_staging", vault_pda.key.as_ref(), &[staging_bump]];
            invoke_signed(
                &system_instruction::create_account(
                    admin.key,
                    buffer.key,
                    rent.minimum_balance(0),
                    0,
                    program_id,
                ),
                &[admin.clone(), buffer.clone(), token_or_system_program.clone()],
                &[staging_seeds],
            )?;
        }
    } else {
        verify_token_program(token_or_system_program)?;
        invoke(
            &spl_token::instruction::initialize_account(
                token_or_system_program.key,
                buffer.key,
                mint.key,
                vault_auth.key,
            )?,
            &[
                buffer.clone(),
                mint.clone(),
                vault_auth.clone(),
                rent_sysvar.clone(),
            ],
        )?;
    }

    let entry = &mut vault.assets[slot as usize];
    entry.in_use = 1;
    entry.is_native = is_native as u8;
    entry.mint = mint_bytes;
    entry.price_feed = price_feed.key.to_bytes();
    entry.buffer_vault = buffer.key.to_bytes();
    entry.value_cap = value_cap;
    entry.buffer.target = buffer_target;
    vault.asset_count += 1;

    msg!("Registered asset slot {} (native: {})", slot, is_native);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 2: RemoveAsset
// ═══════════════════════════════════════════════════════════════

fn process_remove_asset(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    let entry = vault
        .asset(asset_index)
        .ok_or(VaultError::AssetNotRegistered)?;
    // Cannot remove while the buffer holds liquidity, promises, or a deficit:
    // open requests against this asset would be stranded.
    if entry.buffer.available != 0 || entry.buffer.claim_reserve != 0 || entry.buffer.deficit() != 0
    {
        msg!("Error: asset {} still has buffer liquidity or open requests", asset_index);
        return Err(ProgramError::InvalidArgument);
    }

    vault.assets[asset_index as usize] = bytemuck::Zeroable::zeroed();
    vault.asset_count -= 1;

    msg!("Removed asset slot {}", asset_index);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 3: AddDelegate
// ═══════════════════════════════════════════════════════════════

fn process_add_delegate(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    allocation_bps: u16,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let pool_state = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    if allocation_bps > math::BPS_DENOM as u16 {
        return Err(VaultError::InvalidAllocation.into());
    }

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    if pool_state.owner.to_bytes() != vault.operator_program {
        return Err(VaultError::InvalidOperatorProgram.into());
    }
    let pool_bytes = pool_state.key.to_bytes();
    if vault
        .delegates
        .iter()
        .any(|d| d.in_use == 1 && d.pool_state == pool_bytes)
    {
        return Err(VaultError::DelegateAlreadyAdded.into());
    }
    let slot = vault.free_delegate_slot().ok_or(VaultError::RegistryFull)?;

    let entry = &mut vault.delegates[slot as usize];
    entry.in_use = 1;
    entry.allocation_bps = allocation_bps;
    entry.pool_state = pool_bytes;
    vault.delegate_count += 1;

    msg!("Added delegate slot {} at {} bps", slot, allocation_bps);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 4: RemoveDelegate
// ═══════════════════════════════════════════════════════════════

fn process_remove_delegate(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    delegate_index: u8,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    if vault.delegate(delegate_index).is_none() {
        return Err(VaultError::DelegateNotFound.into());
    }
    vault.delegates[delegate_index as usize] = bytemuck::Zeroable::zeroed();
    vault.delegate_count -= 1;

    msg!("Removed delegate slot {}", delegate_index);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 5: SetDelegateAllocation
// ═══════════════════════════════════════════════════════════════

fn process_set_delegate_allocation(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    delegate_index: u8,
    allocation_bps: u16,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    if allocation_bps > math::BPS_DENOM as u16 {
        return Err(VaultError::InvalidAllocation.into());
    }

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    if vault.delegate(delegate_index).is_none() {
        return Err(VaultError::DelegateNotFound.into());
    }
    vault.delegates[delegate_index as usize].allocation_bps = allocation_bps;

    msg!("Delegate {} allocation set to {} bps", delegate_index, allocation_bps);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 6: SetBufferTarget
// ═══════════════════════════════════════════════════════════════

fn process_set_buffer_target(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    target: u64,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    let entry = vault
        .asset_mut(asset_index)
        .ok_or(VaultError::AssetNotRegistered)?;
    entry.buffer.target = target;

    msg!("Asset {} buffer target set to {}", asset_index, target);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 7: UpdateConfig
// ═══════════════════════════════════════════════════════════════

fn process_update_config(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    new_cooldown_secs: Option<u64>,
    new_global_value_cap: Option<u64>,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    if let Some(cooldown) = new_cooldown_secs {
        vault.cooldown_secs = cooldown;
        msg!("Cooldown set to {} seconds", cooldown);
    }
    if let Some(cap) = new_global_value_cap {
        vault.global_value_cap = cap;
        msg!("Global value cap set to {}", cap);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 8: SetInstantWithdrawConfig
// ═══════════════════════════════════════════════════════════════

fn process_set_instant_withdraw_config(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    drawdown_limit_bps: u16,
    min_fee_bps: u16,
    max_fee_bps: u16,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let fee_recipient = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let denom = math::BPS_DENOM as u16;
    if drawdown_limit_bps > denom || max_fee_bps > denom || min_fee_bps > max_fee_bps {
        return Err(VaultError::InvalidAllocation.into());
    }

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);

    vault.instant_config.drawdown_limit_bps = drawdown_limit_bps;
    vault.instant_config.min_fee_bps = min_fee_bps;
    vault.instant_config.max_fee_bps = max_fee_bps;
    vault.instant_config.fee_recipient = fee_recipient.key.to_bytes();

    msg!(
        "Instant withdraw config: floor {} bps, fee {}..{} bps",
        drawdown_limit_bps,
        min_fee_bps,
        max_fee_bps
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 9: SetPauseFlags
// ═══════════════════════════════════════════════════════════════

fn process_set_pause_flags(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    flags: u8,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let guardian = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, guardian, Role::Guardian)?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
    vault.pause_flags = flags;

    msg!("Pause flags set to {:#06b}", flags);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 10: SetRiskParams
// ═══════════════════════════════════════════════════════════════

fn process_set_risk_params(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    pause_flags: u8,
    cooldown_override_secs: u64,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let guardian = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, guardian, Role::Guardian)?;

    let (expected_risk, _) = state::derive_risk_params(program_id, vault_pda.key);
    if *risk_pda.key != expected_risk {
        return Err(VaultError::InvalidPda.into());
    }

    let mut risk_data = risk_pda.try_borrow_mut_data()?;
    let risk: &mut RiskParams = bytemuck::from_bytes_mut(&mut risk_data[..RISK_PARAMS_SIZE]);
    if risk.is_initialized != 1 {
        return Err(VaultError::NotInitialized.into());
    }
    risk.pause_flags = pause_flags;
    risk.cooldown_override_secs = cooldown_override_secs;

    msg!(
        "Risk params: pause {:#06b}, cooldown override {}s",
        pause_flags,
        cooldown_override_secs
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 11: InitPriceFeed
// ═══════════════════════════════════════════════════════════════

fn process_init_price_feed(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    max_deviation_bps: u16,
    is_native: bool,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let admin = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let mint = next_account_info(accounts_iter)?;
    let feed_pda = next_account_info(accounts_iter)?;
    let authority = next_account_info(accounts_iter)?;
    let system_program = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, admin, Role::Admin)?;

    let mint_bytes: [u8; 32] = if is_native {
        [0u8; 32]
    } else {
        mint.key.to_bytes()
    };
    let (expected_feed, feed_bump) =
        state::derive_price_feed(program_id, vault_pda.key, &mint_bytes);
    if *feed_pda.key != expected_feed {
        return Err(VaultError::InvalidPda.into());
    }
    if !feed_pda.data_is_empty() {
        return Err(VaultError::AlreadyInitialized.into());
    }

    let rent = Rent::get()?;
    let feed_seeds: &[&[u8]] = &[
        b"price_feed",
        vault_pda.key.as_ref(),
        mint_bytes.as_ref(),
        &[feed_bump],
    ];
    invoke_signed(
        &system_instruction::create_account(
            admin.key,
            feed_pda.key,
            rent.minimum_balance(PRICE_FEED_SIZE),
            PRICE_FEED_SIZE as u64,
            program_id,
        ),
        &[admin.clone(), feed_pda.clone(), system_program.clone()],
        &[feed_seeds],
    )?;

    let mut feed_data = feed_pda.try_borrow_mut_data()?;
    let feed: &mut PriceFeed = bytemuck::from_bytes_mut(&mut feed_data[..PRICE_FEED_SIZE]);
    feed.is_initialized = 1;
    feed.bump = feed_bump;
    feed.max_deviation_bps = max_deviation_bps;
    feed.authority = authority.key.to_bytes();
    feed.mint = mint_bytes;

    msg!("Price feed created, authority {}", authority.key);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 12: PushPrice
// ═══════════════════════════════════════════════════════════════

fn process_push_price(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    price_e18: u64,
    timestamp: i64,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let authority = next_account_info(accounts_iter)?;
    let _vault_pda = next_account_info(accounts_iter)?;
    let feed_pda = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;

    if !authority.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    if feed_pda.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }

    let clock = Clock::from_account_info(clock_sysvar)?;

    let mut feed_data = feed_pda.try_borrow_mut_data()?;
    let feed: &mut PriceFeed = bytemuck::from_bytes_mut(&mut feed_data[..PRICE_FEED_SIZE]);
    if feed.is_initialized != 1 {
        return Err(VaultError::NotInitialized.into());
    }
    if feed.authority != authority.key.to_bytes() {
        return Err(VaultError::Unauthorized.into());
    }

    oracle::validate_push(feed, price_e18, timestamp, clock.unix_timestamp)?;
    feed.price_e18 = price_e18;
    feed.updated_at = timestamp;

    msg!("Price pushed: {} at {}", price_e18, timestamp);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 13: Deposit
// ═══════════════════════════════════════════════════════════════

fn process_deposit(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    amount: u64,
    referral: Option<Pubkey>,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let accounts_iter = &mut accounts.iter();

    let user = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let user_ata = next_account_info(accounts_iter)?;
    let pool_state = next_account_info(accounts_iter)?;
    let pool_vault = next_account_info(accounts_iter)?;
    let share_mint = next_account_info(accounts_iter)?;
    let user_share_ata = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;
    let operator_program = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;
    let remaining = accounts_iter.as_slice();

    if !user.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    check_vault_account(program_id, vault_pda)?;
    verify_token_program(token_program)?;

    let clock = Clock::from_account_info(clock_sysvar)?;
    let risk = load_risk_params(program_id, vault_pda.key, risk_pda)?;

    // Snapshot under an immutable borrow; totals are priced BEFORE this
    // deposit lands.
    let (chosen, minted, mint_bytes) = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);

        if vault.is_paused(PAUSE_DEPOSIT, &risk) {
            return Err(VaultError::Paused.into());
        }
        let asset = vault.asset(asset_index).ok_or(VaultError::AssetNotRegistered)?;
        if asset.is_native == 1 {
            return Err(VaultError::AssetNotRegistered.into());
        }
        if vault.share_mint != share_mint.key.to_bytes() {
            return Err(VaultError::InvalidMint.into());
        }
        if vault.operator_program != operator_program.key.to_bytes() {
            return Err(VaultError::InvalidOperatorProgram.into());
        }

        let totals = load_snapshot(program_id, vault, remaining, clock.unix_timestamp)?;
        let deposit_value = math::value_of(amount, totals.prices[asset_index as usize])
            .ok_or(VaultError::Overflow)?;

        // Caps: 0 disables. Checked against current value, not lifetime flow.
        if asset.value_cap > 0 {
            let asset_value = accounting::asset_total_value(vault, &totals, asset_index)
                .ok_or(VaultError::Overflow)?;
            if asset_value.checked_add(deposit_value).ok_or(VaultError::Overflow)?
                > asset.value_cap as u128
            {
                return Err(VaultError::ValueCapExceeded.into());
            }
        }
        if vault.global_value_cap > 0
            && totals
                .grand_total
                .checked_add(deposit_value)
                .ok_or(VaultError::Overflow)?
                > vault.global_value_cap as u128
        {
            return Err(VaultError::ValueCapExceeded.into());
        }

        let chosen = accounting::choose_delegate_for_deposit(vault, &totals)
            .ok_or(VaultError::NoEligibleDelegate)?;
        let delegate = vault.delegate(chosen).ok_or(VaultError::NoEligibleDelegate)?;
        if pool_state.key.to_bytes() != delegate.pool_state {
            return Err(VaultError::DelegateMismatch.into());
        }

        let minted = math::calculate_mint_amount(
            totals.grand_total,
            deposit_value,
            vault.total_shares as u128,
        )
        .ok_or(VaultError::Overflow)?;
        if minted == 0 {
            return Err(VaultError::ZeroMintAmount.into());
        }
        if minted > u64::MAX as u128 {
            return Err(VaultError::Overflow.into());
        }
        (chosen, minted as u64, asset.mint)
    };

    // The operator's deposit account for this asset must be the one its own
    // state declares.
    {
        let pool_data = pool_state.try_borrow_data()?;
        let pool: &OperatorPoolState = bytemuck::from_bytes(&pool_data[..OPERATOR_POOL_STATE_SIZE]);
        let expected_vault = pool
            .vault_for(&mint_bytes)
            .ok_or(VaultError::NoEligibleDelegate)?;
        if *pool_vault.key != expected_vault {
            return Err(VaultError::DelegateMismatch.into());
        }
    }

    // Funds go straight into the chosen operator pool
    cpi::cpi_pool_deposit(
        operator_program,
        user,
        user_ata,
        pool_state,
        pool_vault,
        token_program,
        &Pubkey::new_from_array(mint_bytes),
        amount,
    )?;

    // Mint shares to the depositor
    let (_, vault_auth_bump) = state::derive_vault_authority(program_id, vault_pda.key);
    let vault_auth_seeds: &[&[u8]] = &[b"vault_auth", vault_pda.key.as_ref(), &[vault_auth_bump]];
    invoke_signed(
        &spl_token::instruction::mint_to(
            token_program.key,
            share_mint.key,
            user_share_ata.key,
            vault_auth.key,
            &[],
            minted,
        )?,
        &[
            share_mint.clone(),
            user_share_ata.clone(),
            vault_auth.clone(),
            token_program.clone(),
        ],
        &[vault_auth_seeds],
    )?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
    vault.total_shares = vault
        .total_shares
        .checked_add(minted)
        .ok_or(VaultError::Overflow)?;

    if let Some(referrer) = referral {
        msg!("Referral: {}", referrer);
    }
    msg!(
        "Deposited {} of asset {} to delegate {}, minted {} shares",
        amount,
        asset_index,
        chosen,
        minted
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 14: DepositNative
// ═══════════════════════════════════════════════════════════════

fn process_deposit_native(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    amount: u64,
    referral: Option<Pubkey>,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let accounts_iter = &mut accounts.iter();

    let user = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let staging = next_account_info(accounts_iter)?;
    let share_mint = next_account_info(accounts_iter)?;
    let user_share_ata = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;
    let system_program = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;
    let remaining = accounts_iter.as_slice();

    if !user.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    check_vault_account(program_id, vault_pda)?;
    verify_token_program(token_program)?;

    let clock = Clock::from_account_info(clock_sysvar)?;
    let risk = load_risk_params(program_id, vault_pda.key, risk_pda)?;

    let minted = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);

        if vault.is_paused(PAUSE_DEPOSIT, &risk) {
            return Err(VaultError::Paused.into());
        }
        let native_index = vault
            .assets
            .iter()
            .position(|a| a.in_use == 1 && a.is_native == 1)
            .ok_or(VaultError::AssetNotRegistered)? as u8;
        if vault.share_mint != share_mint.key.to_bytes() {
            return Err(VaultError::InvalidMint.into());
        }
        let (expected_staging, _) = state::derive_native_staging(program_id, vault_pda.key);
        if *staging.key != expected_staging {
            return Err(VaultError::InvalidPda.into());
        }

        let totals = load_snapshot(program_id, vault, remaining, clock.unix_timestamp)?;
        let deposit_value = math::value_of(amount, totals.prices[native_index as usize])
            .ok_or(VaultError::Overflow)?;

        let native_asset = vault.asset(native_index).ok_or(VaultError::AssetNotRegistered)?;
        if native_asset.value_cap > 0 {
            let asset_value = accounting::asset_total_value(vault, &totals, native_index)
                .ok_or(VaultError::Overflow)?;
            if asset_value.checked_add(deposit_value).ok_or(VaultError::Overflow)?
                > native_asset.value_cap as u128
            {
                return Err(VaultError::ValueCapExceeded.into());
            }
        }
        if vault.global_value_cap > 0
            && totals
                .grand_total
                .checked_add(deposit_value)
                .ok_or(VaultError::Overflow)?
                > vault.global_value_cap as u128
        {
            return Err(VaultError::ValueCapExceeded.into());
        }

        let minted = math::calculate_mint_amount(
            totals.grand_total,
            deposit_value,
            vault.total_shares as u128,
        )
        .ok_or(VaultError::Overflow)?;
        if minted == 0 {
            return Err(VaultError::ZeroMintAmount.into());
        }
        if minted > u64::MAX as u128 {
            return Err(VaultError::Overflow.into());
        }
        minted as u64
    };

    // Lamports stage in the program-owned PDA until the external staking
    // adapter assembles validator deposits
    invoke(
        &system_instruction::transfer(user.key, staging.key, amount),
        &[user.clone(), staging.clone(), system_program.clone()],
    )?;

    let (_, vault_auth_bump) = state::derive_vault_authority(program_id, vault_pda.key);
    let vault_auth_seeds: &[&[u8]] = &[b"vault_auth", vault_pda.key.as_ref(), &[vault_auth_bump]];
    invoke_signed(
        &spl_token::instruction::mint_to(
            token_program.key,
            share_mint.key,
            user_share_ata.key,
            vault_auth.key,
            &[],
            minted,
        )?,
        &[
            share_mint.clone(),
            user_share_ata.clone(),
            vault_auth.clone(),
            token_program.clone(),
        ],
        &[vault_auth_seeds],
    )?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
    vault.native_staged = vault
        .native_staged
        .checked_add(amount)
        .ok_or(VaultError::Overflow)?;
    vault.total_shares = vault
        .total_shares
        .checked_add(minted)
        .ok_or(VaultError::Overflow)?;

    if let Some(referrer) = referral {
        msg!("Referral: {}", referrer);
    }
    msg!("Staged {} native, minted {} shares", amount, minted);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 15: Withdraw
// ═══════════════════════════════════════════════════════════════

fn process_withdraw(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    shares: u64,
) -> ProgramResult {
    if shares == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let accounts_iter = &mut accounts.iter();

    let user = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let ledger_pda = next_account_info(accounts_iter)?;
    let user_share_ata = next_account_info(accounts_iter)?;
    let share_custody = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;
    let remaining = accounts_iter.as_slice();

    if !user.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    check_vault_account(program_id, vault_pda)?;
    check_ledger_pda(program_id, vault_pda.key, ledger_pda)?;
    verify_token_program(token_program)?;

    let clock = Clock::from_account_info(clock_sysvar)?;
    let risk = load_risk_params(program_id, vault_pda.key, risk_pda)?;

    let amount = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);

        if vault.is_paused(PAUSE_WITHDRAW, &risk) {
            return Err(VaultError::Paused.into());
        }
        if vault.asset(asset_index).is_none() {
            return Err(VaultError::AssetNotRegistered.into());
        }
        if vault.share_custody != share_custody.key.to_bytes() {
            return Err(VaultError::InvalidPda.into());
        }

        let totals = load_snapshot(program_id, vault, remaining, clock.unix_timestamp)?;
        let (_, amount) = accounting::quote_redeem(vault, &totals, shares, asset_index)
            .ok_or(VaultError::Overflow)?;
        if amount == 0 {
            return Err(VaultError::ZeroRedeemAmount.into());
        }

        // A request the whole system cannot cover must be rejected, not
        // queued — it would pin the deficit ledger forever.
        let holdings = accounting::total_asset_holdings(vault, &totals, asset_index)
            .ok_or(VaultError::Overflow)?;
        if amount > holdings {
            return Err(VaultError::InsufficientCollateral.into());
        }
        amount
    };

    // Shares move to custody; they burn at claim, not here
    invoke(
        &spl_token::instruction::transfer(
            token_program.key,
            user_share_ata.key,
            share_custody.key,
            user.key,
            &[],
            shares,
        )?,
        &[
            user_share_ata.clone(),
            share_custody.clone(),
            user.clone(),
            token_program.clone(),
        ],
    )?;

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
    let mut ledger_data = ledger_pda.try_borrow_mut_data()?;
    let ledger: &mut WithdrawLedger =
        bytemuck::from_bytes_mut(&mut ledger_data[..WITHDRAW_LEDGER_SIZE]);

    if ledger.count as usize >= MAX_REQUESTS {
        return Err(VaultError::LedgerFull.into());
    }

    let entry = vault
        .asset_mut(asset_index)
        .ok_or(VaultError::AssetNotRegistered)?;
    let admission = entry.buffer.admit(amount).ok_or(VaultError::Overflow)?;

    let mut request = WithdrawRequest::zeroed();
    request.owner = user.key.to_bytes();
    request.asset_index = asset_index;
    request.queued = admission.queued as u8;
    request.shares = shares;
    request.amount = amount;
    request.created_at = clock.unix_timestamp;
    request.fill_at = admission.fill_at;
    let index = ledger.push(request).ok_or(VaultError::LedgerFull)?;

    msg!(
        "Withdraw request {}: {} shares for {} of asset {} (queued: {})",
        index,
        shares,
        amount,
        asset_index,
        admission.queued
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 16: Claim
// ═══════════════════════════════════════════════════════════════

fn process_claim(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    request_index: u32,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let caller = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let ledger_pda = next_account_info(accounts_iter)?;
    let owner = next_account_info(accounts_iter)?;
    let owner_dest = next_account_info(accounts_iter)?;
    let buffer = next_account_info(accounts_iter)?;
    let share_mint = next_account_info(accounts_iter)?;
    let share_custody = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;
    let remaining = accounts_iter.as_slice();

    if !caller.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    check_vault_account(program_id, vault_pda)?;
    check_ledger_pda(program_id, vault_pda.key, ledger_pda)?;
    verify_token_program(token_program)?;

    let clock = Clock::from_account_info(clock_sysvar)?;
    let risk = load_risk_params(program_id, vault_pda.key, risk_pda)?;

    // Phase 1: validate the request and re-price the payout under immutable
    // borrows.
    let (request, payout, is_native) = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);
        let ledger_data = ledger_pda.try_borrow_data()?;
        let ledger: &WithdrawLedger = bytemuck::from_bytes(&ledger_data[..WITHDRAW_LEDGER_SIZE]);

        if vault.is_paused(PAUSE_CLAIM, &risk) {
            return Err(VaultError::Paused.into());
        }
        let request = *ledger.get(request_index).ok_or(VaultError::RequestNotFound)?;
        if request.owner != owner.key.to_bytes() {
            return Err(VaultError::NotRequestOwner.into());
        }
        if clock.unix_timestamp < request.claimable_at(vault.effective_cooldown(&risk)) {
            return Err(VaultError::EarlyClaim.into());
        }
        let asset = vault
            .asset(request.asset_index)
            .ok_or(VaultError::AssetNotRegistered)?;
        if request.queued == 1 && request.fill_at > asset.buffer.queue_filled {
            return Err(VaultError::QueuedWithdrawalNotFilled.into());
        }
        if asset.buffer_vault != buffer.key.to_bytes() {
            return Err(VaultError::InvalidPda.into());
        }
        if vault.share_mint != share_mint.key.to_bytes() {
            return Err(VaultError::InvalidMint.into());
        }
        if vault.share_custody != share_custody.key.to_bytes() {
            return Err(VaultError::InvalidPda.into());
        }
        verify_claim_destination(&request, asset.is_native == 1, owner_dest)?;

        // Re-price at the current NAV; the payout only ever revises down, so
        // losses since request time are shared instead of socialized onto
        // remaining holders.
        let totals = load_snapshot(program_id, vault, remaining, clock.unix_timestamp)?;
        let (_, current_amount) =
            accounting::quote_redeem(vault, &totals, request.shares, request.asset_index)
                .ok_or(VaultError::Overflow)?;
        let payout = request.amount.min(current_amount);

        (request, payout, asset.is_native == 1)
    };

    // Phase 2: commit every state effect before any outbound transfer.
    {
        let mut vault_data = vault_pda.try_borrow_mut_data()?;
        let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
        let mut ledger_data = ledger_pda.try_borrow_mut_data()?;
        let ledger: &mut WithdrawLedger =
            bytemuck::from_bytes_mut(&mut ledger_data[..WITHDRAW_LEDGER_SIZE]);

        let entry = vault
            .asset_mut(request.asset_index)
            .ok_or(VaultError::AssetNotRegistered)?;
        entry
            .buffer
            .release_claim(request.amount, payout)
            .ok_or(VaultError::Overflow)?;
        vault.total_shares = vault
            .total_shares
            .checked_sub(request.shares)
            .ok_or(VaultError::Overflow)?;
        ledger
            .swap_remove(request_index)
            .ok_or(VaultError::RequestNotFound)?;
    }

    // Phase 3: burn the custodied shares, pay the owner.
    let (_, vault_auth_bump) = state::derive_vault_authority(program_id, vault_pda.key);
    let vault_auth_seeds: &[&[u8]] = &[b"vault_auth", vault_pda.key.as_ref(), &[vault_auth_bump]];

    invoke_signed(
        &spl_token::instruction::burn(
            token_program.key,
            share_custody.key,
            share_mint.key,
            vault_auth.key,
            &[],
            request.shares,
        )?,
        &[
            share_custody.clone(),
            share_mint.clone(),
            vault_auth.clone(),
            token_program.clone(),
        ],
        &[vault_auth_seeds],
    )?;

    if is_native {
        // The staging PDA is program-owned: debit it directly
        let mut from_lamports = buffer.try_borrow_mut_lamports()?;
        let mut to_lamports = owner_dest.try_borrow_mut_lamports()?;
        **from_lamports = from_lamports
            .checked_sub(payout)
            .ok_or(VaultError::InsufficientBuffer)?;
        **to_lamports = to_lamports.checked_add(payout).ok_or(VaultError::Overflow)?;
    } else {
        invoke_signed(
            &spl_token::instruction::transfer(
                token_program.key,
                buffer.key,
                owner_dest.key,
                vault_auth.key,
                &[],
                payout,
            )?,
            &[
                buffer.clone(),
                owner_dest.clone(),
                vault_auth.clone(),
                token_program.clone(),
            ],
            &[vault_auth_seeds],
        )?;
    }

    msg!(
        "Claimed request {}: burned {} shares, paid {} (requested {})",
        request.nonce,
        request.shares,
        payout,
        request.amount
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 17: InstantWithdraw
// ═══════════════════════════════════════════════════════════════

fn process_instant_withdraw(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    shares: u64,
    min_out: u64,
) -> ProgramResult {
    if shares == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let accounts_iter = &mut accounts.iter();

    let user = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let share_mint = next_account_info(accounts_iter)?;
    let user_share_ata = next_account_info(accounts_iter)?;
    let user_dest = next_account_info(accounts_iter)?;
    let fee_dest = next_account_info(accounts_iter)?;
    let buffer = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let risk_pda = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;
    let remaining = accounts_iter.as_slice();

    if !user.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    check_vault_account(program_id, vault_pda)?;
    verify_token_program(token_program)?;

    let clock = Clock::from_account_info(clock_sysvar)?;
    let risk = load_risk_params(program_id, vault_pda.key, risk_pda)?;

    let (amount, fee, net, is_native) = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);

        if vault.is_paused(PAUSE_INSTANT, &risk) {
            return Err(VaultError::Paused.into());
        }
        let asset = vault.asset(asset_index).ok_or(VaultError::AssetNotRegistered)?;
        if vault.share_mint != share_mint.key.to_bytes() {
            return Err(VaultError::InvalidMint.into());
        }
        if asset.buffer_vault != buffer.key.to_bytes() {
            return Err(VaultError::InvalidPda.into());
        }

        let totals = load_snapshot(program_id, vault, remaining, clock.unix_timestamp)?;
        let (_, amount) = accounting::quote_redeem(vault, &totals, shares, asset_index)
            .ok_or(VaultError::Overflow)?;
        if amount == 0 {
            return Err(VaultError::ZeroRedeemAmount.into());
        }

        let cfg = &vault.instant_config;
        let target = asset.buffer.target;
        let floor = math::drawdown_floor(target, cfg.drawdown_limit_bps);
        let free = asset.buffer.free_capacity();
        let free_after = free
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBuffer)?;
        if free_after < floor {
            return Err(VaultError::BelowDrawdownFloor.into());
        }

        let fee_bps = math::instant_fee_bps(free_after, target, floor, cfg.min_fee_bps, cfg.max_fee_bps);
        let fee = math::fee_amount(amount, fee_bps).ok_or(VaultError::Overflow)?;
        let net = amount.checked_sub(fee.min(amount)).ok_or(VaultError::Overflow)?;
        if net < min_out {
            return Err(VaultError::MinOutNotMet.into());
        }

        // The fee account must belong to the configured recipient
        if asset.is_native == 1 {
            if fee_dest.key.to_bytes() != cfg.fee_recipient {
                return Err(VaultError::Unauthorized.into());
            }
        } else if token_owner(fee_dest)?.to_bytes() != cfg.fee_recipient {
            return Err(VaultError::Unauthorized.into());
        }

        (amount, fee, net, asset.is_native == 1)
    };

    // Effects before interactions
    {
        let mut vault_data = vault_pda.try_borrow_mut_data()?;
        let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
        let entry = vault
            .asset_mut(asset_index)
            .ok_or(VaultError::AssetNotRegistered)?;
        entry
            .buffer
            .draw_free(amount)
            .ok_or(VaultError::InsufficientBuffer)?;
        vault.total_shares = vault
            .total_shares
            .checked_sub(shares)
            .ok_or(VaultError::Overflow)?;
    }

    // Burn the exiting shares straight from the user
    invoke(
        &spl_token::instruction::burn(
            token_program.key,
            user_share_ata.key,
            share_mint.key,
            user.key,
            &[],
            shares,
        )?,
        &[
            user_share_ata.clone(),
            share_mint.clone(),
            user.clone(),
            token_program.clone(),
        ],
    )?;

    let (_, vault_auth_bump) = state::derive_vault_authority(program_id, vault_pda.key);
    let vault_auth_seeds: &[&[u8]] = &[b"vault_auth", vault_pda.key.as_ref(), &[vault_auth_bump]];

    if is_native {
        let mut from_lamports = buffer.try_borrow_mut_lamports()?;
        **from_lamports = from_lamports
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBuffer)?;
        let mut to_user = user_dest.try_borrow_mut_lamports()?;
        **to_user = to_user.checked_add(net).ok_or(VaultError::Overflow)?;
        drop(to_user);
        let mut to_fee = fee_dest.try_borrow_mut_lamports()?;
        **to_fee = to_fee.checked_add(fee).ok_or(VaultError::Overflow)?;
    } else {
        invoke_signed(
            &spl_token::instruction::transfer(
                token_program.key,
                buffer.key,
                user_dest.key,
                vault_auth.key,
                &[],
                net,
            )?,
            &[
                buffer.clone(),
                user_dest.clone(),
                vault_auth.clone(),
                token_program.clone(),
            ],
            &[vault_auth_seeds],
        )?;
        if fee > 0 {
            invoke_signed(
                &spl_token::instruction::transfer(
                    token_program.key,
                    buffer.key,
                    fee_dest.key,
                    vault_auth.key,
                    &[],
                    fee,
                )?,
                &[
                    buffer.clone(),
                    fee_dest.clone(),
                    vault_auth.clone(),
                    token_program.clone(),
                ],
                &[vault_auth_seeds],
            )?;
        }
    }

    msg!(
        "Instant withdraw: burned {} shares, paid {} net ({} fee) of asset {}",
        shares,
        net,
        fee,
        asset_index
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 18: FillBuffer
// ═══════════════════════════════════════════════════════════════

fn process_fill_buffer(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    amount: u64,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let accounts_iter = &mut accounts.iter();

    let manager = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let source = next_account_info(accounts_iter)?;
    let buffer = next_account_info(accounts_iter)?;
    let token_or_system_program = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, manager, Role::Manager)?;

    let is_native = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);
        let asset = vault.asset(asset_index).ok_or(VaultError::AssetNotRegistered)?;
        if asset.buffer_vault != buffer.key.to_bytes() {
            return Err(VaultError::InvalidPda.into());
        }
        asset.is_native == 1
    };

    if is_native {
        invoke(
            &system_instruction::transfer(manager.key, buffer.key, amount),
            &[manager.clone(), buffer.clone(), token_or_system_program.clone()],
        )?;
    } else {
        verify_token_program(token_or_system_program)?;
        invoke(
            &spl_token::instruction::transfer(
                token_or_system_program.key,
                source.key,
                buffer.key,
                manager.key,
                &[],
                amount,
            )?,
            &[
                source.clone(),
                buffer.clone(),
                manager.clone(),
                token_or_system_program.clone(),
            ],
        )?;
    }

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
    let entry = vault
        .asset_mut(asset_index)
        .ok_or(VaultError::AssetNotRegistered)?;
    let (to_deficit, to_free) = entry
        .buffer
        .apply_fill(amount)
        .ok_or(VaultError::Overflow)?;

    msg!(
        "Filled buffer {}: {} to deficit, {} free",
        asset_index,
        to_deficit,
        to_free
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 19: WithdrawFromDelegate
// ═══════════════════════════════════════════════════════════════

fn process_withdraw_from_delegate(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    amount: u64,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let accounts_iter = &mut accounts.iter();

    let manager = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let pool_state = next_account_info(accounts_iter)?;
    let operator_program = next_account_info(accounts_iter)?;
    let clock_sysvar = next_account_info(accounts_iter)?;
    let remaining = accounts_iter.as_slice();

    validate_role(program_id, vault_pda, manager, Role::Manager)?;

    let clock = Clock::from_account_info(clock_sysvar)?;

    let mint_bytes = {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);

        let asset = vault.asset(asset_index).ok_or(VaultError::AssetNotRegistered)?;
        if vault.operator_program != operator_program.key.to_bytes() {
            return Err(VaultError::InvalidOperatorProgram.into());
        }

        let totals = load_snapshot(program_id, vault, remaining, clock.unix_timestamp)?;
        let chosen = accounting::choose_delegate_for_withdraw(vault, &totals, asset_index, amount)
            .ok_or(VaultError::NoEligibleDelegate)?;
        let delegate = vault.delegate(chosen).ok_or(VaultError::NoEligibleDelegate)?;
        if pool_state.key.to_bytes() != delegate.pool_state {
            return Err(VaultError::DelegateMismatch.into());
        }
        asset.mint
    };

    let (expected_auth, vault_auth_bump) = state::derive_vault_authority(program_id, vault_pda.key);
    if *vault_auth.key != expected_auth {
        return Err(VaultError::InvalidPda.into());
    }
    let vault_auth_seeds: &[&[u8]] = &[b"vault_auth", vault_pda.key.as_ref(), &[vault_auth_bump]];

    cpi::cpi_pool_initiate_withdraw(
        operator_program,
        vault_auth,
        pool_state,
        clock_sysvar,
        &Pubkey::new_from_array(mint_bytes),
        amount,
        vault_auth_seeds,
    )?;

    msg!("Initiated delegate withdrawal of {} of asset {}", amount, asset_index);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// 20: CollectDelegateWithdraw
// ═══════════════════════════════════════════════════════════════

fn process_collect_delegate_withdraw(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    asset_index: u8,
    request_id: u64,
) -> ProgramResult {
    let accounts_iter = &mut accounts.iter();

    let manager = next_account_info(accounts_iter)?;
    let vault_pda = next_account_info(accounts_iter)?;
    let vault_auth = next_account_info(accounts_iter)?;
    let pool_state = next_account_info(accounts_iter)?;
    let pool_vault = next_account_info(accounts_iter)?;
    let buffer = next_account_info(accounts_iter)?;
    let operator_program = next_account_info(accounts_iter)?;
    let token_program = next_account_info(accounts_iter)?;

    validate_role(program_id, vault_pda, manager, Role::Manager)?;
    verify_token_program(token_program)?;

    {
        let vault_data = vault_pda.try_borrow_data()?;
        let vault: &Vault = bytemuck::from_bytes(&vault_data[..VAULT_SIZE]);

        let asset = vault.asset(asset_index).ok_or(VaultError::AssetNotRegistered)?;
        if asset.is_native == 1 {
            return Err(VaultError::AssetNotRegistered.into());
        }
        if asset.buffer_vault != buffer.key.to_bytes() {
            return Err(VaultError::InvalidPda.into());
        }
        if vault.operator_program != operator_program.key.to_bytes() {
            return Err(VaultError::InvalidOperatorProgram.into());
        }
        let pool_bytes = pool_state.key.to_bytes();
        if !vault
            .delegates
            .iter()
            .any(|d| d.in_use == 1 && d.pool_state == pool_bytes)
        {
            return Err(VaultError::DelegateNotFound.into());
        }
    }

    // Trust the balance delta, not the operator's word
    let before = token_balance(buffer)?;

    let (expected_auth, vault_auth_bump) = state::derive_vault_authority(program_id, vault_pda.key);
    if *vault_auth.key != expected_auth {
        return Err(VaultError::InvalidPda.into());
    }
    let vault_auth_seeds: &[&[u8]] = &[b"vault_auth", vault_pda.key.as_ref(), &[vault_auth_bump]];

    cpi::cpi_pool_complete_withdraw(
        operator_program,
        vault_auth,
        pool_state,
        pool_vault,
        buffer,
        token_program,
        request_id,
        vault_auth_seeds,
    )?;

    let after = token_balance(buffer)?;
    let received = after.checked_sub(before).ok_or(VaultError::Overflow)?;
    if received == 0 {
        return Err(VaultError::ZeroAmount.into());
    }

    let mut vault_data = vault_pda.try_borrow_mut_data()?;
    let vault: &mut Vault = bytemuck::from_bytes_mut(&mut vault_data[..VAULT_SIZE]);
    let entry = vault
        .asset_mut(asset_index)
        .ok_or(VaultError::AssetNotRegistered)?;
    let (to_deficit, to_free) = entry
        .buffer
        .apply_fill(received)
        .ok_or(VaultError::Overflow)?;

    msg!(
        "Collected {} from delegate into buffer {}: {} to deficit, {} free",
        received,
        asset_index,
        to_deficit,
        to_free
    );
    Ok(())
}
