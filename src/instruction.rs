use solana_program::{program_error::ProgramError, pubkey::Pubkey};

/// Instructions for the liquid restaking vault program.
#[derive(Debug)]
pub enum VaultInstruction {
    /// Initialize a vault: state PDA, withdraw ledger, risk params, share
    /// mint, and share custody account.
    ///
    /// Accounts:
    ///   0. `[signer, writable]` Admin (pays rent, becomes vault admin)
    ///   1. `[signer]` Base account (vault PDA seed)
    ///   2. `[writable]` Vault PDA (to be created)
    ///   3. `[writable]` Withdraw ledger PDA (to be created)
    ///   4. `[writable]` Risk params PDA (to be created)
    ///   5. `[writable]` Share mint (to be initialized, authority = vault auth)
    ///   6. `[writable]` Share custody token account (to be initialized)
    ///   7. `[]` Vault authority PDA
    ///   8. `[]` Manager
    ///   9. `[]` Guardian
    ///  10. `[]` Operator pool program
    ///  11. `[]` Token program
    ///  12. `[]` System program
    ///  13. `[]` Rent sysvar
    InitVault {
        cooldown_secs: u64,
        max_price_age_secs: u64,
        global_value_cap: u64,
    },

    /// Register a collateral asset (admin). The native pseudo-asset stores a
    /// zero mint and uses the native staging PDA as its buffer.
    ///
    /// Accounts:
    ///   0. `[signer, writable]` Admin (pays rent)
    ///   1. `[writable]` Vault PDA
    ///   2. `[]` Collateral mint (any account when `is_native`)
    ///   3. `[]` Price feed PDA for this asset
    ///   4. `[writable]` Buffer token account (to be initialized; the native
    ///      staging PDA, to be created, when `is_native`)
    ///   5. `[]` Vault authority PDA
    ///   6. `[]` Token program (system program when `is_native`)
    ///   7. `[]` Rent sysvar
    RegisterAsset {
        value_cap: u64,
        buffer_target: u64,
        is_native: bool,
    },

    /// Remove an asset (admin). Fails while its buffer holds liquidity,
    /// reservations, or an outstanding deficit.
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    RemoveAsset { asset_index: u8 },

    /// Add an operator delegate (admin).
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    ///   2. `[]` Operator pool state account (owned by the operator program)
    AddDelegate { allocation_bps: u16 },

    /// Remove a delegate (admin). Live balances are the operator program's
    /// concern; removal only stops new routing.
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    RemoveDelegate { delegate_index: u8 },

    /// Update a delegate's allocation target (admin).
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    SetDelegateAllocation {
        delegate_index: u8,
        allocation_bps: u16,
    },

    /// Set a buffer's replenishment target (admin).
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    SetBufferTarget { asset_index: u8, target: u64 },

    /// Admin updates vault configuration.
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    UpdateConfig {
        new_cooldown_secs: Option<u64>,
        new_global_value_cap: Option<u64>,
    },

    /// Set the instant-withdraw fee curve (admin).
    ///
    /// Accounts:
    ///   0. `[signer]` Admin
    ///   1. `[writable]` Vault PDA
    ///   2. `[]` Fee recipient
    SetInstantWithdrawConfig {
        drawdown_limit_bps: u16,
        min_fee_bps: u16,
        max_fee_bps: u16,
    },

    /// Set the vault's local pause bits (guardian).
    ///
    /// Accounts:
    ///   0. `[signer]` Guardian
    ///   1. `[writable]` Vault PDA
    SetPauseFlags { flags: u8 },

    /// Update dynamic risk parameters (guardian). The cooldown override can
    /// extend but never shorten the local cooldown.
    ///
    /// Accounts:
    ///   0. `[signer]` Guardian
    ///   1. `[]` Vault PDA
    ///   2. `[writable]` Risk params PDA
    SetRiskParams {
        pause_flags: u8,
        cooldown_override_secs: u64,
    },

    /// Create a price feed for an asset mint (admin).
    ///
    /// Accounts:
    ///   0. `[signer, writable]` Admin (pays rent)
    ///   1. `[]` Vault PDA
    ///   2. `[]` Asset mint (any account when `is_native`)
    ///   3. `[writable]` Price feed PDA (to be created)
    ///   4. `[]` Feed update authority
    ///   5. `[]` System program
    InitPriceFeed {
        max_deviation_bps: u16,
        is_native: bool,
    },

    /// Push a price update (feed authority). Rejected if the timestamp is
    /// non-monotonic or future-dated, or the price steps outside the feed's
    /// deviation bound.
    ///
    /// Accounts:
    ///   0. `[signer]` Feed authority
    ///   1. `[]` Vault PDA
    ///   2. `[writable]` Price feed PDA
    ///   3. `[]` Clock sysvar
    PushPrice { price_e18: u64, timestamp: i64 },

    /// Deposit collateral. Routed to the delegate chosen by allocation
    /// load-balancing; mints shares at the running price.
    ///
    /// Accounts:
    ///   0. `[signer]` User
    ///   1. `[writable]` Vault PDA
    ///   2. `[writable]` User's collateral token account (source)
    ///   3. `[writable]` Target operator pool state (must match selection)
    ///   4. `[writable]` Target operator's asset vault (destination)
    ///   5. `[writable]` Share mint
    ///   6. `[writable]` User's share token account
    ///   7. `[]` Vault authority PDA (mint authority)
    ///   8. `[]` Risk params PDA
    ///   9. `[]` Operator pool program
    ///  10. `[]` Token program
    ///  11. `[]` Clock sysvar
    ///  12... `[]` Price feeds (registry order), then operator pool states
    ///         (delegate order)
    Deposit {
        asset_index: u8,
        amount: u64,
        referral: Option<Pubkey>,
    },

    /// Deposit native currency. Lamports go to the staging PDA until the
    /// external staking adapter assembles validator deposits.
    ///
    /// Accounts:
    ///   0. `[signer, writable]` User
    ///   1. `[writable]` Vault PDA
    ///   2. `[writable]` Native staging PDA
    ///   3. `[writable]` Share mint
    ///   4. `[writable]` User's share token account
    ///   5. `[]` Vault authority PDA
    ///   6. `[]` Risk params PDA
    ///   7. `[]` System program
    ///   8. `[]` Token program
    ///   9. `[]` Clock sysvar
    ///  10... `[]` Price feeds, then operator pool states
    DepositNative {
        amount: u64,
        referral: Option<Pubkey>,
    },

    /// Open a withdraw request: shares move to custody (not burned), the
    /// redeem amount is fixed at today's price, and the buffer either
    /// reserves it in full or queues the shortfall.
    ///
    /// Accounts:
    ///   0. `[signer]` User
    ///   1. `[writable]` Vault PDA
    ///   2. `[writable]` Withdraw ledger PDA
    ///   3. `[writable]` User's share token account (source)
    ///   4. `[writable]` Share custody token account
    ///   5. `[]` Risk params PDA
    ///   6. `[]` Token program
    ///   7. `[]` Clock sysvar
    ///   8... `[]` Price feeds, then operator pool states
    Withdraw { asset_index: u8, shares: u64 },

    /// Finalize a request after the cooldown (permissionless; pays the
    /// request owner). Payout is re-priced at the current NAV and only ever
    /// revised down. All bookkeeping commits before the outbound transfer.
    ///
    /// Accounts:
    ///   0. `[signer]` Caller (pays tx fee)
    ///   1. `[writable]` Vault PDA
    ///   2. `[writable]` Withdraw ledger PDA
    ///   3. `[]` Request owner
    ///   4. `[writable]` Owner's asset token account (destination; must be
    ///      owned by the request owner — the owner's own system account for
    ///      native)
    ///   5. `[writable]` Buffer token account (native staging PDA for native)
    ///   6. `[writable]` Share mint (burn)
    ///   7. `[writable]` Share custody token account
    ///   8. `[]` Vault authority PDA
    ///   9. `[]` Risk params PDA
    ///  10. `[]` Token program
    ///  11. `[]` Clock sysvar
    ///  12... `[]` Price feeds, then operator pool states
    Claim { request_index: u32 },

    /// Cooldown-bypassing exit against free buffer capacity, paying a fee
    /// that scales linearly with buffer drawdown.
    ///
    /// Accounts:
    ///   0. `[signer]` User
    ///   1. `[writable]` Vault PDA
    ///   2. `[writable]` Share mint (burn)
    ///   3. `[writable]` User's share token account (source)
    ///   4. `[writable]` User's asset token account (net payout)
    ///   5. `[writable]` Fee recipient's asset token account
    ///   6. `[writable]` Buffer token account
    ///   7. `[]` Vault authority PDA
    ///   8. `[]` Risk params PDA
    ///   9. `[]` Token program
    ///  10. `[]` Clock sysvar
    ///  11... `[]` Price feeds, then operator pool states
    InstantWithdraw {
        asset_index: u8,
        shares: u64,
        min_out: u64,
    },

    /// Refill a buffer from the deposit flow (manager only). Inbound funds
    /// pay the deficit down first; the remainder is free capacity.
    ///
    /// Accounts:
    ///   0. `[signer]` Manager (fee payer and lamport source for native)
    ///   1. `[writable]` Vault PDA
    ///   2. `[writable]` Source token account (manager's; for native, the
    ///      manager's system account)
    ///   3. `[writable]` Buffer token account (native staging PDA for native)
    ///   4. `[]` Token program (system program for native)
    FillBuffer { asset_index: u8, amount: u64 },

    /// Start pulling liquidity out of an operator pool toward the buffer
    /// (manager only). The source delegate is chosen by the two-pass
    /// rebalancing scan.
    ///
    /// Accounts:
    ///   0. `[signer]` Manager
    ///   1. `[]` Vault PDA
    ///   2. `[]` Vault authority PDA (signs the adapter CPI)
    ///   3. `[writable]` Chosen operator pool state (must match selection)
    ///   4. `[]` Operator pool program
    ///   5. `[]` Clock sysvar
    ///   6... `[]` Price feeds, then operator pool states
    WithdrawFromDelegate { asset_index: u8, amount: u64 },

    /// Complete a matured operator withdrawal into the buffer (manager
    /// only). The received amount is measured from the buffer balance delta
    /// and applied as a fill.
    ///
    /// Accounts:
    ///   0. `[signer]` Manager
    ///   1. `[writable]` Vault PDA
    ///   2. `[]` Vault authority PDA (signs the adapter CPI)
    ///   3. `[writable]` Operator pool state
    ///   4. `[writable]` Buffer token account (destination)
    ///   5. `[]` Operator pool program
    ///   6. `[]` Token program
    CollectDelegateWithdraw { asset_index: u8, request_id: u64 },
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, ProgramError> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(ProgramError::InvalidInstructionData)
}

fn read_i64(data: &[u8], offset: usize) -> Result<i64, ProgramError> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_le_bytes)
        .ok_or(ProgramError::InvalidInstructionData)
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ProgramError> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ProgramError::InvalidInstructionData)
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, ProgramError> {
    data.get(offset..offset + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or(ProgramError::InvalidInstructionData)
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8, ProgramError> {
    data.get(offset)
        .copied()
        .ok_or(ProgramError::InvalidInstructionData)
}

/// Optional referral: flag byte + 32-byte pubkey.
fn read_referral(data: &[u8], offset: usize) -> Result<Option<Pubkey>, ProgramError> {
    let has = read_u8(data, offset)? != 0;
    if !has {
        return Ok(None);
    }
    let key = data
        .get(offset + 1..offset + 33)
        .and_then(|b| Pubkey::try_from(b).ok())
        .ok_or(ProgramError::InvalidInstructionData)?;
    Ok(Some(key))
}

impl VaultInstruction {
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        let (&tag, rest) = data
            .split_first()
            .ok_or(ProgramError::InvalidInstructionData)?;

        match tag {
            0 => Ok(Self::InitVault {
                cooldown_secs: read_u64(rest, 0)?,
                max_price_age_secs: read_u64(rest, 8)?,
                global_value_cap: read_u64(rest, 16)?,
            }),
            1 => Ok(Self::RegisterAsset {
                value_cap: read_u64(rest, 0)?,
                buffer_target: read_u64(rest, 8)?,
                is_native: read_u8(rest, 16)? != 0,
            }),
            2 => Ok(Self::RemoveAsset {
                asset_index: read_u8(rest, 0)?,
            }),
            3 => Ok(Self::AddDelegate {
                allocation_bps: read_u16(rest, 0)?,
            }),
            4 => Ok(Self::RemoveDelegate {
                delegate_index: read_u8(rest, 0)?,
            }),
            5 => Ok(Self::SetDelegateAllocation {
                delegate_index: read_u8(rest, 0)?,
                allocation_bps: read_u16(rest, 1)?,
            }),
            6 => Ok(Self::SetBufferTarget {
                asset_index: read_u8(rest, 0)?,
                target: read_u64(rest, 1)?,
            }),
            7 => {
                let has_cooldown = read_u8(rest, 0)? != 0;
                let cooldown = read_u64(rest, 1)?;
                let has_cap = read_u8(rest, 9)? != 0;
                let cap = read_u64(rest, 10)?;
                Ok(Self::UpdateConfig {
                    new_cooldown_secs: if has_cooldown { Some(cooldown) } else { None },
                    new_global_value_cap: if has_cap { Some(cap) } else { None },
                })
            }
            8 => Ok(Self::SetInstantWithdrawConfig {
                drawdown_limit_bps: read_u16(rest, 0)?,
                min_fee_bps: read_u16(rest, 2)?,
                max_fee_bps: read_u16(rest, 4)?,
            }),
            9 => Ok(Self::SetPauseFlags {
                flags: read_u8(rest, 0)?,
            }),
            10 => Ok(Self::SetRiskParams {
                pause_flags: read_u8(rest, 0)?,
                cooldown_override_secs: read_u64(rest, 1)?,
            }),
            11 => Ok(Self::InitPriceFeed {
                max_deviation_bps: read_u16(rest, 0)?,
                is_native: read_u8(rest, 2)? != 0,
            }),
            12 => Ok(Self::PushPrice {
                price_e18: read_u64(rest, 0)?,
                timestamp: read_i64(rest, 8)?,
            }),
            13 => Ok(Self::Deposit {
                asset_index: read_u8(rest, 0)?,
                amount: read_u64(rest, 1)?,
                referral: read_referral(rest, 9)?,
            }),
            14 => Ok(Self::DepositNative {
                amount: read_u64(rest, 0)?,
                referral: read_referral(rest, 8)?,
            }),
            15 => Ok(Self::Withdraw {
                asset_index: read_u8(rest, 0)?,
                shares: read_u64(rest, 1)?,
            }),
            16 => Ok(Self::Claim {
                request_index: read_u32(rest, 0)?,
            }),
            17 => Ok(Self::InstantWithdraw {
                asset_index: read_u8(rest, 0)?,
                shares: read_u64(rest, 1)?,
                min_out: read_u64(rest, 9)?,
            }),
            18 => Ok(Self::FillBuffer {
                asset_index: read_u8(rest, 0)?,
                amount: read_u64(rest, 1)?,
            }),
            19 => Ok(Self::WithdrawFromDelegate {
                asset_index: read_u8(rest, 0)?,
                amount: read_u64(rest, 1)?,
            }),
            20 => Ok(Self::CollectDelegateWithdraw {
                asset_index: read_u8(rest, 0)?,
                request_id: read_u64(rest, 1)?,
            }),
            _ => Err(ProgramError::InvalidInstructionData),
        }
    }
}
