use bytemuck::{Pod, Zeroable};
use solana_program::pubkey::Pubkey;

/// Capacity of the asset registry.
pub const MAX_ASSETS: usize = 8;
/// Capacity of the delegate registry.
pub const MAX_DELEGATES: usize = 16;
/// Capacity of the withdraw ledger.
pub const MAX_REQUESTS: usize = 64;

/// Pause bits — set locally by the guardian on the vault, or dynamically via
/// the `RiskParams` PDA. A bit set in either place pauses the entry point.
pub const PAUSE_DEPOSIT: u8 = 1 << 0;
pub const PAUSE_WITHDRAW: u8 = 1 << 1;
pub const PAUSE_CLAIM: u8 = 1 << 2;
pub const PAUSE_INSTANT: u8 = 1 << 3;

/// Per-asset liquidity buffer.
///
/// `available` is the RAW buffer balance (reserved + free); free capacity is
/// `available - claim_reserve`. `queue_to_fill` / `queue_filled` form a
/// cumulative deficit ledger: both only ever increase, and
/// `queue_to_fill - queue_filled` is the outstanding unfunded withdrawal
/// liability. A queued request is funded exactly when its stored watermark
/// is <= `queue_filled` — no per-request fill tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BufferState {
    /// Target size the buffer is replenished toward
    pub target: u64,
    /// Raw token balance held in the buffer vault
    pub available: u64,
    /// Portion of `available` promised to open requests
    pub claim_reserve: u64,
    /// Cumulative shortfall ever queued
    pub queue_to_fill: u64,
    /// Cumulative shortfall ever funded
    pub queue_filled: u64,
}

/// Outcome of admitting a withdrawal against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Amount reserved immediately
    pub reserved: u64,
    /// Whether a shortfall was queued
    pub queued: bool,
    /// Watermark the request must wait for (`queue_filled >= fill_at`)
    pub fill_at: u64,
}

impl BufferState {
    /// Liquidity not yet promised to any request.
    pub fn free_capacity(&self) -> u64 {
        self.available.saturating_sub(self.claim_reserve)
    }

    /// Outstanding unfunded withdrawal liability.
    pub fn deficit(&self) -> u64 {
        self.queue_to_fill.saturating_sub(self.queue_filled)
    }

    /// Admit a withdrawal of `amount` tokens: reserve what free capacity
    /// covers, queue the shortfall. Returns `None` on counter overflow.
    pub fn admit(&mut self, amount: u64) -> Option<Admission> {
        let free = self.free_capacity();
        if amount <= free {
            self.claim_reserve = self.claim_reserve.checked_add(amount)?;
            Some(Admission { reserved: amount, queued: false, fill_at: 0 })
        } else {
            let shortfall = amount - free;
            self.claim_reserve = self.claim_reserve.checked_add(free)?;
            self.queue_to_fill = self.queue_to_fill.checked_add(shortfall)?;
            Some(Admission { reserved: free, queued: true, fill_at: self.queue_to_fill })
        }
    }

    /// Apply an inbound refill of `amount` tokens: the deficit is paid down
    /// first (those tokens become reserved for queued requests), the
    /// remainder is free capacity. Returns `(to_deficit, to_free)`.
    pub fn apply_fill(&mut self, amount: u64) -> Option<(u64, u64)> {
        let to_deficit = amount.min(self.deficit());
        self.queue_filled = self.queue_filled.checked_add(to_deficit)?;
        self.claim_reserve = self.claim_reserve.checked_add(to_deficit)?;
        self.available = self.available.checked_add(amount)?;
        Some((to_deficit, amount - to_deficit))
    }

    /// Finalize a claim: release the full reservation, pay out `payout`
    /// (<= `reserved`). Any surplus from a NAV-reduced payout stays in the
    /// buffer as free capacity.
    pub fn release_claim(&mut self, reserved: u64, payout: u64) -> Option<()> {
        if payout > reserved {
            return None;
        }
        self.claim_reserve = self.claim_reserve.checked_sub(reserved)?;
        self.available = self.available.checked_sub(payout)?;
        Some(())
    }

    /// Draw `amount` straight from free capacity (instant-withdraw path).
    pub fn draw_free(&mut self, amount: u64) -> Option<()> {
        if amount > self.free_capacity() {
            return None;
        }
        self.available = self.available.checked_sub(amount)?;
        Some(())
    }
}

/// Registered collateral asset. Slot order doubles as iteration order.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct AssetEntry {
    /// Slot occupied (1 = yes)
    pub in_use: u8,
    /// Native-currency pseudo-asset (mint is all zeros)
    pub is_native: u8,
    pub _padding: [u8; 6],
    /// Collateral mint (zeros for the native entry)
    pub mint: [u8; 32],
    /// Price feed PDA for this asset
    pub price_feed: [u8; 32],
    /// Buffer token account (owned by the vault authority)
    pub buffer_vault: [u8; 32],
    /// Per-asset value cap in value units (0 = disabled)
    pub value_cap: u64,
    pub buffer: BufferState,
}

/// One operator delegate: stake routed to one external operator pool.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DelegateEntry {
    /// Slot occupied (1 = yes)
    pub in_use: u8,
    pub _padding: [u8; 5],
    /// Allocation target in bps of total value (<= 10_000; no sum constraint)
    pub allocation_bps: u16,
    /// Operator pool state account (owned by the operator program)
    pub pool_state: [u8; 32],
}

/// Fee curve and floor for cooldown-bypassing exits.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct InstantWithdrawConfig {
    /// Buffer drawdown floor as a fraction of the buffer target, in bps
    pub drawdown_limit_bps: u16,
    /// Fee with the buffer untouched
    pub min_fee_bps: u16,
    /// Fee at the drawdown floor
    pub max_fee_bps: u16,
    pub _padding: [u8; 2],
    /// Owner of the fee token accounts
    pub fee_recipient: [u8; 32],
}

/// Vault state — one per deployment.
/// PDA seeds: [b"vault", base]
///
/// Holds the asset and delegate registries, per-asset buffers, roles, and
/// share accounting. Delegate balances are never cached here: they are read
/// live from the operator pool accounts on every priced operation.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Vault {
    /// Whether the vault is initialized (1 = yes)
    pub is_initialized: u8,
    /// Storage layout version (additive evolution via `_reserved`)
    pub version: u8,
    /// Bump seed for the vault PDA
    pub bump: u8,
    /// Bump seed for the vault authority PDA
    pub vault_authority_bump: u8,
    /// Local pause bits (guardian-set)
    pub pause_flags: u8,
    /// Occupied asset slots
    pub asset_count: u8,
    /// Occupied delegate slots
    pub delegate_count: u8,
    pub _padding: u8,

    /// Registry/config admin
    pub admin: [u8; 32],
    /// Liquidity manager (fills buffers, rebalances delegates)
    pub manager: [u8; 32],
    /// Pause / risk-parameter authority
    pub guardian: [u8; 32],
    /// Share mint (authority = vault authority PDA)
    pub share_mint: [u8; 32],
    /// Escrow token account for shares locked by open withdraw requests
    pub share_custody: [u8; 32],
    /// Operator pool adapter program (for CPI and account-owner checks)
    pub operator_program: [u8; 32],

    /// Mirror of the share mint supply; mutated only by mint/burn paths here
    pub total_shares: u64,
    /// Global value cap in value units (0 = disabled)
    pub global_value_cap: u64,
    /// Local claim cooldown in seconds (risk params can only extend it)
    pub cooldown_secs: u64,
    /// Maximum price feed age in seconds
    pub max_price_age_secs: u64,
    /// Native deposits staged for validator assembly (lamports)
    pub native_staged: u64,

    pub assets: [AssetEntry; MAX_ASSETS],
    pub delegates: [DelegateEntry; MAX_DELEGATES],
    pub instant_config: InstantWithdrawConfig,

    /// Reserved for future use
    pub _reserved: [u8; 128],
}

/// Size of Vault in bytes
pub const VAULT_SIZE: usize = core::mem::size_of::<Vault>();

impl Vault {
    pub fn admin_pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.admin)
    }

    pub fn manager_pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.manager)
    }

    pub fn guardian_pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.guardian)
    }

    pub fn share_mint_pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.share_mint)
    }

    /// Registered asset at `index`, if the slot is in use.
    pub fn asset(&self, index: u8) -> Option<&AssetEntry> {
        self.assets
            .get(index as usize)
            .filter(|a| a.in_use == 1)
    }

    pub fn asset_mut(&mut self, index: u8) -> Option<&mut AssetEntry> {
        self.assets
            .get_mut(index as usize)
            .filter(|a| a.in_use == 1)
    }

    pub fn delegate(&self, index: u8) -> Option<&DelegateEntry> {
        self.delegates
            .get(index as usize)
            .filter(|d| d.in_use == 1)
    }

    /// First free asset slot, scanning in registry order.
    pub fn free_asset_slot(&self) -> Option<u8> {
        self.assets.iter().position(|a| a.in_use == 0).map(|i| i as u8)
    }

    pub fn free_delegate_slot(&self) -> Option<u8> {
        self.delegates.iter().position(|d| d.in_use == 0).map(|i| i as u8)
    }

    pub fn find_asset_by_mint(&self, mint: &[u8; 32]) -> Option<u8> {
        self.assets
            .iter()
            .position(|a| a.in_use == 1 && &a.mint == mint)
            .map(|i| i as u8)
    }

    /// View: buffer liquidity a new withdrawal can be admitted against.
    pub fn available_to_withdraw(&self, asset_index: u8) -> Option<u64> {
        self.asset(asset_index).map(|a| a.buffer.free_capacity())
    }

    /// View: outstanding unfunded withdrawal liability for an asset.
    pub fn withdraw_deficit(&self, asset_index: u8) -> Option<u64> {
        self.asset(asset_index).map(|a| a.buffer.deficit())
    }

    /// Effective claim cooldown: the risk feed may extend, never shorten.
    pub fn effective_cooldown(&self, risk: &RiskParams) -> u64 {
        self.cooldown_secs.max(risk.cooldown_override_secs)
    }

    /// An entry point is paused if its bit is set locally or in risk params.
    pub fn is_paused(&self, flag: u8, risk: &RiskParams) -> bool {
        (self.pause_flags | risk.pause_flags) & flag != 0
    }
}

/// Open withdraw request. Shares sit in custody until claim burns them.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct WithdrawRequest {
    /// Monotonic id, assigned from the ledger's counter
    pub nonce: u64,
    /// Request owner — the only account paid at claim
    pub owner: [u8; 32],
    /// Target asset registry index
    pub asset_index: u8,
    /// Whether a shortfall was queued at request time
    pub queued: u8,
    pub _padding: [u8; 6],
    /// Shares locked in custody
    pub shares: u64,
    /// Redeem amount in token units, fixed at request time (payout may only
    /// ever be revised DOWN at claim)
    pub amount: u64,
    /// Request creation time (unix seconds)
    pub created_at: i64,
    /// Deficit-ledger watermark the request waits for when queued
    pub fill_at: u64,
}

impl WithdrawRequest {
    /// Earliest unix time the request can be claimed.
    pub fn claimable_at(&self, cooldown_secs: u64) -> i64 {
        let cooldown = i64::try_from(cooldown_secs).unwrap_or(i64::MAX);
        self.created_at.saturating_add(cooldown)
    }
}

/// Withdraw request ledger — one per vault, order-agnostic swap-remove.
/// PDA seeds: [b"withdraw_ledger", vault]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct WithdrawLedger {
    pub is_initialized: u8,
    pub bump: u8,
    pub _padding: [u8; 2],
    /// Live requests in `requests[..count]`
    pub count: u32,
    /// Next nonce to assign
    pub next_nonce: u64,
    pub requests: [WithdrawRequest; MAX_REQUESTS],
}

pub const WITHDRAW_LEDGER_SIZE: usize = core::mem::size_of::<WithdrawLedger>();

impl WithdrawLedger {
    pub fn push(&mut self, mut request: WithdrawRequest) -> Option<u32> {
        let index = self.count;
        if index as usize >= MAX_REQUESTS {
            return None;
        }
        request.nonce = self.next_nonce;
        self.next_nonce = self.next_nonce.checked_add(1)?;
        self.requests[index as usize] = request;
        self.count += 1;
        Some(index)
    }

    pub fn get(&self, index: u32) -> Option<&WithdrawRequest> {
        if index >= self.count {
            return None;
        }
        Some(&self.requests[index as usize])
    }

    /// O(1) removal: the last live request moves into the freed slot.
    pub fn swap_remove(&mut self, index: u32) -> Option<WithdrawRequest> {
        if index >= self.count {
            return None;
        }
        let removed = self.requests[index as usize];
        let last = self.count - 1;
        self.requests[index as usize] = self.requests[last as usize];
        self.requests[last as usize] = WithdrawRequest::zeroed();
        self.count = last;
        Some(removed)
    }
}

/// Per-asset price feed, updated by the feed authority through `PushPrice`.
/// PDA seeds: [b"price_feed", vault, mint]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PriceFeed {
    pub is_initialized: u8,
    pub bump: u8,
    /// Maximum single-update deviation from the last price, in bps
    pub max_deviation_bps: u16,
    pub _padding: [u8; 4],
    /// Update authority (bridge relayer on remote deployments)
    pub authority: [u8; 32],
    /// Asset mint this feed prices (zeros for native)
    pub mint: [u8; 32],
    /// Value of one base unit, e18 fixed point
    pub price_e18: u64,
    /// Publish time of the current price (unix seconds)
    pub updated_at: i64,
}

pub const PRICE_FEED_SIZE: usize = core::mem::size_of::<PriceFeed>();

/// Guardian-updated dynamic risk parameters.
/// PDA seeds: [b"risk_params", vault]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RiskParams {
    pub is_initialized: u8,
    pub bump: u8,
    /// Dynamic pause bits, OR-ed with the vault's local bits
    pub pause_flags: u8,
    pub _padding: [u8; 5],
    /// Extends (never shortens) the local claim cooldown
    pub cooldown_override_secs: u64,
}

pub const RISK_PARAMS_SIZE: usize = core::mem::size_of::<RiskParams>();

/// Per-asset balance slot inside an operator pool account.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct AssetBalance {
    pub mint: [u8; 32],
    /// Token account deposits for this asset land in
    pub vault: [u8; 32],
    pub amount: u64,
}

/// Operator pool adapter state — CONSUMED layout, owned by the operator
/// program. Balances are read live on every priced operation, never cached.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct OperatorPoolState {
    pub is_initialized: u8,
    pub _padding: [u8; 7],
    /// Native stake delegated to validators through this operator
    pub native_staked: u64,
    pub balances: [AssetBalance; MAX_ASSETS],
}

pub const OPERATOR_POOL_STATE_SIZE: usize = core::mem::size_of::<OperatorPoolState>();

impl OperatorPoolState {
    /// Live balance for `mint`, zero if the operator holds none.
    pub fn balance_of(&self, mint: &[u8; 32]) -> u64 {
        self.balances
            .iter()
            .find(|b| &b.mint == mint)
            .map(|b| b.amount)
            .unwrap_or(0)
    }

    /// Deposit token account for `mint`, if the operator accepts it.
    pub fn vault_for(&self, mint: &[u8; 32]) -> Option<Pubkey> {
        self.balances
            .iter()
            .find(|b| &b.mint == mint)
            .map(|b| Pubkey::new_from_array(b.vault))
    }
}

/// Derive the vault PDA for a given base account.
pub fn derive_vault_pda(program_id: &Pubkey, base: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"vault", base.as_ref()], program_id)
}

/// Derive the vault authority PDA.
/// Controls: share mint, share custody, buffer token accounts.
pub fn derive_vault_authority(program_id: &Pubkey, vault: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"vault_auth", vault.as_ref()], program_id)
}

/// Derive the withdraw ledger PDA.
pub fn derive_withdraw_ledger(program_id: &Pubkey, vault: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"withdraw_ledger", vault.as_ref()], program_id)
}

/// Derive the price feed PDA for an asset mint (zeros for native).
pub fn derive_price_feed(program_id: &Pubkey, vault: &Pubkey, mint: &[u8; 32]) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"price_feed", vault.as_ref(), mint.as_ref()], program_id)
}

/// Derive the risk params PDA.
pub fn derive_risk_params(program_id: &Pubkey, vault: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"risk_params", vault.as_ref()], program_id)
}

/// Derive the native staging PDA (plain lamport holder).
pub fn derive_native_staging(program_id: &Pubkey, vault: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"native_staging", vault.as_ref()], program_id)
}
