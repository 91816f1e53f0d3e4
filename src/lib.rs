//! Liquid Restaking Vault Program
//!
//! Accounting and withdrawal core for a multi-asset liquid restaking vault.
//! Users deposit supported collateral (or native), the vault routes it to
//! external operator pools by allocation targets, and mints a fungible share
//! token priced against the aggregate value of everything the vault controls.
//!
//! Architecture:
//! - Share price is derived live: operator pool balances and price feeds are
//!   read on every priced instruction, never cached in vault state
//! - Minting uses the supply-inflation formula (deposit buys a fraction of
//!   the post-deposit supply), redemption is proportional
//! - Exits run through per-asset liquidity buffers: a withdraw request
//!   reserves what the buffer can cover and queues the shortfall on a
//!   cumulative deficit ledger; claims unlock after a cooldown and re-price
//!   downward only
//! - Instant withdrawal bypasses the cooldown against free buffer capacity
//!   for a fee that scales linearly with buffer drawdown, floored by a
//!   drawdown limit
//! - Delegate rebalancing is manager-driven: pull liquidity out of
//!   over-allocated operator pools back into the buffers
//!
//! Instructions:
//!   0 - InitVault:               Create vault, ledger, risk params, share mint
//!   1 - RegisterAsset:           Admin registers a collateral asset + buffer
//!   2 - RemoveAsset:             Admin removes an empty asset slot
//!   3 - AddDelegate:             Admin adds an operator pool delegate
//!   4 - RemoveDelegate:          Admin removes a delegate slot
//!   5 - SetDelegateAllocation:   Admin retargets a delegate's allocation
//!   6 - SetBufferTarget:         Admin retargets a buffer
//!   7 - UpdateConfig:            Admin updates cooldown / global cap
//!   8 - SetInstantWithdrawConfig: Admin sets the instant-exit fee curve
//!   9 - SetPauseFlags:           Guardian sets local pause bits
//!  10 - SetRiskParams:           Guardian sets dynamic pause/cooldown
//!  11 - InitPriceFeed:           Admin creates a feed for an asset mint
//!  12 - PushPrice:               Feed authority publishes a price
//!  13 - Deposit:                 Deposit collateral → operator pool, mint shares
//!  14 - DepositNative:           Stage native deposit, mint shares
//!  15 - Withdraw:                Lock shares, open a buffer-admitted request
//!  16 - Claim:                   Finalize a matured request (permissionless)
//!  17 - InstantWithdraw:         Fee-scaled exit against free buffer capacity
//!  18 - FillBuffer:              Manager refills a buffer
//!  19 - WithdrawFromDelegate:    Manager starts an operator-side unbonding
//!  20 - CollectDelegateWithdraw: Manager lands a matured unbonding in the buffer

pub mod accounting;
pub mod cpi;
pub mod error;
pub mod instruction;
pub mod math;
pub mod oracle;
pub mod processor;
pub mod state;

#[cfg(not(feature = "no-entrypoint"))]
mod entrypoint;
