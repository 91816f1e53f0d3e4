use solana_program::program_error::ProgramError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VaultError {
    /// Vault already initialized
    AlreadyInitialized = 0,
    /// Vault not initialized
    NotInitialized = 1,
    /// Caller does not hold the required role
    Unauthorized = 2,
    /// Zero amount or zero shares
    ZeroAmount = 3,
    /// Arithmetic overflow
    Overflow = 4,
    /// Invalid PDA derivation
    InvalidPda = 5,
    /// Share mint mismatch
    InvalidMint = 6,
    /// Asset already registered
    AssetAlreadyRegistered = 7,
    /// Asset index out of range or slot not in use
    AssetNotRegistered = 8,
    /// Delegate already added
    DelegateAlreadyAdded = 9,
    /// Delegate index out of range or slot not in use
    DelegateNotFound = 10,
    /// Asset or delegate registry is at capacity
    RegistryFull = 11,
    /// Withdraw ledger is at capacity
    LedgerFull = 12,
    /// Withdraw request index out of range
    RequestNotFound = 13,
    /// Price feed older than the maximum allowed age
    OracleStale = 14,
    /// Price is zero or the feed is uninitialized
    InvalidPrice = 15,
    /// Deposit rounds to zero shares
    ZeroMintAmount = 16,
    /// Burn rounds to zero redeem value
    ZeroRedeemAmount = 17,
    /// Global or per-asset value cap exceeded
    ValueCapExceeded = 18,
    /// No delegate can absorb this deposit/withdrawal
    NoEligibleDelegate = 19,
    /// Total system holdings cannot ever satisfy this withdrawal
    InsufficientCollateral = 20,
    /// Buffer free capacity too small
    InsufficientBuffer = 21,
    /// Queued request's watermark not yet covered by fills
    QueuedWithdrawalNotFilled = 22,
    /// Cooldown has not elapsed
    EarlyClaim = 23,
    /// Instant withdrawal would push the buffer below its drawdown floor
    BelowDrawdownFloor = 24,
    /// Net payout below caller's minimum
    MinOutNotMet = 25,
    /// Price update timestamp not strictly increasing
    StalePriceUpdate = 26,
    /// Price update timestamp is in the future
    FuturePriceUpdate = 27,
    /// Price update deviates beyond the configured bound
    PriceDeviation = 28,
    /// Entry point paused (locally or via risk params)
    Paused = 29,
    /// Passed operator pool account does not match the selected delegate
    DelegateMismatch = 30,
    /// Operator pool account not owned by the configured operator program
    InvalidOperatorProgram = 31,
    /// Allocation above 100%
    InvalidAllocation = 32,
    /// Request owner mismatch
    NotRequestOwner = 33,
}

impl From<VaultError> for ProgramError {
    fn from(e: VaultError) -> Self {
        ProgramError::Custom(e as u32)
    }
}
