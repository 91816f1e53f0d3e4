//! Error code uniqueness and completeness tests.

use restake_vault::error::VaultError;
use solana_program::program_error::ProgramError;

fn all_errors() -> Vec<VaultError> {
    vec![
        VaultError::AlreadyInitialized,
        VaultError::NotInitialized,
        VaultError::Unauthorized,
        VaultError::ZeroAmount,
        VaultError::Overflow,
        VaultError::InvalidPda,
        VaultError::InvalidMint,
        VaultError::AssetAlreadyRegistered,
        VaultError::AssetNotRegistered,
        VaultError::DelegateAlreadyAdded,
        VaultError::DelegateNotFound,
        VaultError::RegistryFull,
        VaultError::LedgerFull,
        VaultError::RequestNotFound,
        VaultError::OracleStale,
        VaultError::InvalidPrice,
        VaultError::ZeroMintAmount,
        VaultError::ZeroRedeemAmount,
        VaultError::ValueCapExceeded,
        VaultError::NoEligibleDelegate,
        VaultError::InsufficientCollateral,
        VaultError::InsufficientBuffer,
        VaultError::QueuedWithdrawalNotFilled,
        VaultError::EarlyClaim,
        VaultError::BelowDrawdownFloor,
        VaultError::MinOutNotMet,
        VaultError::StalePriceUpdate,
        VaultError::FuturePriceUpdate,
        VaultError::PriceDeviation,
        VaultError::Paused,
        VaultError::DelegateMismatch,
        VaultError::InvalidOperatorProgram,
        VaultError::InvalidAllocation,
        VaultError::NotRequestOwner,
    ]
}

#[test]
fn test_all_error_codes_unique() {
    let codes: Vec<u32> = all_errors().iter().map(|e| *e as u32).collect();

    // Check uniqueness
    let mut sorted = codes.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), codes.len(), "Duplicate error codes detected!");

    // Check sequential (0..34)
    for (i, &code) in codes.iter().enumerate() {
        assert_eq!(code, i as u32, "Error code {} expected {}, got {}", i, i, code);
    }
}

#[test]
fn test_error_to_program_error() {
    let err: ProgramError = VaultError::Unauthorized.into();
    match err {
        ProgramError::Custom(code) => assert_eq!(code, 2),
        _ => panic!("Expected Custom error"),
    }
}

#[test]
fn test_all_errors_are_custom() {
    for err in all_errors() {
        let pe: ProgramError = err.into();
        assert!(matches!(pe, ProgramError::Custom(_)));
    }
}
