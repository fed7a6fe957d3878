//! Pool Ledger Errors

use thiserror::Error;

/// Pool ledger errors
///
/// Each variant has a stable numeric code so a failed receipt can carry it
/// across the ledger boundary and be decoded again by the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PoolError {
    #[error("Token is already registered")]
    AlreadyRegistered = 0,

    #[error("Token is not registered")]
    PoolNotRegistered = 1,

    #[error("Amount must be greater than zero")]
    ZeroAmount = 2,

    #[error("Withdraw amount exceeds stake")]
    InsufficientStake = 3,

    #[error("Withdraw amount exceeds reward")]
    InsufficientReward = 4,

    #[error("Pool balance cannot cover payout")]
    InsufficientPoolLiquidity = 5,

    #[error("Insufficient token balance")]
    InsufficientBalance = 6,

    #[error("Caller is not authorized")]
    Unauthorized = 7,

    #[error("Operation not available on this layer")]
    WrongLayer = 8,

    #[error("Invalid fee rate")]
    InvalidFeeRate = 9,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow = 10,

    #[error("Invalid instruction data")]
    InvalidInstructionData = 11,
}

impl PoolError {
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Inverse of [`PoolError::code`]
    pub fn from_code(code: u32) -> Option<Self> {
        let err = match code {
            0 => PoolError::AlreadyRegistered,
            1 => PoolError::PoolNotRegistered,
            2 => PoolError::ZeroAmount,
            3 => PoolError::InsufficientStake,
            4 => PoolError::InsufficientReward,
            5 => PoolError::InsufficientPoolLiquidity,
            6 => PoolError::InsufficientBalance,
            7 => PoolError::Unauthorized,
            8 => PoolError::WrongLayer,
            9 => PoolError::InvalidFeeRate,
            10 => PoolError::ArithmeticOverflow,
            11 => PoolError::InvalidInstructionData,
            _ => return None,
        };
        Some(err)
    }
}
