//! Token balances the pool moves funds through

use dashmap::DashMap;
use parking_lot::Mutex;
use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::error::PoolError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u128, required: u128 },

    #[error("Balance overflow")]
    Overflow,
}

impl From<TokenError> for PoolError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InsufficientBalance { .. } => PoolError::InsufficientBalance,
            TokenError::Overflow => PoolError::ArithmeticOverflow,
        }
    }
}

/// Token ledger collaborator
///
/// The pool only needs balances and transfers; allowances, metadata and
/// the native/ERC20 distinction are the token ledger's business.
pub trait TokenLedger: Send + Sync {
    fn balance_of(&self, token: &Pubkey, account: &Pubkey) -> u128;

    /// Move `amount` of `token` from `from` to `to`, all or nothing
    fn transfer(
        &self,
        token: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> Result<(), TokenError>;
}

/// Thread-safe in-memory token balances
///
/// Reads go straight to the DashMap; transfers are serialized so the debit
/// and the credit land together.
#[derive(Default)]
pub struct InMemoryTokenLedger {
    balances: DashMap<(Pubkey, Pubkey), u128>,
    transfer_lock: Mutex<()>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air (devnet faucet)
    pub fn mint(&self, token: &Pubkey, account: &Pubkey, amount: u128) -> Result<(), TokenError> {
        let _guard = self.transfer_lock.lock();
        let mut balance = self.balances.entry((*token, *account)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }

    /// All non-zero balances as `(token, account, amount)`
    pub fn snapshot(&self) -> Vec<(Pubkey, Pubkey, u128)> {
        self.balances
            .iter()
            .filter(|r| *r.value() > 0)
            .map(|r| (r.key().0, r.key().1, *r.value()))
            .collect()
    }

    /// Replace a balance wholesale (persistence reload)
    pub fn set_balance(&self, token: Pubkey, account: Pubkey, amount: u128) {
        self.balances.insert((token, account), amount);
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn balance_of(&self, token: &Pubkey, account: &Pubkey) -> u128 {
        self.balances
            .get(&(*token, *account))
            .map(|b| *b.value())
            .unwrap_or(0)
    }

    fn transfer(
        &self,
        token: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> Result<(), TokenError> {
        let _guard = self.transfer_lock.lock();

        let available = self.balance_of(token, from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }

        let credited = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;

        self.balances.insert((*token, *from), available - amount);
        self.balances.insert((*token, *to), credited);
        Ok(())
    }
}
