//! Pool Ledger Instructions

use borsh::{BorshDeserialize, BorshSerialize};
use bridge_types::MessageId;
use solana_program::pubkey::Pubkey;

/// Pool instructions carried in `Transaction::data`
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum PoolInstruction {
    /// Pair an L1 token with an L2 token
    ///
    /// Caller: pool owner
    RegisterPool {
        l1_token: Pubkey,
        l2_token: Pubkey,
    },

    /// Stake `amount` of the local `token`
    ///
    /// Caller: depositor (pays `amount`)
    AddLiquidity { amount: u128, token: Pubkey },

    /// Unstake `amount` and send it to `recipient`
    ///
    /// Caller: depositor
    WithdrawLiquidity {
        amount: u128,
        token: Pubkey,
        recipient: Pubkey,
    },

    /// Withdraw accrued reward to `recipient`
    ///
    /// Caller: depositor
    WithdrawReward {
        amount: u128,
        token: Pubkey,
        recipient: Pubkey,
    },

    /// Fast onramp: deposit on L1, paid out by the L2 pool
    ///
    /// Caller: client (pays `amount`)
    ClientDepositL1 { amount: u128, token: Pubkey },

    /// Fast exit: deposit on L2, paid out by the L1 pool
    ///
    /// Caller: client (pays `amount`)
    ClientDepositL2 { amount: u128, token: Pubkey },

    /// Fold accrued user fees into the per-share rate
    ///
    /// Caller: anyone
    UpdateUserRewardPerShare { token: Pubkey },

    /// Withdraw operator fees to `recipient`
    ///
    /// Caller: pool owner
    WithdrawOwnerReward {
        amount: u128,
        token: Pubkey,
        recipient: Pubkey,
    },

    /// Execute a message emitted by the paired pool
    ///
    /// Caller: cross-domain messenger
    RelayMessage {
        message_id: MessageId,
        /// Pool that emitted the message on the other chain
        xdomain_sender: Pubkey,
        call: CrossDomainCall,
    },
}

impl PoolInstruction {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("PoolInstruction serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Calls one pool makes on its peer through the message relay
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum CrossDomainCall {
    /// Pay `amount` of the local `token` out of pool balance
    ClientPay {
        to: Pubkey,
        amount: u128,
        token: Pubkey,
    },

    /// Record the peer pool's deposit total for `token`
    SyncLiquidity {
        token: Pubkey,
        user_deposit_amount: u128,
    },
}

impl CrossDomainCall {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("CrossDomainCall serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
