//! Orchestrator Integration Tests
//!
//! Runs bridge operations end to end against a local devnet:
//! - Liquidity provision synced to the peer pool
//! - Fast exit and fast onramp paid out on the other chain
//! - Reward accrual, harvest and owner fees
//! - Ledger rejections, destination failures and watch timeouts

use std::sync::Arc;

use bridge_orchestrator::{BridgeConfig, BridgeContext, BridgeError, BridgeOrchestrator};
use bridge_types::{Direction, Layer};
use chain_runtime::{DevnetConfig, LocalDevnet};
use pool_ledger::PoolError;
use solana_program::pubkey::Pubkey;
use xdomain_watcher::WatchPhase;

const ETHER: u128 = 1_000_000_000_000_000_000;

struct Bridge {
    devnet: LocalDevnet,
    owner: BridgeOrchestrator,
    l1_token: Pubkey,
    l2_token: Pubkey,
}

impl Bridge {
    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            watch_timeout_ms: 5_000,
            poll_interval_ms: 5,
            max_poll_interval_ms: 20,
            inclusion_timeout_ms: 5_000,
            block_time_ms: 5,
            relay_delay_ms: 10,
            ..Default::default()
        }
    }

    async fn start() -> Self {
        Self::start_with(Self::fast_config()).await
    }

    async fn start_with(config: BridgeConfig) -> Self {
        let owner = Pubkey::new_unique();
        let devnet_config = DevnetConfig::new(owner)
            .with_fee_rates(config.fee_rates)
            .with_block_time_ms(config.block_time_ms)
            .with_relay_delay(config.relay_delay());
        let mut devnet = LocalDevnet::new(&devnet_config).unwrap();
        devnet.start();

        let ctx = BridgeContext::new(
            owner,
            devnet.client(Layer::L1),
            devnet.client(Layer::L2),
            devnet.relay(),
            &config,
        );
        let owner = BridgeOrchestrator::new(Arc::new(ctx));

        let l1_token = Pubkey::new_unique();
        let l2_token = Pubkey::new_unique();
        for layer in [Layer::L1, Layer::L2] {
            owner.register_pool(layer, l1_token, l2_token).await.unwrap();
        }

        Self {
            devnet,
            owner,
            l1_token,
            l2_token,
        }
    }

    fn user(&self) -> BridgeOrchestrator {
        self.owner.for_account(Pubkey::new_unique())
    }

    fn token(&self, layer: Layer) -> Pubkey {
        match layer {
            Layer::L1 => self.l1_token,
            Layer::L2 => self.l2_token,
        }
    }

    fn mint(&self, layer: Layer, account: &BridgeOrchestrator, amount: u128) {
        self.devnet
            .chain(layer)
            .tokens
            .mint(&self.token(layer), &account.account(), amount)
            .unwrap();
    }
}

#[tokio::test]
async fn test_fast_exit_scenario() {
    let mut b = Bridge::start().await;
    let alice = b.user();
    let bob = b.user();
    let carol = b.user();
    let kate = b.user();

    b.mint(Layer::L2, &alice, 100 * ETHER);
    b.mint(Layer::L2, &bob, 100 * ETHER);
    b.mint(Layer::L1, &carol, 100 * ETHER);
    b.mint(Layer::L2, &kate, 10 * ETHER);

    for lp in [&alice, &bob] {
        let settlement = lp.add_liquidity(Layer::L2, 100 * ETHER, b.l2_token).await.unwrap();
        assert_eq!(settlement.direction, Direction::L2ToL1);
        assert!(settlement.destination.is_success());
    }
    carol.add_liquidity(Layer::L1, 100 * ETHER, b.l1_token).await.unwrap();

    assert_eq!(
        b.owner.peer_deposit_amount(Layer::L1, b.l1_token).await.unwrap(),
        Some(200 * ETHER)
    );

    let exit = kate.fast_exit(10 * ETHER, b.l2_token).await.unwrap();
    assert!(exit.origin.is_success());
    assert!(exit.destination.is_success());

    let info = b.owner.pool_info(Layer::L2, b.l2_token).await.unwrap().unwrap();
    assert_eq!(info.user_deposit_amount, 200 * ETHER);
    assert_eq!(info.acc_user_reward, 350_000_000_000_000_000);
    assert_eq!(info.acc_owner_reward, 10 * ETHER * 15 / 1000);

    assert_eq!(
        kate.balance_of(Layer::L1, b.l1_token, kate.account()).await.unwrap(),
        9_500_000_000_000_000_000
    );
    assert_eq!(
        b.owner.pool_balance(Layer::L1, b.l1_token).await.unwrap(),
        100 * ETHER - 9_500_000_000_000_000_000
    );
    assert_eq!(b.owner.total_fee_rate(Layer::L2).await.unwrap(), 50);
    assert_eq!(b.owner.user_reward_fee_rate(Layer::L2).await.unwrap(), 35);

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_rewards_are_harvested_after_update() {
    let mut b = Bridge::start().await;
    let alice = b.user();
    let bob = b.user();
    let carol = b.user();
    let kate = b.user();

    b.mint(Layer::L2, &alice, 100 * ETHER + 1);
    b.mint(Layer::L2, &bob, 100 * ETHER);
    b.mint(Layer::L1, &carol, 100 * ETHER);
    b.mint(Layer::L2, &kate, 10 * ETHER);

    alice.add_liquidity(Layer::L2, 100 * ETHER, b.l2_token).await.unwrap();
    bob.add_liquidity(Layer::L2, 100 * ETHER, b.l2_token).await.unwrap();
    carol.add_liquidity(Layer::L1, 100 * ETHER, b.l1_token).await.unwrap();
    kate.fast_exit(10 * ETHER, b.l2_token).await.unwrap();

    // Nothing is owed per share until the fees are folded in
    assert_eq!(
        b.owner.pending_reward(Layer::L2, b.l2_token, alice.account()).await.unwrap(),
        0
    );

    bob.update_user_reward_per_share(Layer::L2, b.l2_token).await.unwrap();
    let half = 175_000_000_000_000_000;
    assert_eq!(
        b.owner.pending_reward(Layer::L2, b.l2_token, alice.account()).await.unwrap(),
        half
    );

    // Withdrawing needs the reward moved into pendingReward first
    let err = alice
        .withdraw_reward(Layer::L2, half, b.l2_token, alice.account())
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Ledger(PoolError::InsufficientReward));

    alice.add_liquidity(Layer::L2, 1, b.l2_token).await.unwrap();
    let user = b.owner.user_info(Layer::L2, b.l2_token, alice.account()).await.unwrap().unwrap();
    assert_eq!(user.pending_reward, half);
    assert_eq!(user.amount, 100 * ETHER + 1);

    alice
        .withdraw_reward(Layer::L2, half, b.l2_token, alice.account())
        .await
        .unwrap();
    assert_eq!(
        alice.balance_of(Layer::L2, b.l2_token, alice.account()).await.unwrap(),
        half
    );

    let owner_fee = 150_000_000_000_000_000;
    b.owner
        .withdraw_owner_reward(Layer::L2, owner_fee, b.l2_token, b.owner.account())
        .await
        .unwrap();
    assert_eq!(
        b.owner.balance_of(Layer::L2, b.l2_token, b.owner.account()).await.unwrap(),
        owner_fee
    );
    let err = alice
        .withdraw_owner_reward(Layer::L2, 1, b.l2_token, alice.account())
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Ledger(PoolError::Unauthorized));

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_fast_onramp_paid_on_l2() {
    let mut b = Bridge::start().await;
    let lp = b.user();
    let dave = b.user();

    b.mint(Layer::L2, &lp, 50 * ETHER);
    b.mint(Layer::L1, &dave, 20 * ETHER);
    lp.add_liquidity(Layer::L2, 50 * ETHER, b.l2_token).await.unwrap();

    let onramp = dave.fast_onramp(20 * ETHER, b.l1_token).await.unwrap();
    assert_eq!(onramp.direction, Direction::L1ToL2);

    assert_eq!(
        dave.balance_of(Layer::L2, b.l2_token, dave.account()).await.unwrap(),
        19 * ETHER
    );
    let info = b.owner.pool_info(Layer::L1, b.l1_token).await.unwrap().unwrap();
    assert_eq!(info.acc_user_reward, 700_000_000_000_000_000);
    assert_eq!(info.acc_owner_reward, 300_000_000_000_000_000);

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_withdraw_liquidity_syncs_peer() {
    let mut b = Bridge::start().await;
    let lp = b.user();
    b.mint(Layer::L2, &lp, 100 * ETHER);
    lp.add_liquidity(Layer::L2, 100 * ETHER, b.l2_token).await.unwrap();

    let err = lp
        .withdraw_liquidity(Layer::L2, 101 * ETHER, b.l2_token, lp.account())
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Ledger(PoolError::InsufficientStake));
    assert!(!err.origin_committed());

    lp.withdraw_liquidity(Layer::L2, 40 * ETHER, b.l2_token, lp.account())
        .await
        .unwrap();

    assert_eq!(
        lp.balance_of(Layer::L2, b.l2_token, lp.account()).await.unwrap(),
        40 * ETHER
    );
    assert_eq!(
        b.owner.peer_deposit_amount(Layer::L1, b.l1_token).await.unwrap(),
        Some(60 * ETHER)
    );

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_ledger_rejections() {
    let mut b = Bridge::start().await;

    let err = b
        .owner
        .register_pool(Layer::L1, b.l1_token, b.l2_token)
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Ledger(PoolError::AlreadyRegistered));

    let stranger = b.user();
    let err = stranger
        .register_pool(Layer::L2, Pubkey::new_unique(), Pubkey::new_unique())
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Ledger(PoolError::Unauthorized));

    // Cannot pay for the deposit
    let err = stranger.fast_exit(ETHER, b.l2_token).await.unwrap_err();
    assert!(matches!(err, BridgeError::LedgerSubmissionFailed(_)));
    assert!(!err.is_liveness_failure());

    let err = b
        .owner
        .pending_reward(Layer::L2, Pubkey::new_unique(), stranger.account())
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Ledger(PoolError::PoolNotRegistered));
    assert_eq!(
        b.owner.pool_info(Layer::L2, Pubkey::new_unique()).await.unwrap(),
        None
    );

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_unfunded_payout_is_a_destination_failure() {
    let mut b = Bridge::start().await;
    let kate = b.user();
    b.mint(Layer::L2, &kate, 1_000);

    let err = kate.fast_exit(1_000, b.l2_token).await.unwrap_err();
    assert_eq!(err.pool_error(), Some(PoolError::InsufficientPoolLiquidity));
    assert!(matches!(err, BridgeError::DestinationFailed { .. }));
    assert!(err.origin_committed());

    // The deposit and its fees stand on L2
    let info = b.owner.pool_info(Layer::L2, b.l2_token).await.unwrap().unwrap();
    assert_eq!(info.acc_user_reward, 35);
    assert_eq!(kate.balance_of(Layer::L2, b.l2_token, kate.account()).await.unwrap(), 0);

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_slow_relay_surfaces_watch_timeout() {
    let config = BridgeConfig {
        watch_timeout_ms: 100,
        relay_delay_ms: 2_000,
        ..Bridge::fast_config()
    };
    let mut b = Bridge::start_with(config).await;
    let lp = b.user();
    let kate = b.user();
    b.mint(Layer::L1, &lp, 100 * ETHER);
    b.mint(Layer::L2, &kate, 10 * ETHER);

    // Fund L1 directly; its sync message would take the slow relay
    b.devnet
        .l1
        .pool
        .add_liquidity(&lp.account(), 100 * ETHER, &b.l1_token)
        .unwrap();

    let err = kate.fast_exit(10 * ETHER, b.l2_token).await.unwrap_err();
    assert!(matches!(err, BridgeError::WatchTimeout { .. }));
    assert!(err.is_liveness_failure());
    assert!(err.origin_committed());

    let info = b.owner.pool_info(Layer::L2, b.l2_token).await.unwrap().unwrap();
    assert_eq!(info.acc_user_reward, 350_000_000_000_000_000);
    assert_eq!(b.owner.context().watcher.active_watches(), 0);

    b.devnet.shutdown().await;
}

#[tokio::test]
async fn test_slow_inclusion_times_out_in_submitted_phase() {
    let config = BridgeConfig {
        watch_timeout_ms: 50,
        block_time_ms: 1_000,
        ..Bridge::fast_config()
    };
    let mut b = Bridge::start_with(config).await;
    let kate = b.user();
    b.mint(Layer::L2, &kate, 10 * ETHER);

    let err = kate.fast_exit(10 * ETHER, b.l2_token).await.unwrap_err();
    let BridgeError::WatchTimeout { phase, .. } = err else {
        panic!("expected a watch timeout, got {:?}", err);
    };
    assert_eq!(phase, WatchPhase::Submitted);
    assert!(err.is_liveness_failure());
    assert!(!err.origin_committed());

    b.devnet.shutdown().await;
}
