//! 隐身转账管线集成测试
//!
//! 通过 `TransferSession` 驱动完整流程：收款人 → 元地址 → 代币 → 金额 → 授权 → 转账

mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use ethers::types::{Address, U256};
use stealthereum::{
    domain::{
        chain_config::{self, NetworkPrefix},
        ApprovalStatus, ResolutionState, Secp256k1StealthGenerator, TokenKind, TransactionPhase,
    },
    error::StealthError,
    infrastructure::{abi, FieldState, GateOutcome},
    service::MetaAddressStatus,
};
use tokio::time::sleep;

fn eth_stealth_contract() -> Address {
    chain_config::chain(NetworkPrefix::Eth).stealth_contract
}

#[tokio::test]
async fn test_end_to_end_native_transfer() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    let wallet = FakeWallet::mainnet();
    session.connect_wallet(wallet.clone());

    let status = session.set_recipient(BOB).await;
    match status {
        GateOutcome::Applied(Ok(MetaAddressStatus::Registered { owner, .. })) => {
            assert_eq!(owner, bob())
        }
        other => panic!("unexpected lookup outcome: {:?}", other),
    }

    let token = session.set_token("ETH").await;
    assert!(matches!(token, GateOutcome::Applied(Ok(ref t)) if t.kind == TokenKind::Native));

    let amount = session.set_amount("0.1").await;
    assert_eq!(amount.value, Some(U256::from(100_000_000_000_000_000u64)));

    let receipt = session.transfer().await.unwrap();
    assert_eq!(receipt.stealth_address, fixed_stealth_address());
    assert_eq!(receipt.view_tag, 0xab);

    // 原生资产不需要授权，也不会查询额度
    assert_eq!(chain.approval_calls(), 0);
    let sent = wallet.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, eth_stealth_contract());
    assert_eq!(sent[0].value, U256::from(100_000_000_000_000_000u64));
    assert_eq!(&sent[0].data[..4], &abi::selector(abi::SIG_STEALTH_TRANSFER)[..]);

    assert_eq!(
        session.snapshot().transaction,
        TransactionPhase::Confirmed {
            tx_hash: receipt.tx_hash
        }
    );
}

#[tokio::test]
async fn test_identical_input_queries_registry_once() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());

    assert!(session.set_recipient(BOB).await.is_applied());
    assert_eq!(session.set_recipient(BOB).await, GateOutcome::Deduplicated);
    assert_eq!(chain.registry_calls(), 1);
}

#[tokio::test]
async fn test_stale_lookup_never_overwrites_newer_recipient() {
    let chain = FakeChain::with_registered(&[bob(), alice()]);
    let session = session(chain.clone());
    let hold_bob = chain.hold(bob());

    let (first, second) = tokio::join!(session.set_recipient(BOB), async {
        // bob 的注册表读取已经发出后再切换到 alice
        chain.registry_started.notified().await;
        let second = session.set_recipient(ALICE).await;
        hold_bob.notify_one();
        second
    });

    assert_eq!(first, GateOutcome::Superseded);
    assert!(second.is_applied());

    let current = session.snapshot().meta_address;
    match current {
        FieldState::Done(status) => assert_eq!(status.owner(), alice()),
        other => panic!("unexpected meta-address state: {:?}", other),
    }
    assert_eq!(chain.registry_calls(), 2);
}

#[tokio::test]
async fn test_keystrokes_within_quiet_period_read_registry_once() {
    let chain = FakeChain::with_registered(&[bob(), alice()]);
    let names = FakeNames::standard();
    let session = debounced_session(chain.clone(), names.clone(), 50, 0);

    let (first, second, third) = tokio::join!(
        session.set_recipient(ALICE),
        async {
            sleep(Duration::from_millis(10)).await;
            session
                .set_recipient(&format!("eth:{}", hex_address(alice())))
                .await
        },
        async {
            sleep(Duration::from_millis(20)).await;
            session.set_recipient(BOB).await
        },
    );

    assert_eq!(first, GateOutcome::Superseded);
    assert_eq!(second, GateOutcome::Superseded);
    match third {
        GateOutcome::Applied(Ok(status)) => assert_eq!(status.owner(), bob()),
        other => panic!("unexpected lookup outcome: {:?}", other),
    }
    assert_eq!(chain.registry_calls(), 1);
    assert_eq!(names.calls(), 1);
}

#[tokio::test]
async fn test_returning_to_name_still_resolving_reuses_its_result() {
    let chain = FakeChain::with_registered(&[bob(), alice()]);
    let names = FakeNames::slow(Duration::from_millis(300));
    let session = debounced_session(chain.clone(), names.clone(), 100, 0);

    // bob 解析中切到 alice，防抖结束前又回到 bob
    let (first, _, third) = tokio::join!(
        session.set_recipient(BOB),
        async {
            sleep(Duration::from_millis(150)).await;
            session.set_recipient(ALICE).await
        },
        async {
            sleep(Duration::from_millis(170)).await;
            session.set_recipient(BOB).await
        },
    );

    assert_eq!(first, GateOutcome::Superseded);
    match third {
        GateOutcome::Applied(Ok(MetaAddressStatus::Registered { owner, .. })) => {
            assert_eq!(owner, bob())
        }
        other => panic!("unexpected lookup outcome: {:?}", other),
    }

    let snapshot = session.snapshot();
    assert!(matches!(snapshot.meta_address, FieldState::Done(_)));
    assert_eq!(snapshot.recipient.resolution_state, ResolutionState::Resolved);
    assert_eq!(names.calls(), 1);
}

#[tokio::test]
async fn test_unresolved_name_does_not_reach_registry() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());

    let outcome = session.set_recipient("eth:nobody.eth").await;
    assert!(matches!(
        outcome,
        GateOutcome::Applied(Err(StealthError::Resolution { .. }))
    ));
    assert_eq!(chain.registry_calls(), 0);
    assert_eq!(
        session.snapshot().recipient.resolution_state,
        ResolutionState::Failed
    );
}

#[tokio::test]
async fn test_unregistered_recipient_blocks_transfer() {
    let chain = FakeChain::with_registered(&[]);
    let session = session(chain.clone());
    session.connect_wallet(FakeWallet::mainnet());

    let outcome = session.set_recipient(BOB).await;
    assert!(matches!(
        outcome,
        GateOutcome::Applied(Ok(MetaAddressStatus::NotRegistered { .. }))
    ));

    session.set_token("NATIVE").await;
    session.set_amount("1").await;
    let err = session.transfer().await.unwrap_err();
    assert_eq!(err.code().as_str(), "not_ready");
}

#[tokio::test]
async fn test_erc20_requires_separate_approval() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    let wallet = FakeWallet::mainnet();
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    let token = session.set_token(&hex_address(usdc())).await;
    assert!(matches!(token, GateOutcome::Applied(Ok(ref t)) if t.decimals == 6));

    let amount = session.set_amount("1.5").await;
    assert_eq!(amount.value, Some(U256::from(1_500_000u64)));

    let status = session.check_approval().await.unwrap();
    assert_eq!(
        status,
        ApprovalStatus::NotApproved {
            amount: U256::from(1_500_000u64)
        }
    );

    // 未授权时不能转账
    let err = session.transfer().await.unwrap_err();
    assert_eq!(err.code().as_str(), "not_ready");
    assert!(wallet.sent().is_empty());

    // 授权是单独一步，成功后不会自动转账
    session.approve().await.unwrap();
    chain.set_allowance(1_500_000);
    let sent = wallet.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, usdc());
    assert_eq!(&sent[0].data[..4], &abi::selector(abi::SIG_APPROVE)[..]);
    assert!(session.snapshot().approval.is_approved());

    let receipt = session.transfer().await.unwrap();
    let sent = wallet.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].to, eth_stealth_contract());
    assert!(sent[1].value.is_zero());
    assert_eq!(receipt.stealth_address, fixed_stealth_address());
}

#[tokio::test]
async fn test_amount_change_forces_recheck() {
    let chain = FakeChain::with_registered(&[bob()]);
    chain.set_allowance(1_500_000);
    let session = session(chain.clone());
    session.connect_wallet(FakeWallet::mainnet());

    session.set_recipient(BOB).await;
    session.set_token(&hex_address(usdc())).await;
    session.set_amount("1.5").await;

    assert!(session.check_approval().await.unwrap().is_approved());
    // 金额不变不重复检查
    session.check_approval().await.unwrap();
    assert_eq!(chain.approval_calls(), 1);

    session.set_amount("2").await;
    let status = session.check_approval().await.unwrap();
    assert_eq!(
        status,
        ApprovalStatus::NotApproved {
            amount: U256::from(2_000_000u64)
        }
    );
    assert_eq!(chain.approval_calls(), 2);
}

#[tokio::test]
async fn test_amount_being_debounced_cannot_be_submitted() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = debounced_session(chain, FakeNames::standard(), 0, 200);
    let wallet = FakeWallet::mainnet();
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    session.set_token("ETH").await;
    assert!(session.set_amount("1").await.is_ready());

    let (typed, (during, submitted)) = tokio::join!(session.set_amount("abc"), async {
        sleep(Duration::from_millis(20)).await;
        (session.snapshot().amount, session.transfer().await)
    });

    // 防抖窗口内旧金额已失效
    assert_eq!(during.raw, "abc");
    assert_eq!(during.value, None);
    assert_eq!(submitted.unwrap_err().code().as_str(), "not_ready");
    assert!(wallet.sent().is_empty());

    assert_eq!(typed.value, None);
    assert!(typed.error.is_some());
}

#[tokio::test]
async fn test_overlapping_approvals_submit_once() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    let wallet = FakeWallet::mainnet();
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    session.set_token(&hex_address(usdc())).await;
    session.set_amount("1.5").await;

    let release = wallet.hold_receipts();
    let (first, second) = tokio::join!(session.approve(), async {
        let second = session.approve().await;
        release.notify_one();
        second
    });

    first.unwrap();
    assert_eq!(second.unwrap_err().code().as_str(), "not_ready");
    assert_eq!(wallet.sent().len(), 1);
    assert!(session.snapshot().approval.is_approved());
}

#[tokio::test]
async fn test_nft_amount_is_token_id() {
    let chain = FakeChain::with_registered(&[bob()]);
    *chain.approved_operator.lock().unwrap() = eth_stealth_contract();
    let session = session(chain.clone());
    let wallet = FakeWallet::mainnet();
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    let token = session.set_token(&hex_address(punks())).await;
    assert!(matches!(token, GateOutcome::Applied(Ok(ref t)) if t.kind == TokenKind::NonFungible));

    let invalid = session.set_amount("42.0").await;
    assert_eq!(invalid.value, None);
    assert!(invalid.error.is_some());

    let valid = session.set_amount("42").await;
    assert_eq!(valid.value, Some(U256::from(42u64)));

    assert!(session.check_approval().await.unwrap().is_approved());
    session.transfer().await.unwrap();
    assert_eq!(wallet.sent().len(), 1);
}

#[tokio::test]
async fn test_token_prefix_mismatch_keeps_recipient() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());

    session.set_recipient(BOB).await;
    let outcome = session
        .set_token(&format!("sep:{}", hex_address(usdc())))
        .await;
    match outcome {
        GateOutcome::Applied(Err(err)) => assert_eq!(
            err.to_string(),
            "Network prefix mismatch. Please use eth: for tokens"
        ),
        other => panic!("unexpected token outcome: {:?}", other),
    }

    // 代币错误不影响收款人
    assert!(matches!(session.snapshot().meta_address, FieldState::Done(_)));
}

#[tokio::test]
async fn test_wallet_on_wrong_network_blocks_submission() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    let wallet = FakeWallet::on_chain(11_155_111);
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    session.set_token("ETH").await;
    session.set_amount("0.1").await;

    let err = session.transfer().await.unwrap_err();
    assert!(matches!(err, StealthError::NetworkMismatch { .. }));
    assert!(err.is_recoverable());
    assert!(wallet.sent().is_empty());
    assert_eq!(session.snapshot().transaction, TransactionPhase::Idle);
}

#[tokio::test]
async fn test_revert_message_is_passed_through() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    let wallet = FakeWallet::mainnet();
    *wallet.simulation_error.lock().unwrap() = Some("execution reverted: paused".into());
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    session.set_token("ETH").await;
    session.set_amount("0.1").await;

    let err = session.transfer().await.unwrap_err();
    assert_eq!(err, StealthError::Transfer("execution reverted: paused".into()));

    // 失败不清空其他阶段的状态
    let snapshot = session.snapshot();
    assert!(matches!(snapshot.token, FieldState::Done(_)));
    assert!(snapshot.amount.is_ready());
    assert!(matches!(snapshot.transaction, TransactionPhase::Failed { .. }));
}

#[tokio::test]
async fn test_failed_receipt_is_a_transfer_error() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    let wallet = FakeWallet::mainnet();
    *wallet.receipt_success.lock().unwrap() = false;
    session.connect_wallet(wallet.clone());

    session.set_recipient(BOB).await;
    session.set_token("ETH").await;
    session.set_amount("0.1").await;

    let err = session.transfer().await.unwrap_err();
    assert!(matches!(err, StealthError::Transfer(_)));
    assert_eq!(wallet.sent().len(), 1);
}

#[tokio::test]
async fn test_recipient_change_resets_downstream() {
    let chain = FakeChain::with_registered(&[bob(), alice()]);
    let session = session(chain.clone());
    session.connect_wallet(FakeWallet::mainnet());

    session.set_recipient(BOB).await;
    session.set_token(&hex_address(usdc())).await;
    session.set_amount("1").await;
    session.check_approval().await.unwrap();

    session.set_recipient(ALICE).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, FieldState::Idle);
    assert_eq!(snapshot.amount.value, None);
    assert_eq!(snapshot.approval, ApprovalStatus::Reset);
}

#[tokio::test]
async fn test_reset_returns_to_clean_slate() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session(chain.clone());
    session.connect_wallet(FakeWallet::mainnet());

    session.set_recipient(BOB).await;
    session.set_token("ETH").await;
    session.set_amount("0.1").await;
    session.transfer().await.unwrap();

    session.reset();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.meta_address, FieldState::Idle);
    assert_eq!(snapshot.token, FieldState::Idle);
    assert_eq!(snapshot.amount.value, None);
    assert_eq!(snapshot.approval, ApprovalStatus::Reset);
    assert_eq!(snapshot.transaction, TransactionPhase::Idle);
    assert_eq!(snapshot.recipient.resolution_state, ResolutionState::Idle);

    // 重置后同一输入重新查询
    session.set_recipient(BOB).await;
    assert_eq!(chain.registry_calls(), 2);
}

#[tokio::test]
async fn test_register_submits_to_registry() {
    let chain = FakeChain::with_registered(&[]);
    let session = session(chain);
    let wallet = FakeWallet::on_chain(11_155_111);

    let input = format!("st:sep:0x{}", hex::encode(meta_address_bytes()));
    assert_eq!(
        session.register(&input).await.unwrap_err(),
        StealthError::WalletNotConnected
    );

    session.connect_wallet(wallet.clone());
    session.register(&input).await.unwrap();

    let sent = wallet.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].to,
        chain_config::chain(NetworkPrefix::Sep).registry_address
    );

    // 前缀与钱包网络不一致
    let mainnet = format!("st:eth:0x{}", hex::encode(meta_address_bytes()));
    let err = session.register(&mainnet).await.unwrap_err();
    assert!(matches!(err, StealthError::NetworkMismatch { .. }));
}

#[tokio::test]
async fn test_real_derivation_produces_fresh_addresses() {
    let chain = FakeChain::with_registered(&[bob()]);
    let session = session_with(chain, Arc::new(Secp256k1StealthGenerator));
    session.connect_wallet(FakeWallet::mainnet());

    session.set_recipient(BOB).await;
    session.set_token("ETH").await;
    session.set_amount("0.01").await;

    let first = session.transfer().await.unwrap();
    let second = session.transfer().await.unwrap();
    assert_eq!(first.ephemeral_public_key.len(), 33);
    assert_ne!(first.stealth_address, second.stealth_address);
}
