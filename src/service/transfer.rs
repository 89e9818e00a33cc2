//! 隐身转账编排
//!
//! 授权与转账是两个独立的用户确认步骤，不会自动串联：
//! 1. `approve`：资产需要授权且尚未授权时提交授权交易
//! 2. `transfer`：派生一次性地址 → 组装载荷 → 模拟 → 广播 → 等待回执
//!
//! 只有回执 status 为成功才算成功；其它情况作为转账错误返回，不影响已有状态。

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    domain::{
        chain_config::{self, NetworkPrefix},
        stealth::{StealthAddressGenerator, StealthMetaAddress, StealthTransferIntent},
        token::{TokenDescriptor, TokenKind},
        transfer_status::{ApprovalStatus, TransactionPhase, TxKind},
    },
    error::{Result, StealthError},
    infrastructure::{
        abi,
        chain_client::{ContractCall, TxOutcome, WalletProvider},
    },
    metrics,
};

/// 提交转账所需的全部输入
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub network: NetworkPrefix,
    pub recipient: Address,
    pub meta_address: StealthMetaAddress,
    pub token: TokenDescriptor,
    pub amount: U256,
}

/// 转账成功后的回执
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub network: NetworkPrefix,
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub stealth_address: Address,
    pub ephemeral_public_key: Bytes,
    pub view_tag: u8,
    pub confirmed_at: DateTime<Utc>,
}

/// 要求钱包连接在目标网络上
pub async fn ensure_wallet_network(
    wallet: &dyn WalletProvider,
    network: NetworkPrefix,
) -> Result<()> {
    let expected = chain_config::chain(network).chain_id;
    let actual = wallet.chain_id().await?;
    if actual != expected {
        warn!(expected, actual, "wallet connected to wrong network");
        return Err(StealthError::wallet_network_mismatch(expected, actual));
    }
    Ok(())
}

fn tx_error(kind: TxKind, err: &StealthError) -> StealthError {
    match err {
        // 可本地修正的错误原样返回
        e if e.is_recoverable() => e.clone(),
        e => {
            let detail = e.detail();
            match kind {
                TxKind::Approve => StealthError::Approval(detail),
                TxKind::Transfer => StealthError::Transfer(detail),
                TxKind::Register => StealthError::Registration(detail),
            }
        }
    }
}

/// 模拟 → 广播 → 等待回执
///
/// `on_broadcast` 在拿到交易哈希后调用。
pub(crate) async fn submit_and_confirm(
    wallet: &dyn WalletProvider,
    kind: TxKind,
    call: &ContractCall,
    on_broadcast: impl FnOnce(H256),
) -> Result<TxOutcome> {
    let result: Result<TxOutcome> = async {
        wallet.simulate(call).await?;
        let tx_hash = wallet.send(call).await?;
        metrics::inc_tx_submitted(kind.as_str());
        info!(kind = kind.as_str(), tx_hash = ?tx_hash, to = ?call.to, "transaction broadcast");
        on_broadcast(tx_hash);

        let outcome = wallet.wait_for_receipt(tx_hash).await?;
        if !outcome.success {
            return Err(StealthError::rpc(format!("Transaction {:?} reverted", tx_hash)));
        }
        Ok(outcome)
    }
    .await;

    result.map_err(|e| {
        metrics::inc_tx_failed(kind.as_str());
        error!(kind = kind.as_str(), error = %e, "transaction failed");
        tx_error(kind, &e)
    })
}

pub struct TransferOrchestrator {
    generator: Arc<dyn StealthAddressGenerator>,
    phase: Mutex<TransactionPhase>,
}

impl TransferOrchestrator {
    pub fn new(generator: Arc<dyn StealthAddressGenerator>) -> Self {
        Self {
            generator,
            phase: Mutex::new(TransactionPhase::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionPhase> {
        match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn phase(&self) -> TransactionPhase {
        self.lock().clone()
    }

    fn transition(&self, next: TransactionPhase) -> Result<()> {
        let mut phase = self.lock();
        if !phase.can_transition_to(&next) {
            return Err(StealthError::not_ready(format!(
                "a transaction is already {}",
                phase.as_str()
            )));
        }
        *phase = next;
        Ok(())
    }

    pub fn reset(&self) {
        *self.lock() = TransactionPhase::Idle;
    }

    /// 提交授权交易（ERC-20 授权数量 / ERC-721 授权 token id）
    ///
    /// 与转账共用交易阶段：已有交易在途时返回 NotReady。
    pub async fn approve(
        &self,
        wallet: &dyn WalletProvider,
        network: NetworkPrefix,
        token: &TokenDescriptor,
        amount: U256,
    ) -> Result<TxOutcome> {
        let token_address = match (token.kind, token.address) {
            (TokenKind::Native, _) | (_, None) => {
                return Err(StealthError::not_ready("native assets do not need approval"))
            }
            (_, Some(address)) => address,
        };

        ensure_wallet_network(wallet, network).await?;
        self.transition(TransactionPhase::Submitting)?;

        let spender = chain_config::chain(network).stealth_contract;
        let call = ContractCall::new(token_address, abi::approve(spender, amount));

        info!(
            token = ?token_address,
            spender = ?spender,
            amount = %amount,
            kind = token.kind.as_str(),
            "submitting approval"
        );
        let result = submit_and_confirm(wallet, TxKind::Approve, &call, |tx_hash| {
            *self.lock() = TransactionPhase::Pending { tx_hash };
        })
        .await;
        self.settle(&result, |outcome| outcome.tx_hash);
        result
    }

    /// 交易结束：写入终态
    fn settle<T>(&self, result: &Result<T>, tx_hash: impl FnOnce(&T) -> H256) {
        *self.lock() = match result {
            Ok(value) => TransactionPhase::Confirmed {
                tx_hash: tx_hash(value),
            },
            Err(e) => TransactionPhase::Failed {
                message: e.to_string(),
            },
        };
    }

    /// 提交隐身转账；非原生资产要求授权已完成
    pub async fn transfer(
        &self,
        wallet: &dyn WalletProvider,
        request: &TransferRequest,
        approval: &ApprovalStatus,
    ) -> Result<TransferReceipt> {
        let approved_for_amount =
            approval.is_approved() && approval.amount() == Some(request.amount);
        if !request.token.is_native() && !approved_for_amount {
            return Err(StealthError::not_ready("token approval required"));
        }

        ensure_wallet_network(wallet, request.network).await?;
        self.transition(TransactionPhase::Submitting)?;

        let result = self.submit_transfer(wallet, request).await;
        self.settle(&result, |receipt| receipt.tx_hash);
        result
    }

    async fn submit_transfer(
        &self,
        wallet: &dyn WalletProvider,
        request: &TransferRequest,
    ) -> Result<TransferReceipt> {
        let generated = self
            .generator
            .generate(&request.meta_address)
            .map_err(|e| tx_error(TxKind::Transfer, &e))?;
        let intent = StealthTransferIntent::new(generated, &request.token, request.amount)?;

        let contract = chain_config::chain(request.network).stealth_contract;
        let call = ContractCall::new(contract, abi::stealth_transfer(&intent)).with_value(intent.value);

        info!(
            network = %request.network,
            recipient = ?request.recipient,
            stealth_address = ?intent.stealth_address,
            view_tag = intent.view_tag,
            token = %request.token.symbol,
            amount = %request.amount,
            "submitting stealth transfer"
        );

        let outcome = submit_and_confirm(wallet, TxKind::Transfer, &call, |tx_hash| {
            *self.lock() = TransactionPhase::Pending { tx_hash };
        })
        .await?;

        info!(tx_hash = ?outcome.tx_hash, block = ?outcome.block_number, "stealth transfer confirmed");

        Ok(TransferReceipt {
            network: request.network,
            tx_hash: outcome.tx_hash,
            block_number: outcome.block_number,
            stealth_address: intent.stealth_address,
            ephemeral_public_key: intent.ephemeral_public_key,
            view_tag: intent.view_tag,
            confirmed_at: Utc::now(),
        })
    }
}
