//! 授权协调器
//!
//! 状态机：`Reset -> Checking -> {Approved, NotApproved, Error}`
//!
//! - 收款人或资产变化 → Reset
//! - 金额与上次检查的金额不同 → 重新 Checking
//! - 原生资产直接 Approved，不发起调用
//! - 已检查/正在检查的金额不重复检查；检查进行中出现的新金额会被记录，
//!   当前检查结束后再检查最新金额

use std::sync::{Arc, Mutex, MutexGuard};

use ethers::types::{Address, U256};
use tracing::{debug, info};

use crate::{
    domain::{
        chain_config::NetworkPrefix,
        token::{TokenDescriptor, TokenKind},
        transfer_status::ApprovalStatus,
    },
    error::Result,
    infrastructure::chain_client::ChainReader,
};

/// 一次授权检查的上下文（收款人 + 资产 + 钱包）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalContext {
    pub network: NetworkPrefix,
    /// 收款人地址；变化时强制重置
    pub recipient: Address,
    pub owner: Address,
    /// 隐身转账合约
    pub spender: Address,
    pub token: TokenDescriptor,
}

#[derive(Debug, Default)]
struct Inner {
    epoch: u64,
    context: Option<ApprovalContext>,
    status: ApprovalStatus,
    /// 检查进行中时收到的最新金额
    pending_amount: Option<U256>,
}

pub struct ApprovalCoordinator {
    reader: Arc<dyn ChainReader>,
    inner: Mutex<Inner>,
}

impl ApprovalCoordinator {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self {
            reader,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        self.lock().status.clone()
    }

    /// 收款人或资产变化
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.context = None;
        inner.status = ApprovalStatus::Reset;
        inner.pending_amount = None;
    }

    /// 检查给定金额是否已授权
    pub async fn check(&self, context: &ApprovalContext, amount: U256) -> ApprovalStatus {
        let (epoch, mut amount) = {
            let mut inner = self.lock();

            if inner.context.as_ref() != Some(context) {
                inner.epoch += 1;
                inner.context = Some(context.clone());
                inner.status = ApprovalStatus::Reset;
                inner.pending_amount = None;
            }

            if context.token.kind == TokenKind::Native {
                inner.status = ApprovalStatus::Approved { amount };
                return inner.status.clone();
            }

            if inner.status.covers(amount) {
                debug!(amount = %amount, status = inner.status.as_str(), "approval already checked for amount");
                inner.pending_amount = None;
                return inner.status.clone();
            }

            if inner.status.check_in_flight() {
                debug!(amount = %amount, "approval check in flight, queued latest amount");
                inner.pending_amount = Some(amount);
                return inner.status.clone();
            }

            inner.status = ApprovalStatus::Checking { amount };
            (inner.epoch, amount)
        };

        loop {
            let result = self.query(context, amount).await;

            let mut inner = self.lock();
            if inner.epoch != epoch {
                debug!(amount = %amount, "approval result dropped after reset");
                return inner.status.clone();
            }

            inner.status = match result {
                Ok(true) => ApprovalStatus::Approved { amount },
                Ok(false) => ApprovalStatus::NotApproved { amount },
                Err(e) => ApprovalStatus::Error {
                    amount,
                    message: e.detail(),
                },
            };
            info!(
                token = ?context.token.address,
                amount = %amount,
                status = inner.status.as_str(),
                "approval checked"
            );

            match inner.pending_amount.take() {
                Some(next) if next != amount => {
                    inner.status = ApprovalStatus::Checking { amount: next };
                    amount = next;
                }
                _ => return inner.status.clone(),
            }
        }
    }

    /// 授权交易成功后调用
    pub fn mark_approved(&self, context: &ApprovalContext, amount: U256) {
        let mut inner = self.lock();
        if inner.context.as_ref() == Some(context) {
            inner.status = ApprovalStatus::Approved { amount };
            inner.pending_amount = None;
        }
    }

    async fn query(&self, context: &ApprovalContext, amount: U256) -> Result<bool> {
        let Some(token) = context.token.address else {
            return Ok(true);
        };

        match context.token.kind {
            TokenKind::Native => Ok(true),
            TokenKind::Fungible => {
                let allowance = self
                    .reader
                    .allowance(context.network, token, context.owner, context.spender)
                    .await?;
                Ok(allowance >= amount)
            }
            TokenKind::NonFungible => {
                let approved = self
                    .reader
                    .get_approved(context.network, token, amount)
                    .await?;
                Ok(approved == context.spender)
            }
        }
    }
}
