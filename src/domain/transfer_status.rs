//! 管线状态定义
//! 名称解析、授权检查、交易提交三条状态机，全部使用显式枚举

use std::fmt;

use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};

/// 名称解析状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionState {
    #[default]
    Idle,
    Resolving,
    Resolved,
    Failed,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        }
    }
}

/// 授权状态机
///
/// `Reset -> Checking -> {Approved, NotApproved, Error}`，检查结果只对携带的金额有效。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApprovalStatus {
    #[default]
    Reset,
    Checking { amount: U256 },
    Approved { amount: U256 },
    NotApproved { amount: U256 },
    Error { amount: U256, message: String },
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Checking { .. } => "checking",
            Self::Approved { .. } => "approved",
            Self::NotApproved { .. } => "not_approved",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn check_in_flight(&self) -> bool {
        matches!(self, Self::Checking { .. })
    }

    /// 当前状态对应的金额（Reset 无金额）
    pub fn amount(&self) -> Option<U256> {
        match self {
            Self::Reset => None,
            Self::Checking { amount }
            | Self::Approved { amount }
            | Self::NotApproved { amount }
            | Self::Error { amount, .. } => Some(*amount),
        }
    }

    /// 该金额是否已检查过或正在检查
    pub fn covers(&self, amount: U256) -> bool {
        self.amount() == Some(amount)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 交易类型（指标标签与错误归类）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Approve,
    Transfer,
    Register,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Transfer => "transfer",
            Self::Register => "register",
        }
    }
}

/// 交易生命周期
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionPhase {
    #[default]
    Idle,
    /// 模拟 + 签名 + 广播中
    Submitting,
    /// 已广播，等待回执
    Pending { tx_hash: H256 },
    /// 回执状态为成功
    Confirmed { tx_hash: H256 },
    Failed { message: String },
}

impl TransactionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Pending { .. } => "pending",
            Self::Confirmed { .. } => "confirmed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Submitting | Self::Pending { .. })
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionPhase::*;

        match (self, target) {
            // 终态后可以重新提交
            (Idle, Submitting) | (Confirmed { .. }, Submitting) | (Failed { .. }, Submitting) => {
                true
            }
            (Submitting, Pending { .. }) | (Submitting, Failed { .. }) => true,
            (Pending { .. }, Confirmed { .. }) | (Pending { .. }, Failed { .. }) => true,
            // reset
            (_, Idle) => true,
            _ => false,
        }
    }
}
