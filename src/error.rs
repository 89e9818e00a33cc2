//! 统一错误定义
//!
//! 管线各阶段的错误都收敛到 `StealthError`，错误只在本阶段生效，
//! 不会清空其他阶段的状态（例如代币查询失败不会影响收款人解析结果）。

use thiserror::Error;

use crate::domain::chain_config::NetworkPrefix;

/// 稳定的错误码（对外展示/日志使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // 输入校验
    InvalidAddress,
    InvalidAmount,
    InvalidMetaAddress,
    // 解析/查询
    NameUnresolved,
    LookupFailed,
    // 代币分类
    InvalidToken,
    // 授权/转账
    ApprovalFailed,
    TransactionFailed,
    NotReady,
    // 网络
    NetworkMismatch,
    ChainNotSupported,
    WalletNotConnected,
    RpcError,
    ConfigError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAddress => "invalid_address",
            ErrorCode::InvalidAmount => "invalid_amount",
            ErrorCode::InvalidMetaAddress => "invalid_meta_address",
            ErrorCode::NameUnresolved => "name_unresolved",
            ErrorCode::LookupFailed => "lookup_failed",
            ErrorCode::InvalidToken => "invalid_token",
            ErrorCode::ApprovalFailed => "approval_failed",
            ErrorCode::TransactionFailed => "transaction_failed",
            ErrorCode::NotReady => "not_ready",
            ErrorCode::NetworkMismatch => "network_mismatch",
            ErrorCode::ChainNotSupported => "chain_not_supported",
            ErrorCode::WalletNotConnected => "wallet_not_connected",
            ErrorCode::RpcError => "rpc_error",
            ErrorCode::ConfigError => "config_error",
        }
    }
}

/// 输入校验失败的具体字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationField {
    Address,
    Amount,
    MetaAddress,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StealthError {
    /// 本地输入校验错误，不自动重试
    #[error("{message}")]
    Validation {
        field: ValidationField,
        message: String,
    },

    /// 名称无法解析为地址
    #[error("Could not resolve name {name}")]
    Resolution { name: String },

    /// 注册表查询失败（区别于“未注册”）
    #[error("Error looking up stealth meta-address: {0}")]
    LookupFailed(String),

    /// 所有元数据探测均失败
    #[error("Address does not appear to be a valid token contract")]
    InvalidToken,

    #[error("Failed to approve: {0}")]
    Approval(String),

    #[error("Failed to transfer: {0}")]
    Transfer(String),

    #[error("Failed to register: {0}")]
    Registration(String),

    /// 提交前置条件未满足
    #[error("Transfer not ready: {0}")]
    NotReady(String),

    /// 钱包网络与目标网络不一致，需要用户切换网络
    #[error("Network mismatch: expected {expected}, got {actual}. Please switch your wallet to the correct network")]
    NetworkMismatch { expected: String, actual: String },

    /// 代币输入的网络前缀与收款人不一致
    #[error("Network prefix mismatch. Please use {expected}: for tokens")]
    PrefixMismatch {
        expected: NetworkPrefix,
        actual: NetworkPrefix,
    },

    #[error("Wallet is not connected")]
    WalletNotConnected,

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StealthError {
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::Validation {
            field: ValidationField::Address,
            message: msg.into(),
        }
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::Validation {
            field: ValidationField::Amount,
            message: msg.into(),
        }
    }

    pub fn invalid_meta_address(msg: impl Into<String>) -> Self {
        Self::Validation {
            field: ValidationField::MetaAddress,
            message: msg.into(),
        }
    }

    /// 代币与收款人网络前缀不一致
    pub fn token_network_mismatch(expected: NetworkPrefix, actual: NetworkPrefix) -> Self {
        Self::PrefixMismatch { expected, actual }
    }

    /// 钱包所在链与目标链不一致
    pub fn wallet_network_mismatch(expected_chain_id: u64, actual_chain_id: u64) -> Self {
        Self::NetworkMismatch {
            expected: format!("chain {}", expected_chain_id),
            actual: format!("chain {}", actual_chain_id),
        }
    }

    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// 原始错误信息（RPC 错误不带前缀），用于透传给用户
    pub fn detail(&self) -> String {
        match self {
            Self::Rpc(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { field, .. } => match field {
                ValidationField::Address => ErrorCode::InvalidAddress,
                ValidationField::Amount => ErrorCode::InvalidAmount,
                ValidationField::MetaAddress => ErrorCode::InvalidMetaAddress,
            },
            Self::Resolution { .. } => ErrorCode::NameUnresolved,
            Self::LookupFailed(_) => ErrorCode::LookupFailed,
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::Approval(_) => ErrorCode::ApprovalFailed,
            Self::Transfer(_) | Self::Registration(_) => ErrorCode::TransactionFailed,
            Self::NotReady(_) => ErrorCode::NotReady,
            Self::NetworkMismatch { .. } | Self::PrefixMismatch { .. } => {
                ErrorCode::NetworkMismatch
            }
            Self::WalletNotConnected => ErrorCode::WalletNotConnected,
            Self::UnsupportedNetwork(_) => ErrorCode::ChainNotSupported,
            Self::Rpc(_) => ErrorCode::RpcError,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// 用户可在本地修正（修改输入或切换网络）的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotReady(_)
                | Self::NetworkMismatch { .. }
                | Self::PrefixMismatch { .. }
                | Self::WalletNotConnected
        )
    }
}

pub type Result<T, E = StealthError> = std::result::Result<T, E>;
