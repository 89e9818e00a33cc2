//! Stealthereum - ERC-5564 / ERC-6538 隐身地址转账管线
//!
//! 客户端侧：解析收款人引用、查询隐身元地址、识别代币、规范化金额、
//! 检查/提交授权，最后向隐身转账合约提交一次性地址转账。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{ErrorCode, Result, StealthError};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{
            AddressReference, AmountValue, ApprovalStatus, NetworkPrefix, StealthMetaAddress,
            TokenDescriptor, TokenKind,
        },
        error::{ErrorCode, StealthError},
        service::{TransferReceipt, TransferSession},
    };
}
