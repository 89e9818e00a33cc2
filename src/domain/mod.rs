//! Domain 模块
//!
//! 纯数据与纯函数：输入解析、网络表、代币/金额、隐身地址模型与状态枚举

pub mod address_reference;
pub mod amount;
pub mod chain_config;
pub mod stealth;
pub mod token;
pub mod transfer_status;

// 重新导出常用类型
pub use address_reference::{AddressReference, MetaAddressInput};
pub use amount::{AmountNormalizer, AmountValue};
pub use chain_config::{ChainConfig, NetworkPrefix, NetworkResolver, ResolvedNetwork};
pub use stealth::{
    GeneratedStealthAddress, Secp256k1StealthGenerator, StealthAddressGenerator,
    StealthMetaAddress, StealthTransferIntent,
};
pub use token::{TokenDescriptor, TokenKind};
pub use transfer_status::{ApprovalStatus, ResolutionState, TransactionPhase, TxKind};
