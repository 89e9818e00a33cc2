//! Service 模块
//!
//! 管线各阶段的有状态服务，以及把它们串起来的 `TransferSession`

pub mod approval;
pub mod meta_address_lookup;
pub mod name_resolution;
pub mod registration;
pub mod session;
pub mod token_info;
pub mod transfer;

pub use approval::{ApprovalContext, ApprovalCoordinator};
pub use meta_address_lookup::{MetaAddressLookupService, MetaAddressStatus};
pub use name_resolution::{NameResolutionService, ResolvedTarget};
pub use registration::RegistrationService;
pub use session::{SessionSnapshot, TransferSession};
pub use token_info::TokenInfoService;
pub use transfer::{TransferOrchestrator, TransferReceipt, TransferRequest};
