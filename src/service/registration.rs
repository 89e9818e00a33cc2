//! 隐身元地址注册
//!
//! 输入格式 `st:<prefix>:<hex>`，向 ERC-6538 注册表提交 `registerKeys(1, bytes)`。

use tracing::info;

use super::transfer::{ensure_wallet_network, submit_and_confirm};
use crate::{
    domain::{
        address_reference::MetaAddressInput,
        chain_config::{self, SCHEME_ID},
        transfer_status::TxKind,
    },
    error::{Result, StealthError},
    infrastructure::{
        abi,
        chain_client::{ContractCall, TxOutcome, WalletProvider},
    },
};

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistrationService;

impl RegistrationService {
    pub fn new() -> Self {
        Self
    }

    /// 校验输入并构造注册调用（不涉及网络）
    pub fn prepare(&self, input: &str) -> Result<(MetaAddressInput, ContractCall)> {
        let parsed = MetaAddressInput::parse(input);
        let (Some(network), Some(bytes)) = (parsed.network_prefix, parsed.bytes()) else {
            return Err(StealthError::invalid_meta_address(
                "Invalid stealth meta-address format",
            ));
        };

        let registry = chain_config::chain(network).registry_address;
        let call = ContractCall::new(registry, abi::register_keys(SCHEME_ID, &bytes));
        Ok((parsed, call))
    }

    pub async fn register(&self, wallet: &dyn WalletProvider, input: &str) -> Result<TxOutcome> {
        let (parsed, call) = self.prepare(input)?;
        let Some(network) = parsed.network_prefix else {
            return Err(StealthError::invalid_meta_address(
                "Invalid stealth meta-address format",
            ));
        };

        ensure_wallet_network(wallet, network).await?;

        info!(
            network = %network,
            registrant = ?wallet.address(),
            "registering stealth meta-address"
        );
        submit_and_confirm(wallet, TxKind::Register, &call, |_| {}).await
    }
}
