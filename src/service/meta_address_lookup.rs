//! 隐身元地址查询服务
//!
//! 对每个有效的收款人引用：防抖 → （名称则先解析）→ 读取 ERC-6538 注册表。
//! 同一规范化输入最多一个请求在途，完成后不再重复查询；输入变化后旧结果被丢弃。
//! 注册表返回空字节串表示“未注册”，与查询错误区分。

use std::{sync::Arc, time::Duration};

use ethers::types::Address;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::name_resolution::NameResolutionService;
use crate::{
    domain::{
        address_reference::AddressReference,
        chain_config::{NetworkPrefix, SCHEME_ID},
        stealth::StealthMetaAddress,
    },
    error::{Result, StealthError},
    infrastructure::{
        chain_client::ChainReader,
        request_gate::{FieldState, GateOutcome, RequestGate},
    },
};

/// 查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetaAddressStatus {
    Registered {
        network: NetworkPrefix,
        owner: Address,
        meta_address: StealthMetaAddress,
    },
    NotRegistered {
        network: NetworkPrefix,
        owner: Address,
    },
}

impl MetaAddressStatus {
    pub fn owner(&self) -> Address {
        match self {
            Self::Registered { owner, .. } | Self::NotRegistered { owner, .. } => *owner,
        }
    }

    pub fn network(&self) -> NetworkPrefix {
        match self {
            Self::Registered { network, .. } | Self::NotRegistered { network, .. } => *network,
        }
    }

    pub fn meta_address(&self) -> Option<&StealthMetaAddress> {
        match self {
            Self::Registered { meta_address, .. } => Some(meta_address),
            Self::NotRegistered { .. } => None,
        }
    }
}

pub struct MetaAddressLookupService {
    reader: Arc<dyn ChainReader>,
    names: Arc<NameResolutionService>,
    gate: RequestGate<String, MetaAddressStatus>,
    debounce: Duration,
}

impl MetaAddressLookupService {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        names: Arc<NameResolutionService>,
        debounce: Duration,
    ) -> Self {
        Self {
            reader,
            names,
            gate: RequestGate::new("meta_address"),
            debounce,
        }
    }

    /// 直接查询注册表（不经过闸门）
    pub async fn query(&self, owner: Address, network: NetworkPrefix) -> Result<MetaAddressStatus> {
        let raw = self
            .reader
            .stealth_meta_address_of(network, owner, SCHEME_ID)
            .await
            .map_err(|e| StealthError::LookupFailed(e.detail()))?;

        match StealthMetaAddress::from_registry_bytes(&raw)? {
            Some(meta_address) => Ok(MetaAddressStatus::Registered {
                network,
                owner,
                meta_address,
            }),
            None => Ok(MetaAddressStatus::NotRegistered { network, owner }),
        }
    }

    /// 收款人输入变化时调用
    pub async fn lookup(&self, reference: &AddressReference) -> GateOutcome<MetaAddressStatus> {
        let Some(network) = reference.network_prefix.filter(|_| reference.is_valid) else {
            // 无效输入不发起查询，并使在途结果失效
            self.reset();
            return GateOutcome::Applied(Err(StealthError::invalid_address(
                "Invalid address format",
            )));
        };

        let key = reference.normalized_key();
        let outcome = self
            .gate
            .run(key.clone(), self.debounce, || async move {
                // 名称必须先解析出地址，才会访问注册表
                let owner = self.names.require_address(reference).await?;
                debug!(network = %network, owner = ?owner, "looking up stealth meta-address");
                self.query(owner, network).await
            })
            .await;

        match &outcome {
            GateOutcome::Applied(Ok(MetaAddressStatus::Registered { owner, .. })) => {
                info!(input = %key, owner = ?owner, "stealth meta-address found")
            }
            GateOutcome::Applied(Ok(MetaAddressStatus::NotRegistered { owner, .. })) => {
                info!(input = %key, owner = ?owner, "recipient has not registered a stealth meta-address")
            }
            GateOutcome::Applied(Err(e)) => {
                warn!(input = %key, code = e.code().as_str(), error = %e, "meta-address lookup failed")
            }
            GateOutcome::Deduplicated => debug!(input = %key, "meta-address lookup deduplicated"),
            GateOutcome::Superseded => debug!(input = %key, "meta-address lookup superseded"),
        }

        outcome
    }

    pub fn state(&self) -> FieldState<MetaAddressStatus> {
        self.gate.state()
    }

    pub fn current(&self) -> Option<MetaAddressStatus> {
        self.gate.state().value().cloned()
    }

    pub fn reset(&self) {
        self.gate.invalidate();
        self.names.reset();
    }
}
