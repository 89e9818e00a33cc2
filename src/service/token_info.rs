//! 代币信息服务
//!
//! 并发探测 symbol / name / decimals，单个探测失败按“未知”处理：
//! - decimals 成功 → 同质化代币
//! - decimals 失败但 symbol 或 name 成功 → NFT
//! - 全部失败 → 不是有效的代币合约
//!
//! 原生资产（哨兵值或别名）直接返回链的固定描述，不访问网络。

use std::{sync::Arc, time::Duration};

use ethers::types::Address;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        address_reference::AddressReference,
        chain_config::{self, NetworkPrefix},
        token::{self, CommonToken, TokenDescriptor},
    },
    error::{Result, StealthError},
    infrastructure::{
        chain_client::ChainReader,
        request_gate::{FieldState, GateOutcome, RequestGate},
    },
    utils::AddressValidator,
};

pub struct TokenInfoService {
    reader: Arc<dyn ChainReader>,
    gate: RequestGate<String, TokenDescriptor>,
    debounce: Duration,
}

impl TokenInfoService {
    pub fn new(reader: Arc<dyn ChainReader>, debounce: Duration) -> Self {
        Self {
            reader,
            gate: RequestGate::new("token"),
            debounce,
        }
    }

    /// 探测并分类合约
    pub async fn classify(&self, network: NetworkPrefix, address: Address) -> Result<TokenDescriptor> {
        let (symbol, name, decimals) = tokio::join!(
            self.reader.symbol(network, address),
            self.reader.name(network, address),
            self.reader.decimals(network, address),
        );

        for (probe, err) in [
            ("symbol", symbol.as_ref().err()),
            ("name", name.as_ref().err()),
            ("decimals", decimals.as_ref().err()),
        ] {
            if let Some(err) = err {
                debug!(probe, token = ?address, network = %network, error = %err, "token probe failed");
            }
        }

        let symbol = symbol.ok();
        let name = name.ok();

        match decimals {
            Ok(decimals) => Ok(TokenDescriptor::fungible(
                network, address, symbol, name, decimals,
            )),
            Err(_) if symbol.is_some() || name.is_some() => {
                Ok(TokenDescriptor::non_fungible(network, address, symbol, name))
            }
            Err(_) => Err(StealthError::InvalidToken),
        }
    }

    /// 代币输入变化时调用；`recipient_network` 为当前收款人的网络
    pub async fn identify(
        &self,
        input: &str,
        recipient_network: NetworkPrefix,
    ) -> GateOutcome<TokenDescriptor> {
        let input = input.trim();
        if input.is_empty() {
            self.reset();
            return GateOutcome::Applied(Err(StealthError::invalid_address(
                "Token address is required",
            )));
        }

        let reference = AddressReference::parse_with_default(input, recipient_network);
        let key = reference.normalized_key();

        // 网络前缀必须与收款人一致，在任何 I/O 之前拒绝
        if let Some(prefix) = reference.network_prefix {
            if prefix != recipient_network {
                let err = StealthError::token_network_mismatch(recipient_network, prefix);
                self.gate.set_immediate(key, Err(err.clone()));
                return GateOutcome::Applied(Err(err));
            }
        }

        if token::is_native_input(&reference.identifier) {
            let native = TokenDescriptor::native(chain_config::chain(recipient_network));
            self.gate.set_immediate(key, Ok(native.clone()));
            return GateOutcome::Applied(Ok(native));
        }

        let Some(address) = AddressValidator::parse(&reference.identifier) else {
            let err = StealthError::invalid_address("Invalid token address format");
            self.gate.set_immediate(key, Err(err.clone()));
            return GateOutcome::Applied(Err(err));
        };

        let outcome = self
            .gate
            .run(key.clone(), self.debounce, || {
                self.classify(recipient_network, address)
            })
            .await;

        match &outcome {
            GateOutcome::Applied(Ok(token)) => info!(
                token = %key,
                kind = token.kind.as_str(),
                symbol = %token.symbol,
                decimals = token.decimals,
                "token identified"
            ),
            GateOutcome::Applied(Err(e)) => warn!(token = %key, error = %e, "token lookup failed"),
            GateOutcome::Deduplicated => debug!(token = %key, "token lookup deduplicated"),
            GateOutcome::Superseded => debug!(token = %key, "token lookup superseded"),
        }

        outcome
    }

    /// 从常用列表选择（固定元数据，不探测）
    pub fn select_common(&self, network: NetworkPrefix, common: &CommonToken) -> Result<TokenDescriptor> {
        let descriptor = match common.address {
            None => TokenDescriptor::native(chain_config::chain(network)),
            Some(address) => {
                let address = AddressValidator::parse(address)
                    .ok_or_else(|| StealthError::invalid_address("Invalid token address format"))?;
                TokenDescriptor::fungible(
                    network,
                    address,
                    Some(common.symbol.to_string()),
                    Some(common.name.to_string()),
                    common.decimals,
                )
            }
        };

        let key = format!("{}:{}", network, common.input_value().to_lowercase());
        self.gate.set_immediate(key, Ok(descriptor.clone()));
        Ok(descriptor)
    }

    pub fn state(&self) -> FieldState<TokenDescriptor> {
        self.gate.state()
    }

    pub fn current(&self) -> Option<TokenDescriptor> {
        self.gate.state().value().cloned()
    }

    pub fn reset(&self) {
        self.gate.invalidate();
    }
}
