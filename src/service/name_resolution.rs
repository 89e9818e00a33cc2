//! 名称解析服务
//!
//! 同一时刻只有与当前引用匹配的解析结果有效；旧引用的结果到达时直接丢弃，
//! 不主动取消请求。直接输入的地址不发起任何外部调用。

use std::sync::{Arc, Mutex};

use ethers::types::Address;
use tracing::{debug, info};

use crate::{
    domain::{
        address_reference::AddressReference, transfer_status::ResolutionState,
    },
    error::{Result, StealthError},
    infrastructure::{
        chain_client::NameResolver,
        request_gate::{FieldState, GateOutcome, RequestGate},
    },
    utils::AddressValidator,
};

/// 解析结果快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub reference: Option<AddressReference>,
    pub resolved_address: Option<Address>,
    pub resolution_state: ResolutionState,
}

pub struct NameResolutionService {
    resolver: Arc<dyn NameResolver>,
    gate: RequestGate<String, Option<Address>>,
    reference: Mutex<Option<AddressReference>>,
}

impl NameResolutionService {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            resolver,
            gate: RequestGate::new("name"),
            reference: Mutex::new(None),
        }
    }

    fn set_reference(&self, reference: Option<AddressReference>) {
        let mut current = match self.reference.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = reference;
    }

    /// 解析引用为地址。无效引用返回校验错误且不保留状态。
    pub async fn resolve(&self, reference: &AddressReference) -> GateOutcome<Option<Address>> {
        let Some(network) = reference.network_prefix.filter(|_| reference.is_valid) else {
            self.reset();
            return GateOutcome::Applied(Err(StealthError::invalid_address(
                "Invalid address format",
            )));
        };

        self.set_reference(Some(reference.clone()));
        let key = reference.normalized_key();

        if !reference.is_name {
            let address = AddressValidator::parse(&reference.identifier);
            let result = address
                .map(Some)
                .ok_or_else(|| StealthError::invalid_address("Invalid address format"));
            self.gate.set_immediate(key, result.clone());
            return GateOutcome::Applied(result);
        }

        let name = reference.identifier.as_str();
        let outcome = self
            .gate
            .run(key, std::time::Duration::ZERO, || async move {
                debug!(name = %name, network = %network, "resolving name");
                self.resolver.resolve(network, name).await
            })
            .await;

        match &outcome {
            GateOutcome::Applied(Ok(Some(address))) => {
                info!(name = %name, address = ?address, "name resolved")
            }
            GateOutcome::Applied(Ok(None)) => info!(name = %name, "name not found"),
            GateOutcome::Applied(Err(e)) => debug!(name = %name, error = %e, "name resolution failed"),
            _ => {}
        }

        outcome
    }

    /// 解析并要求得到地址（未找到视为错误）
    pub async fn require_address(&self, reference: &AddressReference) -> Result<Address> {
        let address = match self.resolve(reference).await {
            GateOutcome::Applied(result) => result?,
            // 同一名称已解析过或正在解析：等待那次请求的结果
            GateOutcome::Deduplicated => self
                .gate
                .settled(&reference.normalized_key())
                .await
                .transpose()?
                .flatten(),
            GateOutcome::Superseded => None,
        };

        address.ok_or_else(|| StealthError::Resolution {
            name: reference.identifier.clone(),
        })
    }

    pub fn target(&self) -> ResolvedTarget {
        let reference = match self.reference.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let state = self.gate.state();
        let resolution_state = match &state {
            FieldState::Idle => ResolutionState::Idle,
            FieldState::PendingDebounce | FieldState::InFlight => ResolutionState::Resolving,
            FieldState::Done(Some(_)) => ResolutionState::Resolved,
            FieldState::Done(None) | FieldState::Failed(_) => ResolutionState::Failed,
        };

        ResolvedTarget {
            reference,
            resolved_address: state.value().copied().flatten(),
            resolution_state,
        }
    }

    pub fn reset(&self) {
        self.gate.invalidate();
        self.set_reference(None);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::domain::chain_config::NetworkPrefix;

    struct StaticResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NameResolver for StaticResolver {
        async fn resolve(&self, _network: NetworkPrefix, name: &str) -> Result<Option<Address>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((name == "alice.eth").then(|| Address::repeat_byte(0xa1)))
        }
    }

    fn service() -> (Arc<StaticResolver>, NameResolutionService) {
        let resolver = Arc::new(StaticResolver {
            calls: AtomicUsize::new(0),
        });
        (resolver.clone(), NameResolutionService::new(resolver))
    }

    #[tokio::test]
    async fn test_direct_address_skips_resolver() {
        let (resolver, service) = service();
        let reference =
            AddressReference::parse("eth:0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        let address = service.require_address(&reference).await.unwrap();
        assert_eq!(
            address,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.target().resolution_state, ResolutionState::Resolved);
    }

    #[tokio::test]
    async fn test_name_resolution_and_dedupe() {
        let (resolver, service) = service();
        let reference = AddressReference::parse("eth:alice.eth");

        let first = service.require_address(&reference).await.unwrap();
        let second = service.require_address(&reference).await.unwrap();
        assert_eq!(first, Address::repeat_byte(0xa1));
        assert_eq!(first, second);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_name_fails() {
        let (_, service) = service();
        let reference = AddressReference::parse("eth:nobody.eth");
        let err = service.require_address(&reference).await.unwrap_err();
        assert_eq!(
            err,
            StealthError::Resolution {
                name: "nobody.eth".into()
            }
        );
        let target = service.target();
        assert_eq!(target.resolution_state, ResolutionState::Failed);
        assert_eq!(target.resolved_address, None);
    }

    #[tokio::test]
    async fn test_invalid_reference_resets() {
        let (_, service) = service();
        let outcome = service.resolve(&AddressReference::parse("alice.eth")).await;
        assert!(matches!(outcome, GateOutcome::Applied(Err(_))));
        assert_eq!(service.target().resolution_state, ResolutionState::Idle);
    }

    struct HeldResolver {
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NameResolver for HeldResolver {
        async fn resolve(&self, _network: NetworkPrefix, _name: &str) -> Result<Option<Address>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(Some(Address::repeat_byte(0xb0)))
        }
    }

    #[tokio::test]
    async fn test_repeated_name_waits_for_running_resolution() {
        let resolver = Arc::new(HeldResolver {
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let service = NameResolutionService::new(resolver.clone());
        let reference = AddressReference::parse("eth:bob.eth");

        let (first, second) = tokio::join!(service.require_address(&reference), async {
            assert_eq!(service.target().resolution_state, ResolutionState::Resolving);
            let (second, _) = tokio::join!(service.require_address(&reference), async {
                resolver.release.notify_one();
            });
            second
        });

        assert_eq!(first.unwrap(), Address::repeat_byte(0xb0));
        assert_eq!(second.unwrap(), Address::repeat_byte(0xb0));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }
}
