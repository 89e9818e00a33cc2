//! 测试辅助模块
//! 内存实现的链、名称解析、钱包与派生器，用于驱动完整管线

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use k256::{elliptic_curve::sec1::ToEncodedPoint, SecretKey};
use stealthereum::{
    config::PipelineConfig,
    domain::{
        chain_config::NetworkPrefix, GeneratedStealthAddress, StealthAddressGenerator,
        StealthMetaAddress,
    },
    error::{Result, StealthError},
    infrastructure::{ChainReader, ContractCall, NameResolver, TxOutcome, WalletProvider},
    service::TransferSession,
};
use tokio::sync::Notify;

pub const BOB: &str = "eth:bob.eth";
pub const ALICE: &str = "eth:alice.eth";

pub fn bob() -> Address {
    Address::from_low_u64_be(1)
}

pub fn alice() -> Address {
    Address::from_low_u64_be(2)
}

pub fn sender() -> Address {
    Address::repeat_byte(0x5e)
}

pub fn usdc() -> Address {
    Address::repeat_byte(0x10)
}

pub fn punks() -> Address {
    Address::repeat_byte(0x20)
}

/// 小写十六进制（不触发 EIP-55 校验）
pub fn hex_address(address: Address) -> String {
    format!("{:?}", address)
}

/// 由两个确定私钥构造的真实元地址
pub fn meta_address_bytes() -> Vec<u8> {
    let spending = SecretKey::from_slice(&[0x11; 32]).unwrap().public_key();
    let viewing = SecretKey::from_slice(&[0x22; 32]).unwrap().public_key();
    let mut bytes = spending.to_encoded_point(true).as_bytes().to_vec();
    bytes.extend_from_slice(viewing.to_encoded_point(true).as_bytes());
    bytes
}

#[derive(Debug, Clone, Default)]
pub struct FakeToken {
    pub symbol: Option<&'static str>,
    pub name: Option<&'static str>,
    pub decimals: Option<u8>,
}

/// 内存链：注册表、代币元数据、授权额度
#[derive(Default)]
pub struct FakeChain {
    pub registry: Mutex<HashMap<Address, Vec<u8>>>,
    pub tokens: Mutex<HashMap<Address, FakeToken>>,
    pub allowance: Mutex<U256>,
    pub approved_operator: Mutex<Address>,
    /// 按 owner 阻塞注册表读取，直到 `release`
    pub registry_gates: Mutex<HashMap<Address, Arc<Notify>>>,
    /// 被阻塞的注册表读取已开始
    pub registry_started: Notify,
    pub registry_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub approval_calls: AtomicUsize,
}

impl FakeChain {
    pub fn with_registered(owners: &[Address]) -> Arc<Self> {
        let chain = Self::default();
        {
            let mut registry = chain.registry.lock().unwrap();
            for owner in owners {
                registry.insert(*owner, meta_address_bytes());
            }
        }
        chain.add_token(
            usdc(),
            FakeToken {
                symbol: Some("USDC"),
                name: Some("USD Coin"),
                decimals: Some(6),
            },
        );
        chain.add_token(
            punks(),
            FakeToken {
                symbol: Some("PUNK"),
                name: Some("CryptoPunks"),
                decimals: None,
            },
        );
        Arc::new(chain)
    }

    pub fn add_token(&self, address: Address, token: FakeToken) {
        self.tokens.lock().unwrap().insert(address, token);
    }

    pub fn set_allowance(&self, amount: u64) {
        *self.allowance.lock().unwrap() = U256::from(amount);
    }

    pub fn hold(&self, owner: Address) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.registry_gates
            .lock()
            .unwrap()
            .insert(owner, gate.clone());
        gate
    }

    pub fn registry_calls(&self) -> usize {
        self.registry_calls.load(Ordering::SeqCst)
    }

    pub fn approval_calls(&self) -> usize {
        self.approval_calls.load(Ordering::SeqCst)
    }

    fn token(&self, address: Address) -> FakeToken {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_default()
    }
}

fn reverted() -> StealthError {
    StealthError::rpc("execution reverted")
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn stealth_meta_address_of(
        &self,
        _network: NetworkPrefix,
        owner: Address,
        _scheme_id: u64,
    ) -> Result<Vec<u8>> {
        self.registry_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.registry_gates.lock().unwrap().get(&owner).cloned();
        if let Some(gate) = gate {
            self.registry_started.notify_one();
            gate.notified().await;
        }

        Ok(self
            .registry
            .lock()
            .unwrap()
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn symbol(&self, _: NetworkPrefix, token: Address) -> Result<String> {
        self.token(token)
            .symbol
            .map(str::to_string)
            .ok_or_else(reverted)
    }

    async fn name(&self, _: NetworkPrefix, token: Address) -> Result<String> {
        self.token(token)
            .name
            .map(str::to_string)
            .ok_or_else(reverted)
    }

    async fn decimals(&self, _: NetworkPrefix, token: Address) -> Result<u8> {
        self.token(token).decimals.ok_or_else(reverted)
    }

    async fn allowance(
        &self,
        _: NetworkPrefix,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256> {
        self.approval_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.allowance.lock().unwrap())
    }

    async fn get_approved(&self, _: NetworkPrefix, _token: Address, _id: U256) -> Result<Address> {
        self.approval_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.approved_operator.lock().unwrap())
    }
}

/// 固定名称表
#[derive(Default)]
pub struct FakeNames {
    pub names: HashMap<String, Address>,
    pub calls: AtomicUsize,
    /// 每次解析的耗时
    pub delay: Duration,
}

impl FakeNames {
    pub fn standard() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let mut names = HashMap::new();
        names.insert("bob.eth".to_string(), bob());
        names.insert("alice.eth".to_string(), alice());
        Arc::new(Self {
            names,
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for FakeNames {
    async fn resolve(&self, _network: NetworkPrefix, name: &str) -> Result<Option<Address>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.names.get(name).copied())
    }
}

/// 记录所有发送的调用
pub struct FakeWallet {
    pub address: Address,
    pub chain_id: u64,
    pub simulation_error: Mutex<Option<String>>,
    pub receipt_success: Mutex<bool>,
    /// 设置后回执等待到 `notify` 为止
    pub receipt_gate: Mutex<Option<Arc<Notify>>>,
    pub sent: Mutex<Vec<ContractCall>>,
}

impl FakeWallet {
    pub fn on_chain(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            address: sender(),
            chain_id,
            simulation_error: Mutex::new(None),
            receipt_success: Mutex::new(true),
            receipt_gate: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn mainnet() -> Arc<Self> {
        Self::on_chain(1)
    }

    pub fn sent(&self) -> Vec<ContractCall> {
        self.sent.lock().unwrap().clone()
    }

    pub fn hold_receipts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.receipt_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn simulate(&self, _call: &ContractCall) -> Result<()> {
        match self.simulation_error.lock().unwrap().clone() {
            Some(message) => Err(StealthError::rpc(message)),
            None => Ok(()),
        }
    }

    async fn send(&self, call: &ContractCall) -> Result<H256> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(call.clone());
        Ok(H256::from_low_u64_be(sent.len() as u64))
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxOutcome> {
        let gate = self.receipt_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(TxOutcome {
            tx_hash,
            success: *self.receipt_success.lock().unwrap(),
            block_number: Some(19_000_000),
        })
    }
}

/// 确定性派生器
pub struct FixedGenerator;

pub fn fixed_stealth_address() -> Address {
    Address::repeat_byte(0x5a)
}

impl StealthAddressGenerator for FixedGenerator {
    fn generate(&self, _meta: &StealthMetaAddress) -> Result<GeneratedStealthAddress> {
        Ok(GeneratedStealthAddress {
            stealth_address: fixed_stealth_address(),
            ephemeral_public_key: Bytes::from(vec![0x02; 33]),
            view_tag: 0xab,
        })
    }
}

pub fn session(chain: Arc<FakeChain>) -> TransferSession {
    session_with(chain, Arc::new(FixedGenerator))
}

pub fn session_with(
    chain: Arc<FakeChain>,
    generator: Arc<dyn StealthAddressGenerator>,
) -> TransferSession {
    TransferSession::new(
        PipelineConfig::immediate(),
        chain,
        FakeNames::standard(),
        generator,
    )
}

/// 带防抖的会话（毫秒）
pub fn debounced_session(
    chain: Arc<FakeChain>,
    names: Arc<FakeNames>,
    meta_debounce_ms: u64,
    amount_debounce_ms: u64,
) -> TransferSession {
    TransferSession::new(
        PipelineConfig {
            meta_lookup_debounce_ms: meta_debounce_ms,
            amount_debounce_ms,
            ..PipelineConfig::immediate()
        },
        chain,
        names,
        Arc::new(FixedGenerator),
    )
}
