//! 链访问边界
//!
//! - `ChainReader`：只读合约调用（注册表、代币元数据、授权查询）
//! - `NameResolver`：ENS 名称解析
//! - `WalletProvider`：已连接钱包（地址、链 ID、模拟、签名广播、等待回执）
//!
//! 生产实现基于 ethers-rs `Provider<Http>`；测试注入内存实现。

use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider, ProviderError},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, H256, U256,
        U64,
    },
};
use tracing::{debug, info, warn};

use super::abi;
use crate::{
    config::PipelineConfig,
    domain::chain_config::{self, NetworkPrefix, NetworkResolver},
    error::{Result, StealthError},
    metrics,
};

/// 待发送的合约调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
    /// 随交易发送的原生币
    pub value: U256,
}

impl ContractCall {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            value: U256::zero(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// 交易回执摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: H256,
    /// 回执 status == 1
    pub success: bool,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// 注册表原始返回（未注册时为空字节串）
    async fn stealth_meta_address_of(
        &self,
        network: NetworkPrefix,
        owner: Address,
        scheme_id: u64,
    ) -> Result<Vec<u8>>;

    async fn symbol(&self, network: NetworkPrefix, token: Address) -> Result<String>;

    async fn name(&self, network: NetworkPrefix, token: Address) -> Result<String>;

    async fn decimals(&self, network: NetworkPrefix, token: Address) -> Result<u8>;

    async fn allowance(
        &self,
        network: NetworkPrefix,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256>;

    async fn get_approved(
        &self,
        network: NetworkPrefix,
        token: Address,
        token_id: U256,
    ) -> Result<Address>;
}

#[async_trait]
pub trait NameResolver: Send + Sync {
    /// 未注册/无解析器时返回 `Ok(None)`
    async fn resolve(&self, network: NetworkPrefix, name: &str) -> Result<Option<Address>>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn address(&self) -> Address;

    async fn chain_id(&self) -> Result<u64>;

    /// eth_call 模拟，revert 时返回错误
    async fn simulate(&self, call: &ContractCall) -> Result<()>;

    /// 签名并广播，返回交易哈希
    async fn send(&self, call: &ContractCall) -> Result<H256>;

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxOutcome>;
}

fn build_provider(rpc_url: &str, config: &PipelineConfig) -> Result<Provider<Http>> {
    let url = reqwest::Url::parse(rpc_url)
        .map_err(|e| StealthError::Config(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

    let client = reqwest::Client::builder()
        .timeout(config.rpc_timeout())
        .connect_timeout(config.rpc_timeout().min(std::time::Duration::from_secs(10)))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    Ok(Provider::new(Http::new_with_client(url, client)))
}

fn call_tx(to: Address, data: Bytes) -> TypedTransaction {
    TransactionRequest::new().to(to).data(data).into()
}

/// 基于 ethers-rs 的只读客户端（每个网络一个 provider）
#[derive(Debug, Clone)]
pub struct EthersChainReader {
    providers: HashMap<NetworkPrefix, Arc<Provider<Http>>>,
}

impl EthersChainReader {
    pub fn new(resolver: &NetworkResolver, config: &PipelineConfig) -> Result<Self> {
        let mut providers = HashMap::new();
        for prefix in NetworkPrefix::ALL {
            let network = resolver.resolve(prefix);
            debug!(network = %prefix, rpc = %network.rpc_url, "provider configured");
            providers.insert(prefix, Arc::new(build_provider(&network.rpc_url, config)?));
        }
        Ok(Self { providers })
    }

    pub fn provider(&self, network: NetworkPrefix) -> Result<Arc<Provider<Http>>> {
        self.providers
            .get(&network)
            .cloned()
            .ok_or_else(|| StealthError::UnsupportedNetwork(network.to_string()))
    }

    async fn eth_call(
        &self,
        method: &'static str,
        network: NetworkPrefix,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes> {
        let provider = self.provider(network)?;
        let started = Instant::now();
        let result = provider.call(&call_tx(to, data), None).await;
        let elapsed = started.elapsed().as_millis();
        metrics::observe_rpc_read(method, elapsed, result.is_ok());

        result.map_err(|e| {
            debug!(method, network = %network, contract = ?to, error = %e, "eth_call failed");
            StealthError::rpc(e)
        })
    }
}

#[async_trait]
impl ChainReader for EthersChainReader {
    async fn stealth_meta_address_of(
        &self,
        network: NetworkPrefix,
        owner: Address,
        scheme_id: u64,
    ) -> Result<Vec<u8>> {
        let registry = chain_config::chain(network).registry_address;
        let raw = self
            .eth_call(
                "stealthMetaAddressOf",
                network,
                registry,
                abi::stealth_meta_address_of(owner, scheme_id),
            )
            .await?;
        abi::decode_bytes(&raw)
    }

    async fn symbol(&self, network: NetworkPrefix, token: Address) -> Result<String> {
        let raw = self.eth_call("symbol", network, token, abi::symbol()).await?;
        abi::decode_string(&raw)
    }

    async fn name(&self, network: NetworkPrefix, token: Address) -> Result<String> {
        let raw = self.eth_call("name", network, token, abi::name()).await?;
        abi::decode_string(&raw)
    }

    async fn decimals(&self, network: NetworkPrefix, token: Address) -> Result<u8> {
        let raw = self
            .eth_call("decimals", network, token, abi::decimals())
            .await?;
        abi::decode_uint8(&raw)
    }

    async fn allowance(
        &self,
        network: NetworkPrefix,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256> {
        let raw = self
            .eth_call("allowance", network, token, abi::allowance(owner, spender))
            .await?;
        abi::decode_uint256(&raw)
    }

    async fn get_approved(
        &self,
        network: NetworkPrefix,
        token: Address,
        token_id: U256,
    ) -> Result<Address> {
        let raw = self
            .eth_call("getApproved", network, token, abi::get_approved(token_id))
            .await?;
        abi::decode_address(&raw)
    }
}

/// ENS 解析（ethers 内置 ENS 注册表）
#[derive(Debug, Clone)]
pub struct EnsNameResolver {
    reader: EthersChainReader,
}

impl EnsNameResolver {
    pub fn new(reader: EthersChainReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl NameResolver for EnsNameResolver {
    async fn resolve(&self, network: NetworkPrefix, name: &str) -> Result<Option<Address>> {
        let provider = self.reader.provider(network)?;
        match provider.resolve_name(name).await {
            Ok(address) if address.is_zero() => Ok(None),
            Ok(address) => Ok(Some(address)),
            Err(ProviderError::EnsError(reason)) | Err(ProviderError::EnsNotOwned(reason)) => {
                debug!(name, network = %network, reason = %reason, "name not resolved");
                Ok(None)
            }
            Err(e) => Err(StealthError::rpc(e)),
        }
    }
}

/// 本地私钥钱包（签名密钥管理不在本 crate 范围内，只从环境变量读取）
#[derive(Debug)]
pub struct LocalKeyWallet {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    confirmations: usize,
}

impl LocalKeyWallet {
    /// 连接到给定 RPC，链 ID 从节点读取
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let provider = build_provider(rpc_url, config)?;
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|_| StealthError::Config("Invalid wallet private key".to_string()))?;

        let client = SignerMiddleware::new_with_provider_chain(provider, wallet)
            .await
            .map_err(StealthError::rpc)?;

        info!(
            address = ?client.address(),
            chain_id = client.signer().chain_id(),
            "wallet connected"
        );

        Ok(Self {
            client,
            confirmations: config.confirmations.max(1),
        })
    }

    fn tx(&self, call: &ContractCall) -> TypedTransaction {
        TransactionRequest::new()
            .from(self.client.address())
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .into()
    }
}

#[async_trait]
impl WalletProvider for LocalKeyWallet {
    fn address(&self) -> Address {
        self.client.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(StealthError::rpc)?;
        Ok(id.as_u64())
    }

    async fn simulate(&self, call: &ContractCall) -> Result<()> {
        self.client
            .call(&self.tx(call), None)
            .await
            .map(|_| ())
            .map_err(StealthError::rpc)
    }

    async fn send(&self, call: &ContractCall) -> Result<H256> {
        let pending = self
            .client
            .send_transaction(self.tx(call), None)
            .await
            .map_err(StealthError::rpc)?;
        Ok(*pending)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxOutcome> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .confirmations(self.confirmations)
            .await
            .map_err(StealthError::rpc)?;

        let Some(receipt) = receipt else {
            warn!(tx_hash = ?tx_hash, "transaction dropped from mempool");
            return Err(StealthError::rpc("transaction dropped before confirmation"));
        };

        Ok(TxOutcome {
            tx_hash,
            success: receipt.status == Some(U64::from(1)),
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }
}
