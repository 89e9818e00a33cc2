//! 网络配置模块
//!
//! 网络前缀（`eth:` / `sep:`）是封闭枚举，未识别的前缀在解析阶段就被拒绝，
//! 不会到达网络层。每个网络对应一条静态链配置及默认 RPC 端点。

use std::{collections::HashMap, fmt, str::FromStr};

use ethers::types::Address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{
    config::NetworkConfig,
    error::{Result, StealthError},
};

/// ERC-6538 注册表地址（主网与 Sepolia 相同）
pub const REGISTRY_ADDRESS: &str = "0x6538E6bf4B0eBd30A8Ea093027Ac2422ce5d6538";

/// ERC-5564 scheme id（secp256k1 + view tag）
pub const SCHEME_ID: u64 = 1;

pub const DEFAULT_RPC_URL_MAINNET: &str = "https://eth.llamarpc.com";
pub const DEFAULT_RPC_URL_SEPOLIA: &str = "https://ethereum-sepolia-rpc.publicnode.com";

/// 网络前缀
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPrefix {
    /// Ethereum Mainnet
    Eth,
    /// Ethereum Sepolia Testnet
    Sep,
}

impl NetworkPrefix {
    pub const ALL: [NetworkPrefix; 2] = [NetworkPrefix::Eth, NetworkPrefix::Sep];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkPrefix::Eth => "eth",
            NetworkPrefix::Sep => "sep",
        }
    }

    /// 识别前缀标签（大小写敏感，与输入格式保持一致）
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "eth" => Some(NetworkPrefix::Eth),
            "sep" => Some(NetworkPrefix::Sep),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkPrefix {
    type Err = StealthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(s).ok_or_else(|| StealthError::UnsupportedNetwork(s.to_string()))
    }
}

/// 链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub prefix: NetworkPrefix,
    /// EIP-155 链 ID
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub native_name: String,
    /// 链自带的公共 RPC 端点（无覆盖配置时使用）
    pub default_rpc_url: String,
    pub registry_address: Address,
    /// 隐身转账合约（同时也是授权的 spender）
    pub stealth_contract: Address,
    pub is_testnet: bool,
}

/// 解析后的网络：链配置 + 实际使用的 RPC 端点
#[derive(Debug, Clone)]
pub struct ResolvedNetwork {
    pub chain: ChainConfig,
    pub rpc_url: String,
}

static CHAIN_TABLE: Lazy<HashMap<NetworkPrefix, ChainConfig>> = Lazy::new(|| {
    let chains = vec![
        ChainConfig {
            prefix: NetworkPrefix::Eth,
            chain_id: 1,
            name: "Ethereum".to_string(),
            native_symbol: "ETH".to_string(),
            native_name: "Ether".to_string(),
            default_rpc_url: DEFAULT_RPC_URL_MAINNET.to_string(),
            registry_address: addr(REGISTRY_ADDRESS),
            stealth_contract: addr("0x2f259C4ceB80E1383384BF7704F694Fb6f638dDC"),
            is_testnet: false,
        },
        ChainConfig {
            prefix: NetworkPrefix::Sep,
            chain_id: 11155111,
            name: "Sepolia".to_string(),
            native_symbol: "ETH".to_string(),
            native_name: "Ether".to_string(),
            default_rpc_url: DEFAULT_RPC_URL_SEPOLIA.to_string(),
            registry_address: addr(REGISTRY_ADDRESS),
            stealth_contract: addr("0x36d1fe257d1283aebBF7747e749B13258CC43c0b"),
            is_testnet: true,
        },
    ];

    chains.into_iter().map(|c| (c.prefix, c)).collect()
});

fn addr(s: &str) -> Address {
    s.parse::<Address>().expect("valid address literal")
}

/// 静态链配置（表覆盖了枚举的全部取值）
pub fn chain(prefix: NetworkPrefix) -> &'static ChainConfig {
    &CHAIN_TABLE[&prefix]
}

/// 网络解析器：前缀 → 链配置 + RPC 端点
#[derive(Debug, Clone, Default)]
pub struct NetworkResolver {
    overrides: NetworkConfig,
}

impl NetworkResolver {
    pub fn new(overrides: NetworkConfig) -> Self {
        Self { overrides }
    }

    pub fn chain(&self, prefix: NetworkPrefix) -> &'static ChainConfig {
        chain(prefix)
    }

    /// 解析网络；有覆盖配置时优先使用覆盖的 RPC
    pub fn resolve(&self, prefix: NetworkPrefix) -> ResolvedNetwork {
        let chain = self.chain(prefix).clone();
        let rpc_url = self
            .overrides
            .rpc_override(prefix)
            .map(str::to_string)
            .unwrap_or_else(|| chain.default_rpc_url.clone());

        ResolvedNetwork { chain, rpc_url }
    }

    /// 按原始标签解析（调用方应已完成输入校验）
    pub fn resolve_tag(&self, tag: &str) -> Result<ResolvedNetwork> {
        let prefix = tag.parse::<NetworkPrefix>()?;
        Ok(self.resolve(prefix))
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&'static ChainConfig> {
        CHAIN_TABLE.values().find(|c| c.chain_id == chain_id)
    }
}
