//! 代币描述
//!
//! 原生资产、同质化代币（ERC-20）与非同质化代币（ERC-721）三类。
//! 原生资产由哨兵值/别名识别，不发起任何链上调用。

use std::collections::HashMap;

use ethers::types::Address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::chain_config::{ChainConfig, NetworkPrefix};

/// 原生资产哨兵值
pub const NATIVE_TOKEN_SENTINEL: &str = "NATIVE";

/// 原生资产的约定地址（仅用于展示）
pub const NATIVE_TOKEN_ADDRESS: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// 元数据探测失败时的占位符
pub const UNKNOWN_METADATA: &str = "-";

/// 原生资产别名（不区分大小写）
const NATIVE_ALIASES: [&str; 3] = ["native", "eth", "ether"];

/// 原生资产固定精度
pub const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Native,
    Fungible,
    NonFungible,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Native => "native",
            TokenKind::Fungible => "erc20",
            TokenKind::NonFungible => "erc721",
        }
    }
}

/// 代币描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub network: NetworkPrefix,
    /// 合约地址；原生资产为 None
    pub address: Option<Address>,
    pub kind: TokenKind,
    pub symbol: String,
    pub name: String,
    /// NFT 固定为 0
    pub decimals: u8,
}

impl TokenDescriptor {
    pub fn native(chain: &ChainConfig) -> Self {
        Self {
            network: chain.prefix,
            address: None,
            kind: TokenKind::Native,
            symbol: chain.native_symbol.clone(),
            name: chain.native_name.clone(),
            decimals: NATIVE_DECIMALS,
        }
    }

    pub fn fungible(
        network: NetworkPrefix,
        address: Address,
        symbol: Option<String>,
        name: Option<String>,
        decimals: u8,
    ) -> Self {
        Self {
            network,
            address: Some(address),
            kind: TokenKind::Fungible,
            symbol: symbol.unwrap_or_else(|| UNKNOWN_METADATA.to_string()),
            name: name.unwrap_or_else(|| UNKNOWN_METADATA.to_string()),
            decimals,
        }
    }

    pub fn non_fungible(
        network: NetworkPrefix,
        address: Address,
        symbol: Option<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            network,
            address: Some(address),
            kind: TokenKind::NonFungible,
            symbol: symbol.unwrap_or_else(|| UNKNOWN_METADATA.to_string()),
            name: name.unwrap_or_else(|| UNKNOWN_METADATA.to_string()),
            decimals: 0,
        }
    }

    pub fn is_native(&self) -> bool {
        self.kind == TokenKind::Native
    }

    pub fn is_nft(&self) -> bool {
        self.kind == TokenKind::NonFungible
    }

    /// 展示用标签，例如 `USDC (USD Coin)`
    pub fn label(&self) -> String {
        format!("{} ({})", self.symbol, self.name)
    }
}

/// 输入是否表示原生资产
pub fn is_native_input(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed == NATIVE_TOKEN_SENTINEL
        || NATIVE_ALIASES
            .iter()
            .any(|alias| trimmed.eq_ignore_ascii_case(alias))
}

/// 常用代币（CLI 快捷选择）
#[derive(Debug, Clone, Serialize)]
pub struct CommonToken {
    pub symbol: &'static str,
    pub name: &'static str,
    /// None 表示原生资产
    pub address: Option<&'static str>,
    pub decimals: u8,
}

impl CommonToken {
    /// 作为代币输入时使用的字符串
    pub fn input_value(&self) -> &'static str {
        self.address.unwrap_or(NATIVE_TOKEN_SENTINEL)
    }
}

static COMMON_TOKENS: Lazy<HashMap<NetworkPrefix, Vec<CommonToken>>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert(
        NetworkPrefix::Eth,
        vec![
            CommonToken {
                symbol: "ETH",
                name: "Ether",
                address: None,
                decimals: 18,
            },
            CommonToken {
                symbol: "USDC",
                name: "USD Coin",
                address: Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                decimals: 6,
            },
            CommonToken {
                symbol: "USDT",
                name: "Tether USD",
                address: Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
                decimals: 6,
            },
            CommonToken {
                symbol: "DAI",
                name: "Dai Stablecoin",
                address: Some("0x6B175474E89094C44Da98b954EedeAC495271d0F"),
                decimals: 18,
            },
            CommonToken {
                symbol: "WETH",
                name: "Wrapped Ether",
                address: Some("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
                decimals: 18,
            },
            CommonToken {
                symbol: "WBTC",
                name: "Wrapped BTC",
                address: Some("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
                decimals: 8,
            },
        ],
    );

    map.insert(
        NetworkPrefix::Sep,
        vec![
            CommonToken {
                symbol: "ETH",
                name: "Sepolia Ether",
                address: None,
                decimals: 18,
            },
            CommonToken {
                symbol: "USDC",
                name: "USD Coin (Test)",
                address: Some("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
                decimals: 6,
            },
            CommonToken {
                symbol: "DAI",
                name: "Dai Stablecoin (Test)",
                address: Some("0x68194a729C2450ad26072b3D33ADaCbcef39D574"),
                decimals: 18,
            },
        ],
    );

    map
});

pub fn common_tokens(network: NetworkPrefix) -> &'static [CommonToken] {
    COMMON_TOKENS
        .get(&network)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
