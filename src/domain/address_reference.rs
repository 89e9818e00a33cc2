//! 地址输入解析
//!
//! 纯函数，无 I/O：把 `<prefix>:<target>` 形式的原始输入解析成 `AddressReference`。
//! `target` 可以是 EVM 地址，也可以是 ENS 名称（包含 `.eth` 且长度大于 5）。

use serde::{Deserialize, Serialize};

use super::chain_config::NetworkPrefix;
use crate::utils::{address_validator::AddressValidator, hex_utils};

/// ENS 名称后缀标记
const NAME_SUFFIX_MARKER: &str = ".eth";
/// 名称最小长度（不含）
const MIN_NAME_LEN: usize = 5;
/// 隐身元地址长度：spending pubkey(33) + viewing pubkey(33)
pub const META_ADDRESS_LEN: usize = 66;

/// 解析后的地址引用（每次输入变化都重新派生，不持久化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressReference {
    pub network_prefix: Option<NetworkPrefix>,
    /// 去掉前缀后的目标（地址或名称）；无前缀匹配时为原始输入
    pub identifier: String,
    pub is_valid: bool,
    pub is_name: bool,
}

impl AddressReference {
    /// 解析 `<prefix>:<target>`
    pub fn parse(input: &str) -> Self {
        let Some((prefix, target)) = split_prefix(input) else {
            return Self::invalid(input);
        };

        let is_address = AddressValidator::is_valid(target);
        let is_name =
            !is_address && target.contains(NAME_SUFFIX_MARKER) && target.len() > MIN_NAME_LEN;

        Self {
            network_prefix: Some(prefix),
            identifier: target.to_string(),
            is_valid: is_address || is_name,
            is_name,
        }
    }

    /// 解析代币输入：没有网络前缀时继承收款人的前缀
    pub fn parse_with_default(input: &str, default_prefix: NetworkPrefix) -> Self {
        if split_prefix(input).is_some() {
            Self::parse(input)
        } else {
            Self::parse(&format!("{}:{}", default_prefix, input))
        }
    }

    fn invalid(input: &str) -> Self {
        Self {
            network_prefix: None,
            identifier: input.to_string(),
            is_valid: false,
            is_name: false,
        }
    }

    /// 有效且带已识别前缀
    pub fn is_usable(&self) -> bool {
        self.is_valid && self.network_prefix.is_some()
    }

    /// 去重用的规范化键（前缀 + 小写目标）
    pub fn normalized_key(&self) -> String {
        match self.network_prefix {
            Some(prefix) => format!("{}:{}", prefix, self.identifier.to_lowercase()),
            None => self.identifier.to_lowercase(),
        }
    }
}

fn split_prefix(input: &str) -> Option<(NetworkPrefix, &str)> {
    let (tag, rest) = input.split_once(':')?;
    let prefix = NetworkPrefix::from_tag(tag)?;
    Some((prefix, rest))
}

/// 注册用的隐身元地址输入：`st:<prefix>:<hex>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaAddressInput {
    pub network_prefix: Option<NetworkPrefix>,
    /// 规范化为 `0x` 开头的十六进制
    pub meta_address_hex: String,
    pub is_valid: bool,
}

impl MetaAddressInput {
    pub fn parse(input: &str) -> Self {
        let parsed = input
            .strip_prefix("st:")
            .and_then(split_prefix)
            .filter(|(_, hex)| !hex.is_empty());

        let Some((prefix, raw_hex)) = parsed else {
            return Self {
                network_prefix: None,
                meta_address_hex: input.to_string(),
                is_valid: false,
            };
        };

        let hex_string = hex_utils::with_0x(raw_hex);
        let is_valid = hex_utils::decode(&hex_string)
            .map(|bytes| bytes.len() == META_ADDRESS_LEN)
            .unwrap_or(false);

        Self {
            network_prefix: Some(prefix),
            meta_address_hex: hex_string,
            is_valid,
        }
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        if !self.is_valid {
            return None;
        }
        hex_utils::decode(&self.meta_address_hex).ok()
    }
}
