//! 地址验证模块
//!
//! `0x` + 40 位十六进制；大小写混合时按 EIP-55 校验 checksum

use ethers::{types::Address, utils::to_checksum};

const ADDRESS_HEX_LEN: usize = 40;

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_some()
    }

    /// 校验并解析为 `Address`
    ///
    /// 全小写/全大写只校验格式
    pub fn parse(input: &str) -> Option<Address> {
        let hex_part = input.strip_prefix("0x")?;
        if hex_part.len() != ADDRESS_HEX_LEN || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let address = input.parse::<Address>().ok()?;

        let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
            && hex_part.chars().any(|c| c.is_ascii_lowercase());
        if mixed_case && to_checksum(&address, None) != input {
            return None;
        }

        Some(address)
    }
}
