//! 金额规范化
//!
//! 把用户输入的十进制字符串转换为链上整数单位：
//! - 同质化代币/原生资产：定点缩放 `10^decimals`
//! - NFT：输入即 token id，必须为非负整数
//!
//! 校验失败时规范化值为空，返回描述性错误，不会 panic。

use ethers::{
    types::U256,
    utils::{parse_units, ParseUnits},
};

use super::token::TokenDescriptor;
use crate::error::{Result, StealthError};

/// 金额输入 + 派生的整数值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmountValue {
    pub raw: String,
    /// 校验失败或输入为空时为 None
    pub value: Option<U256>,
    pub error: Option<StealthError>,
}

impl AmountValue {
    pub fn empty() -> Self {
        Self {
            raw: String::new(),
            value: None,
            error: None,
        }
    }

    /// 针对选定资产求值
    pub fn evaluate(raw: &str, token: &TokenDescriptor) -> Self {
        if raw.is_empty() {
            return Self::empty();
        }

        match AmountNormalizer::normalize(raw, token) {
            Ok(value) => Self {
                raw: raw.to_string(),
                value: Some(value),
                error: None,
            },
            Err(err) => Self {
                raw: raw.to_string(),
                value: None,
                error: Some(err),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// U256 能完整表示的十进制位数
const MAX_UINT_DIGITS: usize = 77;

pub struct AmountNormalizer;

impl AmountNormalizer {
    pub fn normalize(raw: &str, token: &TokenDescriptor) -> Result<U256> {
        if token.is_nft() {
            Self::normalize_token_id(raw)
        } else {
            Self::normalize_units(raw, token.decimals)
        }
    }

    /// NFT token id
    pub fn normalize_token_id(raw: &str) -> Result<U256> {
        Self::check_charset(raw)?;
        if raw.contains('.') {
            return Err(StealthError::invalid_amount("Token ID must be an integer"));
        }
        U256::from_dec_str(raw).map_err(|_| invalid_format())
    }

    /// 定点缩放
    pub fn normalize_units(raw: &str, decimals: u8) -> Result<U256> {
        Self::check_charset(raw)?;

        let (int_part, frac_part) = match raw.split_once('.') {
            Some((i, f)) => (i, f),
            None => (raw, ""),
        };

        if frac_part.contains('.') || (int_part.is_empty() && frac_part.is_empty()) {
            return Err(invalid_format());
        }

        if frac_part.len() > decimals as usize {
            return Err(StealthError::invalid_amount(format!(
                "Maximum {} decimal places allowed",
                decimals
            )));
        }

        // 缩放后超过 77 位十进制数的值放不进 U256
        let significant = int_part.trim_start_matches('0').len();
        if significant + decimals as usize > MAX_UINT_DIGITS {
            return Err(invalid_format());
        }

        match parse_units(raw, u32::from(decimals)) {
            Ok(ParseUnits::U256(value)) => Ok(value),
            Ok(ParseUnits::I256(_)) | Err(_) => Err(invalid_format()),
        }
    }

    fn check_charset(raw: &str) -> Result<()> {
        if raw.is_empty() {
            return Err(invalid_format());
        }
        if !raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(StealthError::invalid_amount(
                "Only numbers and decimal points allowed",
            ));
        }
        Ok(())
    }
}

fn invalid_format() -> StealthError {
    StealthError::invalid_amount("Invalid number format")
}
