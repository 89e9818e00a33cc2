//! 合约 ABI 编解码
//!
//! 注册表（ERC-6538）、ERC-20、ERC-721 与隐身转账合约用到的函数选择器、
//! calldata 编码以及 `eth_call` 返回值解码。

use ethers::{
    abi::{decode, encode, ParamType, Token},
    types::{Address, Bytes, U256},
};

use crate::{
    domain::stealth::StealthTransferIntent,
    error::{Result, StealthError},
};

pub const SIG_STEALTH_META_ADDRESS_OF: &str = "stealthMetaAddressOf(address,uint256)";
pub const SIG_REGISTER_KEYS: &str = "registerKeys(uint256,bytes)";
pub const SIG_SYMBOL: &str = "symbol()";
pub const SIG_NAME: &str = "name()";
pub const SIG_DECIMALS: &str = "decimals()";
pub const SIG_ALLOWANCE: &str = "allowance(address,address)";
/// ERC-20 与 ERC-721 共用同一签名（第二个参数分别为数量 / token id）
pub const SIG_APPROVE: &str = "approve(address,uint256)";
pub const SIG_GET_APPROVED: &str = "getApproved(uint256)";
pub const SIG_STEALTH_TRANSFER: &str =
    "stealthTransfer((uint256,address,bytes,uint8,address[],uint256[],bytes))";

pub fn selector(sig: &str) -> [u8; 4] {
    let hash = ethers::utils::keccak256(sig.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_call(sig: &str, args: Vec<Token>) -> Bytes {
    let mut out = Vec::with_capacity(4 + 32 * args.len());
    out.extend_from_slice(&selector(sig));
    out.extend_from_slice(&encode(&args));
    Bytes::from(out)
}

// ---------- calldata ----------

pub fn stealth_meta_address_of(owner: Address, scheme_id: u64) -> Bytes {
    encode_call(
        SIG_STEALTH_META_ADDRESS_OF,
        vec![Token::Address(owner), Token::Uint(U256::from(scheme_id))],
    )
}

pub fn register_keys(scheme_id: u64, meta_address: &[u8]) -> Bytes {
    encode_call(
        SIG_REGISTER_KEYS,
        vec![
            Token::Uint(U256::from(scheme_id)),
            Token::Bytes(meta_address.to_vec()),
        ],
    )
}

pub fn symbol() -> Bytes {
    encode_call(SIG_SYMBOL, vec![])
}

pub fn name() -> Bytes {
    encode_call(SIG_NAME, vec![])
}

pub fn decimals() -> Bytes {
    encode_call(SIG_DECIMALS, vec![])
}

pub fn allowance(owner: Address, spender: Address) -> Bytes {
    encode_call(
        SIG_ALLOWANCE,
        vec![Token::Address(owner), Token::Address(spender)],
    )
}

pub fn approve(spender: Address, amount_or_token_id: U256) -> Bytes {
    encode_call(
        SIG_APPROVE,
        vec![Token::Address(spender), Token::Uint(amount_or_token_id)],
    )
}

pub fn get_approved(token_id: U256) -> Bytes {
    encode_call(SIG_GET_APPROVED, vec![Token::Uint(token_id)])
}

pub fn stealth_transfer(intent: &StealthTransferIntent) -> Bytes {
    let transfer = Token::Tuple(vec![
        Token::Uint(intent.scheme_id),
        Token::Address(intent.stealth_address),
        Token::Bytes(intent.ephemeral_public_key.to_vec()),
        Token::Uint(U256::from(intent.view_tag)),
        Token::Array(intent.tokens.iter().copied().map(Token::Address).collect()),
        Token::Array(intent.values.iter().copied().map(Token::Uint).collect()),
        Token::Bytes(intent.extra_metadata.to_vec()),
    ]);
    encode_call(SIG_STEALTH_TRANSFER, vec![transfer])
}

// ---------- 返回值解码 ----------

fn decode_single(kind: ParamType, data: &[u8]) -> Result<Token> {
    decode(&[kind], data)
        .map_err(|e| StealthError::rpc(format!("Invalid eth_call ABI result: {}", e)))?
        .into_iter()
        .next()
        .ok_or_else(|| StealthError::rpc("Empty eth_call ABI result"))
}

pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    decode_single(ParamType::Bytes, data)?
        .into_bytes()
        .ok_or_else(|| StealthError::rpc("Expected bytes in eth_call result"))
}

/// 解码 string；兼容早期代币返回 bytes32 的情况
pub fn decode_string(data: &[u8]) -> Result<String> {
    if let Ok(token) = decode_single(ParamType::String, data) {
        if let Some(s) = token.into_string() {
            return Ok(s);
        }
    }

    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(32);
        if let Ok(s) = std::str::from_utf8(&data[..end]) {
            if !s.is_empty() {
                return Ok(s.to_string());
            }
        }
    }

    Err(StealthError::rpc("Expected string in eth_call result"))
}

pub fn decode_uint256(data: &[u8]) -> Result<U256> {
    decode_single(ParamType::Uint(256), data)?
        .into_uint()
        .ok_or_else(|| StealthError::rpc("Expected uint256 in eth_call result"))
}

pub fn decode_uint8(data: &[u8]) -> Result<u8> {
    let value = decode_single(ParamType::Uint(8), data)?
        .into_uint()
        .ok_or_else(|| StealthError::rpc("Expected uint8 in eth_call result"))?;
    if value > U256::from(u8::MAX) {
        return Err(StealthError::rpc("uint8 result out of range"));
    }
    Ok(value.as_u32() as u8)
}

pub fn decode_address(data: &[u8]) -> Result<Address> {
    decode_single(ParamType::Address, data)?
        .into_address()
        .ok_or_else(|| StealthError::rpc("Expected address in eth_call result"))
}
