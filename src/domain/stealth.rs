//! 隐身地址领域模型
//!
//! - `StealthMetaAddress`：注册表中发布的元地址（spending pubkey || viewing pubkey）
//! - `GeneratedStealthAddress`：一次性地址 + 临时公钥 + view tag
//! - `StealthTransferIntent`：提交给隐身转账合约的完整载荷
//! - `StealthAddressGenerator`：派生算法（外部协作方），默认实现为 ERC-5564 scheme 1

use ethers::types::{Address, Bytes, U256};
use k256::{
    ecdh::diffie_hellman,
    elliptic_curve::{ops::Reduce, sec1::ToEncodedPoint},
    FieldBytes, ProjectivePoint, PublicKey, Scalar, SecretKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use super::{
    address_reference::META_ADDRESS_LEN,
    chain_config::{NetworkPrefix, SCHEME_ID},
    token::TokenDescriptor,
};
use crate::{
    error::{Result, StealthError},
    utils::hex_utils,
};

/// 压缩公钥长度
const COMPRESSED_KEY_LEN: usize = 33;

/// 已注册的隐身元地址（66 字节）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StealthMetaAddress(Vec<u8>);

impl StealthMetaAddress {
    /// 解析注册表返回值
    ///
    /// - 空字节串或全零：未注册（`Ok(None)`）
    /// - 恰好 66 字节：已注册
    /// - 其他形态：查询错误
    pub fn from_registry_bytes(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.iter().all(|b| *b == 0) {
            return Ok(None);
        }
        if bytes.len() != META_ADDRESS_LEN {
            return Err(StealthError::LookupFailed(format!(
                "unexpected meta-address length {} (expected {})",
                bytes.len(),
                META_ADDRESS_LEN
            )));
        }
        Ok(Some(Self(bytes.to_vec())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn spending_key(&self) -> &[u8] {
        &self.0[..COMPRESSED_KEY_LEN]
    }

    pub fn viewing_key(&self) -> &[u8] {
        &self.0[COMPRESSED_KEY_LEN..]
    }

    /// `st:<prefix>:0x...`
    pub fn to_uri(&self, network: NetworkPrefix) -> String {
        format!("st:{}:{}", network, hex_utils::encode(&self.0))
    }
}

/// 派生结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStealthAddress {
    pub stealth_address: Address,
    /// 压缩格式（33 字节）
    pub ephemeral_public_key: Bytes,
    pub view_tag: u8,
}

/// 隐身地址派生（外部协作方）
pub trait StealthAddressGenerator: Send + Sync {
    fn generate(&self, meta: &StealthMetaAddress) -> Result<GeneratedStealthAddress>;
}

/// ERC-5564 scheme 1：secp256k1 + view tag
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1StealthGenerator;

impl Secp256k1StealthGenerator {
    /// 指定临时私钥派生（确定性，便于校验）
    pub fn generate_with_ephemeral(
        &self,
        meta: &StealthMetaAddress,
        ephemeral: &SecretKey,
    ) -> Result<GeneratedStealthAddress> {
        let spending = parse_public_key(meta.spending_key(), "spending")?;
        let viewing = parse_public_key(meta.viewing_key(), "viewing")?;

        // s_h = keccak256(x(ephemeral * P_view))
        let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), viewing.as_affine());
        let hashed = Keccak256::digest(shared.raw_secret_bytes());
        let view_tag = hashed[0];

        let secret_scalar = hash_to_scalar(&hashed);

        // P_stealth = P_spend + G * s_h
        let stealth_point = spending.to_projective() + ProjectivePoint::GENERATOR * secret_scalar;
        let stealth_key = PublicKey::from_affine(stealth_point.to_affine()).map_err(|_| {
            StealthError::Transfer("derived stealth public key is invalid".to_string())
        })?;

        let ephemeral_public_key = ephemeral.public_key().to_encoded_point(true);

        Ok(GeneratedStealthAddress {
            stealth_address: public_key_to_address(&stealth_key),
            ephemeral_public_key: Bytes::from(ephemeral_public_key.as_bytes().to_vec()),
            view_tag,
        })
    }
}

/// 32 字节哈希按曲线阶 n 取模得到标量
fn hash_to_scalar(hashed: &[u8]) -> Scalar {
    let repr = FieldBytes::clone_from_slice(hashed);
    <Scalar as Reduce<k256::U256>>::reduce_bytes(&repr)
}

impl StealthAddressGenerator for Secp256k1StealthGenerator {
    fn generate(&self, meta: &StealthMetaAddress) -> Result<GeneratedStealthAddress> {
        let ephemeral = SecretKey::random(&mut OsRng);
        self.generate_with_ephemeral(meta, &ephemeral)
    }
}

fn parse_public_key(bytes: &[u8], which: &str) -> Result<PublicKey> {
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| StealthError::invalid_meta_address(format!("Invalid {} public key", which)))
}

/// 以太坊地址 = keccak256(未压缩公钥去掉 0x04)[12..]
pub fn public_key_to_address(key: &PublicKey) -> Address {
    let uncompressed = key.to_encoded_point(false);
    let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// 隐身转账载荷（每次提交构造一次）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthTransferIntent {
    pub scheme_id: U256,
    pub stealth_address: Address,
    pub ephemeral_public_key: Bytes,
    pub view_tag: u8,
    pub tokens: Vec<Address>,
    pub values: Vec<U256>,
    pub extra_metadata: Bytes,
    /// 随交易发送的原生币数量
    pub value: U256,
}

impl StealthTransferIntent {
    /// 原生资产走 `msg.value`，代币走 tokens/values 数组
    pub fn new(
        generated: GeneratedStealthAddress,
        token: &TokenDescriptor,
        amount: U256,
    ) -> Result<Self> {
        let (tokens, values, value) = if token.is_native() {
            (Vec::new(), Vec::new(), amount)
        } else {
            let address = token.address.ok_or_else(|| {
                StealthError::Transfer("token descriptor has no contract address".to_string())
            })?;
            (vec![address], vec![amount], U256::zero())
        };

        Ok(Self {
            scheme_id: U256::from(SCHEME_ID),
            stealth_address: generated.stealth_address,
            ephemeral_public_key: generated.ephemeral_public_key,
            view_tag: generated.view_tag,
            tokens,
            values,
            extra_metadata: Bytes::default(),
            value,
        })
    }
}
