//! 十六进制字符串工具
//! 提供 `0x` 前缀处理

/// 去掉 `0x` / `0X` 前缀
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// 补齐 `0x` 前缀
pub fn with_0x(s: &str) -> String {
    format!("0x{}", strip_0x(s))
}

/// 解码十六进制（前缀可选）
pub fn decode(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(strip_0x(s))
}

/// 编码为 `0x` 开头的小写十六进制
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}
