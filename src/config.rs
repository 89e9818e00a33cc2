//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::chain_config::NetworkPrefix;

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub networks: NetworkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 网络 RPC 覆盖配置（未配置时使用链自带的公共端点）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub ethereum_rpc_url: Option<String>,
    pub sepolia_rpc_url: Option<String>,
}

/// 管线时序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 元地址查询防抖（毫秒）
    pub meta_lookup_debounce_ms: u64,
    /// 代币查询防抖（毫秒）
    pub token_lookup_debounce_ms: u64,
    /// 金额规范化防抖（毫秒）
    pub amount_debounce_ms: u64,
    pub rpc_timeout_secs: u64,
    /// 回执确认数
    pub confirmations: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl NetworkConfig {
    pub fn rpc_override(&self, prefix: NetworkPrefix) -> Option<&str> {
        let url = match prefix {
            NetworkPrefix::Eth => self.ethereum_rpc_url.as_deref(),
            NetworkPrefix::Sep => self.sepolia_rpc_url.as_deref(),
        };
        url.filter(|u| !u.trim().is_empty())
    }
}

impl PipelineConfig {
    pub fn meta_lookup_debounce(&self) -> Duration {
        Duration::from_millis(self.meta_lookup_debounce_ms)
    }

    pub fn token_lookup_debounce(&self) -> Duration {
        Duration::from_millis(self.token_lookup_debounce_ms)
    }

    pub fn amount_debounce(&self) -> Duration {
        Duration::from_millis(self.amount_debounce_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// 无防抖配置（测试和一次性 CLI 调用使用）
    pub fn immediate() -> Self {
        Self {
            meta_lookup_debounce_ms: 0,
            token_lookup_debounce_ms: 0,
            amount_debounce_ms: 0,
            ..Self::default()
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ethereum_rpc_url: std::env::var("ETHEREUM_RPC_URL").ok(),
            sepolia_rpc_url: std::env::var("SEPOLIA_RPC_URL").ok(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            meta_lookup_debounce_ms: env_u64("META_LOOKUP_DEBOUNCE_MS", 500),
            token_lookup_debounce_ms: env_u64("TOKEN_LOOKUP_DEBOUNCE_MS", 300),
            amount_debounce_ms: env_u64("AMOUNT_DEBOUNCE_MS", 300),
            rpc_timeout_secs: env_u64("RPC_TIMEOUT_SECS", 30),
            confirmations: env_u64("CONFIRMATIONS", 1) as usize,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            networks: NetworkConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从TOML配置文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for url in [
            self.networks.ethereum_rpc_url.as_deref(),
            self.networks.sepolia_rpc_url.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|u| !u.trim().is_empty())
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("RPC URL must start with http:// or https://: {}", url);
            }
        }

        if self.pipeline.rpc_timeout_secs == 0 {
            anyhow::bail!("RPC_TIMEOUT_SECS must be greater than 0");
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
