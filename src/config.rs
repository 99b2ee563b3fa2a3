//! Connection configuration and statement cache sizing
//!
//! Provides the knobs for balancing cache memory against prepare cost.

use crate::{Result, StmtError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 打开模式（Open Mode）
///
/// 决定底层数据库文件以何种方式打开：
/// - ReadWrite: 读写，文件不存在时自动创建
/// - ReadOnly: 只读，文件必须已存在
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OpenMode {
    /// 读写模式（默认）
    #[default]
    ReadWrite,

    /// 只读模式：任何写语句都会在 step 时返回引擎错误
    ReadOnly,
}

impl OpenMode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    /// 获取人类可读的描述
    pub fn description(&self) -> &'static str {
        match self {
            Self::ReadWrite => "读写（自动创建）",
            Self::ReadOnly => "只读",
        }
    }
}

/// 语句缓存配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementCacheConfig {
    /// 缓存槽位数量（0 = 不缓存，所有语句用完即 finalize）
    ///
    /// Each slot holds one compiled statement:
    /// - 100 slots (default) covers the working set of most applications
    /// - 0 turns the cache into a pass-through
    pub capacity: usize,

    /// 可缓存的 SQL 文本最大长度（字节）
    ///
    /// Longer texts are still executed, just never kept in a slot.
    pub max_sql_len: usize,
}

impl Default for StatementCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_sql_len: 16 * 1024, // 16KB
        }
    }
}

/// 连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// 语句缓存配置
    pub cache: StatementCacheConfig,

    /// 忙等待超时（毫秒），超时后 step 返回 Busy
    ///
    /// - 0 = fail immediately when another connection holds a conflicting lock
    /// - 5000 (default) = retry for up to 5 seconds
    pub busy_timeout_ms: u64,

    /// 打开模式
    pub open_mode: OpenMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cache: StatementCacheConfig::default(),
            busy_timeout_ms: 5_000,
            open_mode: OpenMode::default(),
        }
    }
}

impl ConnectionConfig {
    /// 创建不缓存语句的配置（每次都重新 prepare）
    pub fn no_cache() -> Self {
        Self {
            cache: StatementCacheConfig {
                capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// 创建大缓存配置（大量不同语句的场景）
    pub fn large_cache() -> Self {
        Self {
            cache: StatementCacheConfig {
                capacity: 1024,
                max_sql_len: 64 * 1024,
            },
            ..Default::default()
        }
    }

    /// 创建指定缓存容量的配置
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: StatementCacheConfig {
                capacity,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// 创建只读配置
    pub fn read_only() -> Self {
        Self {
            open_mode: OpenMode::ReadOnly,
            ..Default::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity > 0 && self.cache.max_sql_len == 0 {
            return Err(StmtError::Config(
                "cache.max_sql_len must be positive when the cache is enabled".to_string(),
            ));
        }
        if i32::try_from(self.busy_timeout_ms).is_err() {
            return Err(StmtError::Config(format!(
                "busy_timeout_ms {} is out of range",
                self.busy_timeout_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_presets() {
        let default = ConnectionConfig::default();
        assert_eq!(default.cache.capacity, 100);
        assert!(!default.open_mode.is_read_only());

        let no_cache = ConnectionConfig::no_cache();
        assert_eq!(no_cache.cache.capacity, 0);

        let large = ConnectionConfig::large_cache();
        assert!(large.cache.capacity > default.cache.capacity);

        assert!(ConnectionConfig::read_only().open_mode.is_read_only());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ConnectionConfig::from_json_str(r#"{"cache": {"capacity": 7}}"#).unwrap();
        assert_eq!(config.cache.capacity, 7);
        assert_eq!(config.cache.max_sql_len, 16 * 1024);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ConnectionConfig::from_json_str(
            r#"{"cache": {"capacity": 4, "max_sql_len": 0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StmtError::Config(_)));

        let err = ConnectionConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, StmtError::Serialization(_)));
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conn.json");
        std::fs::write(&path, r#"{"busy_timeout_ms": 0, "open_mode": "ReadOnly"}"#).unwrap();

        let config = ConnectionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.busy_timeout_ms, 0);
        assert!(config.open_mode.is_read_only());
    }
}
