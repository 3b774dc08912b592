//! Piecework 配置管理系统
//!
//! 支持 YAML / TOML 配置文件驱动的 Store 加载

use crate::store::LoadContext;
use crate::walker::{NameFilter, DEFAULT_EXCLUDE, DEFAULT_INCLUDE};
use crate::{PieceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// 运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 发现器配置
    #[serde(default)]
    pub walker: WalkerConfig,
    /// Store 配置
    #[serde(default)]
    pub stores: Vec<StoreSettings>,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 发现器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// 可加载文件名的匹配模式
    #[serde(default = "default_include")]
    pub include: String,
    /// 排除的文件名模式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    /// 相对路径的解析基准，缺省为可执行文件所在目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

fn default_include() -> String {
    DEFAULT_INCLUDE.to_string()
}

impl WalkerConfig {
    /// 编译文件名过滤器
    pub fn filter(&self) -> Result<NameFilter> {
        NameFilter::new(&self.include, self.exclude.as_deref())
    }
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Some(DEFAULT_EXCLUDE.to_string()),
            root: None,
        }
    }
}

/// 单个 Store 的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Store 名称
    pub name: String,
    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 需要加载的路径
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// 合并进每个 Piece 的上下文
    #[serde(default)]
    pub context: LoadContext,
}

fn default_true() -> bool {
    true
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default)]
    pub level: LogLevel,
    /// 是否输出目标模块和文件位置
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            verbose: false,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            stores: vec![StoreSettings {
                name: "commands".to_string(),
                enabled: true,
                paths: vec![PathBuf::from("commands")],
                context: LoadContext::default(),
            }],
            logging: LoggingConfig::default(),
        }
    }
}

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(PieceError::config(&format!(
                "Unsupported config file extension: {}",
                path.display()
            ))),
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: RuntimeConfig,
}

impl ConfigManager {
    /// 从文件加载配置，格式由扩展名决定
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PieceError::config(&format!("Failed to read config file: {}", e)))?;

        let config: RuntimeConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| PieceError::config(&format!("Failed to parse config file: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| PieceError::config(&format!("Failed to parse config file: {}", e)))?,
        };

        Ok(Self { config })
    }

    /// 创建默认配置
    pub fn new_default() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    pub fn from_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// 保存配置到文件
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Yaml => serde_yaml::to_string(&self.config)
                .map_err(|e| PieceError::config(&format!("Failed to serialize config: {}", e)))?,
            ConfigFormat::Toml => toml::to_string_pretty(&self.config)
                .map_err(|e| PieceError::config(&format!("Failed to serialize config: {}", e)))?,
        };

        tokio::fs::write(path, content)
            .await
            .map_err(|e| PieceError::config(&format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// 获取配置
    pub fn get_config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 获取可变配置
    pub fn get_config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    /// 获取启用的 Store
    pub fn enabled_stores(&self) -> Vec<&StoreSettings> {
        self.config.stores.iter().filter(|s| s.enabled).collect()
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        self.config.walker.filter()?;

        let mut names = HashSet::new();
        for store in &self.config.stores {
            if store.name.trim().is_empty() {
                return Err(PieceError::config("Store name cannot be empty"));
            }
            if !names.insert(store.name.as_str()) {
                return Err(PieceError::config(&format!("Duplicate store name '{}'", store.name)));
            }
            if store.enabled && store.paths.is_empty() {
                return Err(PieceError::config(&format!(
                    "Store '{}' is enabled but has no paths",
                    store.name
                )));
            }
        }

        tracing::info!("Configuration validation passed");
        Ok(())
    }
}

/// 生成默认配置文件
pub async fn generate_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let config_manager = ConfigManager::new_default();
    config_manager.save_to_file(path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_manager_default() {
        let config_manager = ConfigManager::new_default();
        let config = config_manager.get_config();

        assert_eq!(config.walker.include, DEFAULT_INCLUDE);
        assert_eq!(config.stores.len(), 1);
        assert_eq!(config.logging.level, LogLevel::Info);

        assert!(config_manager.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_save_and_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("piecework.yaml");

        generate_default_config_file(&path).await.unwrap();
        let loaded = ConfigManager::load_from_file(&path).await.unwrap();

        assert_eq!(loaded.get_config().stores[0].name, "commands");
        assert!(loaded.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_save_and_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("piecework.toml");

        let mut manager = ConfigManager::new_default();
        manager.get_config_mut().stores[0].context = LoadContext::default()
            .with_enabled(false)
            .with_option("prefix", "!");
        manager.save_to_file(&path).await.unwrap();

        let loaded = ConfigManager::load_from_file(&path).await.unwrap();
        let context = &loaded.get_config().stores[0].context;
        assert_eq!(context.enabled, Some(false));
        assert_eq!(context.extra["prefix"], "!");
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [[stores]]
            name = "events"
            paths = ["events"]
            "#,
        )
        .unwrap();

        assert_eq!(config.walker.include, DEFAULT_INCLUDE);
        assert!(config.stores[0].enabled);
        assert_eq!(config.stores[0].context, LoadContext::default());
        assert_eq!(ConfigManager::from_config(config).enabled_stores().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let result = ConfigManager::load_from_file("piecework.ini").await;
        assert!(matches!(result, Err(PieceError::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut manager = ConfigManager::new_default();
        manager.get_config_mut().walker.include = "(".to_string();
        assert!(matches!(manager.validate(), Err(PieceError::Filter(_))));

        let mut manager = ConfigManager::new_default();
        let duplicate = manager.get_config().stores[0].clone();
        manager.get_config_mut().stores.push(duplicate);
        assert!(manager.validate().is_err());

        let mut manager = ConfigManager::new_default();
        manager.get_config_mut().stores[0].paths.clear();
        assert!(manager.validate().is_err());

        manager.get_config_mut().stores[0].enabled = false;
        assert!(manager.validate().is_ok());
        assert!(manager.enabled_stores().is_empty());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
        let level: LogLevel = serde_yaml::from_str("debug").unwrap();
        assert_eq!(level, LogLevel::Debug);
    }
}
