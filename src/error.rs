//! Piecework 错误处理系统
//!
//! 统一的错误类型和错误处理机制

use std::path::{Path, PathBuf};
use thiserror::Error;

/// 框架统一错误类型
#[derive(Error, Debug)]
pub enum PieceError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Module resolution error for {}: {message}", .path.display())]
    Resolve { path: PathBuf, message: String },

    #[error("Failed to construct piece '{name}': {message}")]
    Construct { name: String, message: String },

    #[error("Lifecycle hook `{hook}` failed for piece '{name}': {message}")]
    Hook {
        name: String,
        hook: &'static str,
        message: String,
    },

    #[error("Invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PieceError {
    /// 创建文件系统错误
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// 创建模块解析错误
    pub fn resolve(path: impl AsRef<Path>, message: &str) -> Self {
        Self::Resolve {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// 创建构造错误
    pub fn construct(name: &str, message: &str) -> Self {
        Self::Construct {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    /// 创建生命周期钩子错误
    pub fn hook(name: &str, hook: &'static str, message: &str) -> Self {
        Self::Hook {
            name: name.to_string(),
            hook,
            message: message.to_string(),
        }
    }

    /// 创建配置相关错误
    pub fn config(message: &str) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    /// 是否为文件系统错误
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PieceError>;
