//! Piece 实体模型
//!
//! 定义可被 Store 加载的扩展单元：身份、启用状态、所属注册表引用和构造选项

use crate::{PieceError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// 注册表句柄 - 指向所属 Store 的非拥有引用
///
/// 只保存 Store 的标识和名称，Piece 不会因此延长 Store 的生命周期。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreHandle {
    /// Store 唯一标识
    pub id: Uuid,
    /// Store 名称
    pub name: String,
}

impl StoreHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Piece 构造选项
///
/// 由 [`Store::construct`](crate::Store::construct) 合并生成，原样保存在 Piece 中以便检查和序列化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceOptions {
    /// Piece 名称，在所属 Store 中唯一
    pub name: String,
    /// 来源文件的绝对路径
    pub path: PathBuf,
    /// 是否启用
    pub enabled: bool,
    /// 所属 Store
    pub store: StoreHandle,
    /// 调用方提供的其他字段
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl PieceOptions {
    /// 读取额外字段并反序列化，字段不存在时返回 `None`
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.extra.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| PieceError::construct(&self.name, &format!("option '{}': {}", key, e))),
            None => Ok(None),
        }
    }
}

/// Piece 公共状态
///
/// 具体 Piece 类型内嵌该结构，并通过 [`Piece::base`] 暴露给 Store。
/// 启用标志与 Store 共享，Store 读取状态时不需要锁住 Piece。
#[derive(Debug)]
pub struct PieceBase {
    name: String,
    path: PathBuf,
    enabled: Arc<AtomicBool>,
    options: PieceOptions,
}

impl PieceBase {
    pub fn new(options: PieceOptions) -> Self {
        Self {
            name: options.name.clone(),
            path: options.path.clone(),
            enabled: Arc::new(AtomicBool::new(options.enabled)),
            options,
        }
    }

    /// 与 Store 共享的启用标志
    pub(crate) fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }
}

/// Piece 对外的 JSON 视图，不包含完整选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceSummary {
    pub name: String,
    pub path: PathBuf,
    pub enabled: bool,
}

/// 注册表观察到的 Piece 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceStatus {
    /// 已注册且启用
    Enabled,
    /// 已注册但被停用
    Disabled,
}

/// 核心 Piece 特征 - 所有可加载扩展的基础契约
///
/// 生命周期钩子只由所属 Store 调用，默认实现为空操作。
#[async_trait]
pub trait Piece: Send + Sync {
    /// 公共状态
    fn base(&self) -> &PieceBase;

    /// 可变公共状态
    fn base_mut(&mut self) -> &mut PieceBase;

    /// 注册钩子，可在其中停用自身
    async fn register(&mut self) -> Result<()> {
        Ok(())
    }

    /// 注销钩子
    async fn deregister(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn path(&self) -> &Path {
        &self.base().path
    }

    fn enabled(&self) -> bool {
        self.base().enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.base_mut().enabled.store(enabled, Ordering::Release);
    }

    /// 构造时的完整选项
    fn options(&self) -> &PieceOptions {
        &self.base().options
    }

    /// 所属 Store
    fn store(&self) -> &StoreHandle {
        &self.base().options.store
    }

    fn status(&self) -> PieceStatus {
        if self.enabled() {
            PieceStatus::Enabled
        } else {
            PieceStatus::Disabled
        }
    }

    fn summary(&self) -> PieceSummary {
        PieceSummary {
            name: self.name().to_string(),
            path: self.path().to_path_buf(),
            enabled: self.enabled(),
        }
    }

    /// 可安全记录日志或序列化的 `{name, path, enabled}` 视图
    fn to_json(&self) -> Value {
        serde_json::json!({
            "name": self.name(),
            "path": self.path(),
            "enabled": self.enabled(),
        })
    }
}
