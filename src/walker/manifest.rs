//! 清单文件解析器
//!
//! 文件内容是一份 TOML 或 JSON 清单，声明该文件导出的条目；
//! 每个条目的 `kind` 对应解析器目录中预先登记的导出值。
//!
//! ```toml
//! [[export]]
//! name = "Ping"
//! kind = "ping"
//! ```

use super::resolver::{Export, Module, ModuleResolver};
use crate::{PieceError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// 清单文件内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// 按声明顺序排列的导出
    #[serde(default, rename = "export")]
    pub exports: Vec<ManifestEntry>,
}

/// 清单中的一个导出条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 导出名称
    pub name: String,
    /// 目录中的类型标识
    pub kind: String,
}

impl Manifest {
    /// 按扩展名解析：`.json` 使用 JSON，其余使用 TOML
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if is_json {
            serde_json::from_str(content)
                .map_err(|e| PieceError::resolve(path, &format!("malformed manifest: {}", e)))
        } else {
            toml::from_str(content)
                .map_err(|e| PieceError::resolve(path, &format!("malformed manifest: {}", e)))
        }
    }
}

/// 读取清单文件的模块解析器
#[derive(Debug, Clone, Default)]
pub struct ManifestResolver {
    catalog: HashMap<String, Export>,
}

impl ManifestResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个类型标识及其导出值
    pub fn register<V>(&mut self, kind: impl Into<String>, value: V) -> &mut Self
    where
        V: Any + Send + Sync,
    {
        let kind = kind.into();
        self.catalog.insert(kind.clone(), Export::new(kind, value));
        self
    }

    /// 构建器风格的登记
    pub fn with_kind<V>(mut self, kind: impl Into<String>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        self.register(kind, value);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    /// 把清单条目映射为导出
    pub fn link(&self, path: &Path, manifest: Manifest) -> Result<Module> {
        manifest
            .exports
            .into_iter()
            .map(|entry| {
                self.catalog
                    .get(&entry.kind)
                    .map(|export| export.renamed(entry.name.clone()))
                    .ok_or_else(|| {
                        PieceError::resolve(path, &format!("unknown kind `{}` for export '{}'", entry.kind, entry.name))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl ModuleResolver for ManifestResolver {
    async fn resolve(&self, path: &Path) -> Result<Module> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PieceError::io(path, e))?;

        let manifest = Manifest::parse(path, &content)?;
        debug!("Parsed manifest {:?} with {} exports", path, manifest.exports.len());
        self.link(path, manifest)
    }
}
