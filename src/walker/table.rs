//! 静态模块表
//!
//! 以路径后缀为键的导入表。既可以在运行时手动登记，
//! 也可以从编译期通过 `inventory::submit!` 收集的 [`ModuleDescriptor`] 构建。

use super::resolver::{Module, ModuleResolver};
use crate::{PieceError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 编译期模块描述符
///
/// ```ignore
/// inventory::submit! {
///     piecework::ModuleDescriptor { file: "commands/ping.rs", exports: ping_exports }
/// }
/// ```
pub struct ModuleDescriptor {
    /// 文件路径后缀，通常是 `file!()`
    pub file: &'static str,
    /// 生成导出列表
    pub exports: fn() -> Module,
}

inventory::collect!(ModuleDescriptor);

/// 静态导入表
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    entries: Vec<(PathBuf, Module)>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从所有已提交的描述符构建
    pub fn from_inventory() -> Self {
        let mut table = Self::new();
        for descriptor in inventory::iter::<ModuleDescriptor> {
            table.insert(descriptor.file, (descriptor.exports)());
        }
        debug!("Collected {} module descriptors", table.len());
        table
    }

    /// 登记模块，相同的键会被替换
    pub fn insert(&mut self, file: impl Into<PathBuf>, module: Module) -> &mut Self {
        let file = file.into();
        match self.entries.iter_mut().find(|(key, _)| *key == file) {
            Some(entry) => entry.1 = module,
            None => self.entries.push((file, module)),
        }
        self
    }

    /// 构建器风格的登记
    pub fn with_module(mut self, file: impl Into<PathBuf>, module: Module) -> Self {
        self.insert(file, module);
        self
    }

    /// 查找与路径匹配的模块，多个键匹配时取最长的后缀
    pub fn lookup(&self, path: &Path) -> Option<&Module> {
        self.entries
            .iter()
            .filter(|(key, _)| path.ends_with(key))
            .max_by_key(|(key, _)| key.components().count())
            .map(|(_, module)| module)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ModuleResolver for ModuleTable {
    async fn resolve(&self, path: &Path) -> Result<Module> {
        self.lookup(path)
            .cloned()
            .ok_or_else(|| PieceError::resolve(path, "no module registered for this file"))
    }
}
