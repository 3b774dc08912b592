//! 模块解析接口
//!
//! 把一个文件解析为按声明顺序排列的具名导出。导出值是类型擦除的，
//! 由 Walker 按基础契约向下转换来判断是否为可用的 Piece 构造器。

use crate::piece::PieceOptions;
use crate::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Piece 构造器 - 基础契约 `T` 的工厂函数
pub struct Constructor<T: ?Sized> {
    build: Arc<dyn Fn(PieceOptions) -> Result<Box<T>> + Send + Sync>,
}

impl<T: ?Sized + 'static> Constructor<T> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(PieceOptions) -> Result<Box<T>> + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
        }
    }

    /// 调用工厂函数
    pub fn build(&self, options: PieceOptions) -> Result<Box<T>> {
        (self.build)(options)
    }
}

impl<T: ?Sized> Clone for Constructor<T> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("contract", &std::any::type_name::<T>())
            .finish()
    }
}

/// 模块中的一个具名导出
#[derive(Clone)]
pub struct Export {
    name: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl Export {
    /// 任意导出值（辅助函数、常量等）
    pub fn new<V>(name: impl Into<String>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            value: Arc::new(value),
        }
    }

    /// 导出一个 Piece 构造器
    pub fn constructor<T: ?Sized + 'static>(name: impl Into<String>, constructor: Constructor<T>) -> Self {
        Self::new(name, constructor)
    }

    /// 以新名称共享同一导出值
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Arc::clone(&self.value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按具体类型取出导出值
    pub fn downcast<V: Any>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export").field("name", &self.name).finish()
    }
}

/// 已解析的模块
#[derive(Debug, Clone, Default)]
pub struct Module {
    exports: Vec<Export>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加导出（构建器风格）
    pub fn with_export(mut self, export: Export) -> Self {
        self.exports.push(export);
        self
    }

    pub fn push(&mut self, export: Export) {
        self.exports.push(export);
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl IntoIterator for Module {
    type Item = Export;
    type IntoIter = std::vec::IntoIter<Export>;

    fn into_iter(self) -> Self::IntoIter {
        self.exports.into_iter()
    }
}

impl FromIterator<Export> for Module {
    fn from_iter<I: IntoIterator<Item = Export>>(iter: I) -> Self {
        Self {
            exports: iter.into_iter().collect(),
        }
    }
}

/// 模块解析器 - "把文件解析为具名导出"的能力
///
/// 可以是静态导入表、编译期描述符注册表或读取清单文件的解析器。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// 解析文件，导出按声明顺序返回
    async fn resolve(&self, path: &Path) -> Result<Module>;
}
