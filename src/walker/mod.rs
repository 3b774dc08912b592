//! Piece 发现器
//!
//! 遍历目录找出候选文件，再通过 [`ModuleResolver`] 把文件解析为导出，
//! 只保留实现了 Store 基础契约的构造器。

pub mod filter;
pub mod manifest;
pub mod resolver;
pub mod table;

pub use filter::*;
pub use manifest::*;
pub use resolver::*;
pub use table::*;

use crate::config::WalkerConfig;
use crate::piece::Piece;
use crate::store::Store;
use crate::{PieceError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use once_cell::sync::Lazy;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 应用根目录：当前可执行文件所在目录，取不到时退回当前工作目录
static APPLICATION_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let root = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from(std::path::MAIN_SEPARATOR_STR));
    normalize(&root)
});

/// 文件发现器
#[derive(Clone)]
pub struct Walker {
    /// 文件名过滤器
    filter: NameFilter,
    /// 模块解析器
    resolver: Arc<dyn ModuleResolver>,
    /// 相对路径的解析基准
    root: PathBuf,
}

impl Walker {
    /// 使用默认过滤器和应用根目录创建
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            filter: NameFilter::default(),
            resolver,
            root: APPLICATION_ROOT.clone(),
        }
    }

    /// 从配置创建
    pub fn from_config(config: &WalkerConfig, resolver: Arc<dyn ModuleResolver>) -> Result<Self> {
        let mut walker = Self::new(resolver).with_filter(config.filter()?);
        if let Some(root) = &config.root {
            walker = walker.with_root(root);
        }
        Ok(walker)
    }

    pub fn with_filter(mut self, filter: NameFilter) -> Self {
        self.filter = filter;
        self
    }

    /// 设置解析基准；相对路径以当前工作目录为准转为绝对路径
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.root = if root.is_absolute() {
            normalize(&root)
        } else {
            match std::env::current_dir() {
                Ok(cwd) => normalize(&cwd.join(&root)),
                Err(e) => {
                    warn!("Cannot read current directory for root {:?}: {}", root, e);
                    APPLICATION_ROOT.join(&root)
                }
            }
        };
        self
    }

    pub fn filter(&self) -> &NameFilter {
        &self.filter
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把可能是相对的路径解析为基于应用根目录的规范化绝对路径，不做存在性检查
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        normalize(&self.root.join(path))
    }

    /// 惰性遍历路径下所有匹配过滤器的文件
    ///
    /// 目录按文件名排序后深度优先展开；单个文件只在匹配时产出。
    /// 遇到文件系统错误时产出该错误并结束。每次调用都重新遍历。
    pub fn walk(&self, path: impl AsRef<Path>) -> BoxStream<'static, Result<PathBuf>> {
        let state = WalkState {
            pending: vec![path.as_ref().to_path_buf()],
            filter: self.filter.clone(),
        };

        stream::unfold(state, |mut state| async move {
            while let Some(path) = state.pending.pop() {
                let metadata = match tokio::fs::metadata(&path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        state.pending.clear();
                        return Some((Err(PieceError::io(&path, e)), state));
                    }
                };

                if metadata.is_dir() {
                    match read_dir_sorted(&path).await {
                        Ok(entries) => state.pending.extend(entries.into_iter().rev()),
                        Err(e) => {
                            state.pending.clear();
                            return Some((Err(e), state));
                        }
                    }
                } else if state.filter.matches(&file_name(&path)) {
                    return Some((Ok(path), state));
                } else {
                    trace!("Skipping {:?}", path);
                }
            }
            None
        })
        .boxed()
    }

    /// 解析文件并产出实现了 Store 基础契约的构造器，保持导出声明顺序
    pub async fn load<T>(&self, store: &Store<T>, file: &Path) -> Result<Candidates<T>>
    where
        T: Piece + ?Sized + 'static,
    {
        let module = self.resolver.resolve(file).await?;
        debug!(
            "Resolved {:?} for store '{}': {} exports",
            file,
            store.name(),
            module.len()
        );

        Ok(Candidates {
            exports: module.into_iter(),
            _contract: PhantomData,
        })
    }
}

impl fmt::Debug for Walker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walker")
            .field("filter", &self.filter)
            .field("root", &self.root)
            .finish()
    }
}

struct WalkState {
    /// 待访问路径栈，栈顶为下一个
    pending: Vec<PathBuf>,
    filter: NameFilter,
}

async fn read_dir_sorted(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| PieceError::io(path, e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| PieceError::io(path, e))? {
        paths.push(entry.path());
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// 按词法消去 `.` 和 `..`，不访问文件系统
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// 文件的基本名称
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// 通过契约检查的导出
pub struct Candidate<T: ?Sized> {
    /// 导出名称
    pub export: String,
    pub constructor: Constructor<T>,
}

impl<T: ?Sized> Clone for Candidate<T> {
    fn clone(&self) -> Self {
        Self {
            export: self.export.clone(),
            constructor: self.constructor.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Candidate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("export", &self.export)
            .field("constructor", &self.constructor)
            .finish()
    }
}

/// 候选构造器的惰性迭代器，跳过不实现基础契约的导出
pub struct Candidates<T: ?Sized> {
    exports: std::vec::IntoIter<Export>,
    _contract: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + 'static> Iterator for Candidates<T> {
    type Item = Candidate<T>;

    fn next(&mut self) -> Option<Self::Item> {
        for export in self.exports.by_ref() {
            match export.downcast::<Constructor<T>>() {
                Some(constructor) => {
                    return Some(Candidate {
                        export: export.name().to_string(),
                        constructor: constructor.clone(),
                    })
                }
                None => trace!("Export '{}' does not implement the store contract", export.name()),
            }
        }
        None
    }
}
