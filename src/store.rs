//! Piece 注册表
//!
//! Store 以名称为键持有 Piece，拥有一个 Walker，并负责
//! 发现 → 构造 → 注册 的完整流程以及注册/注销的状态转换。

use crate::piece::{Piece, PieceOptions, PieceStatus, PieceSummary, StoreHandle};
use crate::walker::{file_name, Constructor, Walker};
use crate::Result;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 共享的 Piece 实例，生命周期钩子执行期间持有锁
pub type SharedPiece<T> = Arc<Mutex<Box<T>>>;

/// 上下文中不可由调用方覆盖的保留字段
pub const RESERVED_KEYS: [&str; 4] = ["name", "path", "enabled", "store"];

/// 一次 `load` 调用的上下文，合并进该次构造的所有 Piece
///
/// 合并优先级：先取由文件推导的默认值，再由上下文覆盖 `name` 和 `enabled`；
/// `path` 和 `store` 始终由 Store 决定。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadContext {
    /// 覆盖由文件名推导的名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 覆盖默认的启用状态
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// 交给 Piece 的其他字段
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// 去掉 `extra` 中的保留字段，每个被丢弃的字段记录一次警告
    pub fn without_reserved(mut self) -> Self {
        for key in RESERVED_KEYS {
            if self.extra.remove(key).is_some() {
                warn!("Ignoring reserved context key '{}'", key);
            }
        }
        self
    }

    /// 合并文件推导的默认值，得到单个 Piece 的构造上下文
    pub fn for_file(&self, derived_name: String, path: PathBuf) -> PieceContext {
        let mut extra = self.extra.clone();
        extra.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));

        PieceContext {
            name: self.name.clone().unwrap_or(derived_name),
            path,
            enabled: self.enabled,
            extra,
        }
    }
}

/// 单个 Piece 的构造上下文
#[derive(Debug, Clone, PartialEq)]
pub struct PieceContext {
    pub name: String,
    pub path: PathBuf,
    /// 缺省为启用
    pub enabled: Option<bool>,
    pub extra: Map<String, Value>,
}

impl PieceContext {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            enabled: None,
            extra: Map::new(),
        }
    }
}

/// 注册表条目
///
/// 启用标志与 Piece 共享，列表和状态查询不等待 Piece 的锁。
struct Entry<T: ?Sized> {
    piece: SharedPiece<T>,
    path: PathBuf,
    enabled: Arc<AtomicBool>,
}

impl<T: ?Sized> Entry<T> {
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Piece 注册表
///
/// `T` 是基础契约，通常是 `dyn Trait` 形式的特征对象。
pub struct Store<T: Piece + ?Sized> {
    /// 对外的非拥有句柄
    handle: StoreHandle,
    /// 发现器，可由外部注入共享
    walker: Arc<Walker>,
    /// 名称 → Piece
    pieces: RwLock<HashMap<String, Entry<T>>>,
}

impl<T: Piece + ?Sized + 'static> Store<T> {
    /// 创建拥有独立 Walker 的 Store
    pub fn new(name: impl Into<String>, walker: Walker) -> Self {
        Self::with_walker(name, Arc::new(walker))
    }

    /// 创建使用注入 Walker 的 Store
    pub fn with_walker(name: impl Into<String>, walker: Arc<Walker>) -> Self {
        Self {
            handle: StoreHandle::new(name),
            walker,
            pieces: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// 交给 Piece 的非拥有引用
    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    /// 基础契约的类型名
    pub fn contract(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    /// 加载路径下的所有 Piece
    ///
    /// 按发现顺序逐个文件处理；同一文件导出多个合格构造器时，每个都成为独立条目。
    /// 文件系统错误或模块解析错误会终止本次加载并返回给调用方。
    pub async fn load(&self, path: impl AsRef<Path>, context: LoadContext) -> Result<Vec<SharedPiece<T>>> {
        let root = self.walker.resolve(path);
        let context = context.without_reserved();
        info!("Loading pieces into store '{}' from {:?}", self.name(), root);

        let mut loaded = Vec::new();
        let mut files = self.walker.walk(&root);
        while let Some(file) = files.next().await {
            let file = file?;
            let derived = self.walker.filter().strip(&file_name(&file));

            for candidate in self.walker.load(self, &file).await? {
                let piece_context = context.for_file(derived.clone(), file.clone());
                let piece = self.construct(&candidate.constructor, piece_context)?;
                loaded.push(self.register(piece).await?);
            }
        }

        info!(
            "Loaded {} pieces into store '{}' from {:?}",
            loaded.len(),
            self.name(),
            root
        );
        Ok(loaded)
    }

    /// 依次加载多个路径，返回全部 Piece
    pub async fn load_all<I, P>(&self, paths: I, context: LoadContext) -> Result<Vec<SharedPiece<T>>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let context = context.without_reserved();
        let mut loaded = Vec::new();
        for path in paths {
            loaded.extend(self.load(path, context.clone()).await?);
        }
        Ok(loaded)
    }

    /// 构造 Piece，不修改注册表
    ///
    /// 选项为 `{enabled: true, store: self}` 合并上下文；上下文可以覆盖 `enabled`，`store` 始终是本 Store。
    pub fn construct(&self, constructor: &Constructor<T>, context: PieceContext) -> Result<SharedPiece<T>> {
        let options = PieceOptions {
            name: context.name,
            path: context.path,
            enabled: context.enabled.unwrap_or(true),
            store: self.handle.clone(),
            extra: context.extra,
        };

        let piece = constructor.build(options)?;
        Ok(Arc::new(Mutex::new(piece)))
    }

    /// 注册 Piece
    ///
    /// 先写入注册表再调用注册钩子；钩子结束后若 Piece 已停用，立即注销。
    /// 钩子失败时 Piece 仍保留在注册表中。
    pub async fn register(&self, piece: SharedPiece<T>) -> Result<SharedPiece<T>> {
        let mut guard = piece.lock().await;
        let name = guard.name().to_string();
        let entry = Entry {
            piece: Arc::clone(&piece),
            path: guard.path().to_path_buf(),
            enabled: guard.base().enabled_flag(),
        };

        let replaced = self.pieces.write().insert(name.clone(), entry);
        if replaced.is_some() {
            debug!("Replaced piece '{}' in store '{}'", name, self.name());
        }

        guard.register().await?;
        let enabled = guard.enabled();
        drop(guard);

        if !enabled {
            self.deregister(&piece).await?;
        }

        info!(
            "Registered piece '{}' in store '{}' (enabled: {})",
            name,
            self.name(),
            enabled
        );
        Ok(piece)
    }

    /// 注销 Piece：标记为停用并调用注销钩子，不从注册表移除
    pub async fn deregister(&self, piece: &SharedPiece<T>) -> Result<SharedPiece<T>> {
        let mut guard = piece.lock().await;
        guard.set_enabled(false);
        guard.deregister().await?;

        info!("Deregistered piece '{}' in store '{}'", guard.name(), self.name());
        Ok(Arc::clone(piece))
    }

    pub fn get(&self, name: &str) -> Option<SharedPiece<T>> {
        self.pieces.read().get(name).map(|entry| Arc::clone(&entry.piece))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pieces.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pieces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.read().is_empty()
    }

    /// 按名称排序的键
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pieces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的所有 Piece
    pub fn pieces(&self) -> Vec<SharedPiece<T>> {
        self.sorted(|_, entry| Some(Arc::clone(&entry.piece)))
    }

    /// 直接从注册表删除条目，不调用任何钩子
    pub fn remove(&self, name: &str) -> Option<SharedPiece<T>> {
        self.pieces.write().remove(name).map(|entry| entry.piece)
    }

    /// 当前启用的 Piece
    ///
    /// 状态查询不获取 Piece 的锁，钩子仍在执行的 Piece 也会按当前标志列出。
    pub fn enabled(&self) -> Vec<SharedPiece<T>> {
        self.sorted(|_, entry| entry.enabled().then(|| Arc::clone(&entry.piece)))
    }

    /// 注册表观察到的状态，未注册时为 `None`
    pub fn status(&self, name: &str) -> Option<PieceStatus> {
        self.pieces.read().get(name).map(|entry| {
            if entry.enabled() {
                PieceStatus::Enabled
            } else {
                PieceStatus::Disabled
            }
        })
    }

    /// 所有 Piece 的 JSON 视图
    pub fn summaries(&self) -> Vec<PieceSummary> {
        self.sorted(|name, entry| {
            Some(PieceSummary {
                name: name.to_string(),
                path: entry.path.clone(),
                enabled: entry.enabled(),
            })
        })
    }

    fn sorted<R>(&self, mut select: impl FnMut(&str, &Entry<T>) -> Option<R>) -> Vec<R> {
        let pieces = self.pieces.read();
        let mut entries: Vec<_> = pieces.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .filter_map(|(name, entry)| select(name, entry))
            .collect()
    }
}

impl<T: Piece + ?Sized> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.handle.name)
            .field("contract", &std::any::type_name::<T>())
            .field("len", &self.pieces.read().len())
            .finish()
    }
}
