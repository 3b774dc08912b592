//! Piecework - 通用扩展加载运行时
//!
//! 在磁盘上发现自包含的扩展单元（Piece），实例化它们，并在具名注册表（Store）中管理注册生命周期。
//! 宿主程序只需定义一次基础契约，即可自动填充具体实现，无需手写注册代码。
//!
//! # 组成
//!
//! - **Piece**: 实体模型，包含名称、启用状态、所属 Store 引用和构造选项
//! - **Walker**: 遍历目录找出候选文件，并把文件解析为实现基础契约的构造器
//! - **Store**: 名称到 Piece 的映射，负责 发现 → 构造 → 注册 流程和注册/注销状态转换

pub mod config;
pub mod error;
pub mod piece;
pub mod store;
pub mod walker;

// 重新导出核心类型
pub use config::*;
pub use error::*;
pub use piece::*;
pub use store::*;
pub use walker::*;

/// 供宿主通过 `inventory::submit!` 提交 [`ModuleDescriptor`]
pub use inventory;

/// 框架信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FRAMEWORK_NAME: &str = "Piecework";

/// 初始化日志系统，重复调用时保留已安装的订阅器
pub async fn initialize(logging: &LoggingConfig) -> Result<()> {
    let installed = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(logging.level))
        .with_target(logging.verbose)
        .with_file(logging.verbose)
        .with_line_number(logging.verbose)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }

    tracing::info!("🚀 Initializing {} v{}", FRAMEWORK_NAME, VERSION);
    Ok(())
}
