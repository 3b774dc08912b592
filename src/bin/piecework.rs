//! Piecework 命令行工具
//!
//! 检查发现结果和配置文件，不加载任何 Piece

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use piecework::{initialize, ConfigManager, LoggingConfig, ModuleTable, Walker};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "piecework", version, about = "Inspect piece discovery and runtime configuration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 列出路径下的候选文件及推导出的 Piece 名称
    Walk {
        path: PathBuf,
        /// 读取其中的 walker 配置
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// 生成默认配置文件（.yaml / .toml）
    InitConfig { path: PathBuf },
    /// 加载并验证配置文件
    CheckConfig { path: PathBuf },
}

/// 程序入口点
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("❌ {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Walk { path, config } => walk(path, config).await,
        Command::InitConfig { path } => {
            initialize(&LoggingConfig::default()).await?;
            piecework::generate_default_config_file(&path)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
            Ok(())
        }
        Command::CheckConfig { path } => {
            let manager = ConfigManager::load_from_file(&path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            initialize(&manager.get_config().logging).await?;
            manager.validate()?;

            for store in manager.enabled_stores() {
                println!("{}: {:?}", store.name, store.paths);
            }
            Ok(())
        }
    }
}

async fn walk(path: PathBuf, config: Option<PathBuf>) -> anyhow::Result<()> {
    let manager = match config {
        Some(config) => ConfigManager::load_from_file(&config)
            .await
            .with_context(|| format!("loading {}", config.display()))?,
        None => ConfigManager::new_default(),
    };
    initialize(&manager.get_config().logging).await?;

    // 只遍历文件，不解析模块
    let mut walker = Walker::from_config(&manager.get_config().walker, Arc::new(ModuleTable::new()))?;
    if manager.get_config().walker.root.is_none() {
        // 命令行下相对路径按当前目录解析
        walker = walker.with_root(std::env::current_dir()?);
    }
    let root = walker.resolve(&path);

    let mut files = walker.walk(&root);
    let mut count = 0usize;
    while let Some(file) = files.next().await {
        let file = file?;
        let name = file
            .file_name()
            .map(|n| walker.filter().strip(&n.to_string_lossy()))
            .unwrap_or_default();
        println!("{}\t{}", name, file.display());
        count += 1;
    }

    tracing::info!("Found {} candidate files under {:?}", count, root);
    Ok(())
}
