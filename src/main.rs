//! Snapcode - 截图生成 UI 代码
//!
//! 入口：初始化日志、加载配置、创建会话运行时，并运行终端交互循环。

use std::path::PathBuf;

use anyhow::Context;
use snapcode::config::{load_config, AppConfig};
use snapcode::core::create_session;
use snapcode::ui::run_repl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    snapcode::observability::init();

    // 可选的配置文件路径作为第一个参数
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (channels, notices) = create_session(&cfg);

    run_repl(channels, notices, cfg.app.export_path.clone())
        .await
        .context("REPL failed")?;

    Ok(())
}
