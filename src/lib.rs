//! Snapcode - 截图生成 UI 代码的会话引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态机、周期监管、错误与通知、后台运行时
//! - **history**: 只追加的版本树与历史视图
//! - **observability**: 日志初始化
//! - **request**: 生成请求组装（初次生成 / 增量编辑）
//! - **transport**: 流式传输抽象与实现（WebSocket / Mock）
//! - **ui**: 终端交互

pub mod config;
pub mod core;
pub mod history;
pub mod observability;
pub mod request;
pub mod transport;
pub mod ui;

pub use crate::core::{GenerationOrchestrator, Phase, SessionError};
pub use history::VersionHistory;
