//! 会话错误类型与通知
//!
//! 前置条件失败（SessionBusy / NoCurrentVersion / IndexOutOfRange）同步返回给调用方；
//! 传输错误与用户取消属于异步终止事件，交给 NotificationSink，而不是抛给 create/update 的调用方。

use thiserror::Error;

use crate::core::Phase;

/// 生成会话中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A generation is already in progress")]
    SessionBusy,

    #[error("No current version to update")]
    NoCurrentVersion,

    #[error("Version index {index} out of range (history has {len} versions)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Generation cancelled by user")]
    UserCancelled,

    /// create 时没有提供任何参考图
    #[error("No reference image supplied")]
    NoReferenceImage,

    /// 事件不属于当前生成周期（周期已结束或已被 reset 抢占）
    #[error("Illegal transition: {event} in phase {phase:?}")]
    IllegalTransition { phase: Phase, event: &'static str },

    /// 配置文件或环境变量无法解析
    #[error("Config error: {0}")]
    Config(String),
}

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// 人类可读的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl From<&SessionError> for Notice {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::UserCancelled => Notice::info(err.to_string()),
            _ => Notice::error(err.to_string()),
        }
    }
}

/// 通知接收端：发出即忘，不需要确认
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// 默认实现：写入 tracing 日志
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => tracing::info!("{}", notice.message),
            NoticeLevel::Error => tracing::warn!("{}", notice.message),
        }
    }
}

/// 转发到 mpsc 通道（UI 侧消费）；接收端已关闭时静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: tokio::sync::mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<Notice>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}
