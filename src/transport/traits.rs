//! 会话传输抽象
//!
//! 每个生成请求打开一个流式通道：零或多个 Chunk / Log，随后恰好一个终止事件
//! （Complete / Error / Cancelled），之后不再有任何事件。cancel 幂等，终止后调用为空操作。

use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::request::GenerationRequest;

/// 传输事件（封闭集合，由 Orchestrator 的转换表消费）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TransportEvent {
    /// 流式代码片段（按到达顺序拼接）
    Chunk(String),
    /// 状态/日志行
    Log(String),
    /// 最终代码；以此为准，而不是 Chunk 的拼接
    Complete(String),
    Error(String),
    Cancelled,
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportEvent::Complete(_) | TransportEvent::Error(_) | TransportEvent::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Chunk(_) => "chunk",
            TransportEvent::Log(_) => "log",
            TransportEvent::Complete(_) => "complete",
            TransportEvent::Error(_) => "error",
            TransportEvent::Cancelled => "cancelled",
        }
    }
}

/// 取消原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// 用户点击 Stop
    UserStop,
    /// reset 抢占当前周期
    Reset,
}

/// 可克隆的取消句柄：第一次 cancel 的原因生效
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// open 返回的句柄：事件接收端 + 取消句柄
#[derive(Debug)]
pub struct TransportHandle {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub cancel: CancelHandle,
}

/// 事件发送端：终止事件之后的发送一律丢弃，保证「恰好一个终止事件」
#[derive(Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
    terminated: bool,
}

impl EventSender {
    pub fn send(&mut self, event: TransportEvent) -> bool {
        if self.terminated {
            tracing::debug!(event = event.name(), "Dropping transport event after terminal");
            return false;
        }
        self.terminated = event.is_terminal();
        self.tx.send(event).is_ok()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// 创建一对事件通道与取消句柄，供传输实现使用
pub fn transport_channel() -> (EventSender, TransportHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelHandle::new();
    (
        EventSender {
            tx,
            terminated: false,
        },
        TransportHandle { events: rx, cancel },
    )
}

/// 传输 trait：open 立即返回句柄，连接与流式读取在后台任务中进行
pub trait SessionTransport: Send + Sync {
    fn open(&self, request: GenerationRequest) -> TransportHandle;
}
