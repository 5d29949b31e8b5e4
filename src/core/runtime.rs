//! 会话运行时：后台任务驱动编排器
//!
//! 三通道：UI -> Core 命令（mpsc）；Core -> UI 状态快照（watch）；Core -> UI 代码片段流（broadcast）。
//! 命令与传输事件在同一个 select 循环中串行处理，事件按到达顺序应用。

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::Instrument;

use crate::config::AppConfig;
use crate::core::{ChannelNotifier, CycleStream, GenerationOrchestrator, Notice, SessionSnapshot};
use crate::request::RequestBuilder;
use crate::transport::{create_transport_from_config, TransportEvent};

/// 从 UI 发往会话的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// 以参考图开始新会话
    Create(Vec<String>),
    /// 提交修改指令
    Update {
        instruction: String,
        include_snapshot: bool,
    },
    /// 停止当前生成
    Stop,
    /// 丢弃全部状态与历史
    Reset,
    /// 回退到历史版本
    RevertTo(usize),
    /// 结束会话任务
    Quit,
}

/// UI 持有的通道端
pub struct SessionChannels {
    pub commands: mpsc::UnboundedSender<SessionCommand>,
    pub state: watch::Receiver<SessionSnapshot>,
    pub stream: broadcast::Receiver<String>,
}

/// 等待在途周期的下一个事件；没有在途周期时永远挂起。
/// 通道在终止事件前关闭视为传输错误，保证不会卡在 Generating。
async fn next_event(active: &mut Option<CycleStream>) -> TransportEvent {
    match active {
        Some(stream) => stream.next().await.unwrap_or_else(|| {
            TransportEvent::Error("Transport closed without a terminal event".to_string())
        }),
        None => std::future::pending().await,
    }
}

/// 在后台任务中运行编排器，返回 UI 侧通道
pub fn spawn_session(mut orch: GenerationOrchestrator) -> SessionChannels {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();
    let (state_tx, state_rx) = watch::channel(orch.snapshot());
    let (stream_tx, stream_rx) = broadcast::channel::<String>(64);
    let session_id = format!("session_{}", uuid::Uuid::new_v4());
    let span = tracing::info_span!("session", id = %session_id);

    tokio::spawn(async move {
        let mut active: Option<CycleStream> = None;
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        break; // 所有发送端已关闭
                    };
                    tracing::debug!(?cmd, "Session command");
                    match cmd {
                        SessionCommand::Create(images) => {
                            if let Ok(stream) = orch.create(images) {
                                active = Some(stream);
                            }
                        }
                        SessionCommand::Update { instruction, include_snapshot } => {
                            if let Ok(stream) = orch.update(&instruction, include_snapshot).await {
                                active = Some(stream);
                            }
                        }
                        SessionCommand::Stop => {
                            orch.stop();
                        }
                        SessionCommand::Reset => {
                            orch.reset();
                            active = None;
                        }
                        SessionCommand::RevertTo(index) => {
                            if let Err(e) = orch.revert_to(index) {
                                tracing::warn!("Revert rejected: {}", e);
                            }
                        }
                        SessionCommand::Quit => {
                            orch.reset();
                            let _ = state_tx.send(orch.snapshot());
                            break;
                        }
                    }
                    let _ = state_tx.send(orch.snapshot());
                }
                event = next_event(&mut active) => {
                    let Some(id) = active.as_ref().map(|s| s.id) else {
                        continue;
                    };
                    let chunk = match &event {
                        TransportEvent::Chunk(text) => Some(text.clone()),
                        _ => None,
                    };
                    match orch.handle_event(id, event) {
                        Ok(()) => {
                            if let Some(text) = chunk {
                                let _ = stream_tx.send(text);
                            }
                        }
                        Err(e) => tracing::debug!("Dropping event: {}", e),
                    }
                    // 周期已结束（终止事件或被抢占）时不再等待该流
                    if orch.active_cycle() != Some(id) {
                        active = None;
                    }
                    let _ = state_tx.send(orch.snapshot());
                }
            }
        }
        tracing::info!("Session closed");
    }
    .instrument(span));

    SessionChannels {
        commands: cmd_tx,
        state: state_rx,
        stream: stream_rx,
    }
}

/// 按配置创建会话：选择传输、合并生成配置，通知转发到返回的接收端
pub fn create_session(cfg: &AppConfig) -> (SessionChannels, mpsc::UnboundedReceiver<Notice>) {
    let settings = cfg.generation.clone().with_env_credentials();
    tracing::info!("Target code flavor: {}", settings.code_flavor);

    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let orch = GenerationOrchestrator::new(
        create_transport_from_config(cfg),
        RequestBuilder::new(settings),
    )
    .with_notifier(Arc::new(ChannelNotifier::new(notice_tx)));

    (spawn_session(orch), notice_rx)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::{NoticeLevel, Phase};
    use crate::request::{GenerationRequest, GenerationType};
    use crate::transport::{transport_channel, SessionTransport, TransportHandle};

    /// create 正常完成；update 只发一个片段就丢弃发送端，不发终止事件
    struct TruncatingTransport;

    impl SessionTransport for TruncatingTransport {
        fn open(&self, request: GenerationRequest) -> TransportHandle {
            let (mut tx, handle) = transport_channel();
            let event = match request.generation_type {
                GenerationType::Create => TransportEvent::Complete("<p>v0</p>".into()),
                GenerationType::Update => TransportEvent::Chunk("<p>v1".into()),
            };
            tx.send(event);
            handle
        }
    }

    async fn wait_for_phase(
        state: &mut watch::Receiver<SessionSnapshot>,
        phase: Phase,
    ) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| s.phase == phase))
            .await
            .expect("timed out waiting for phase")
            .expect("session closed")
            .clone()
    }

    #[tokio::test]
    async fn test_stream_closed_without_terminal_settles_as_error() {
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let orch =
            GenerationOrchestrator::new(Arc::new(TruncatingTransport), RequestBuilder::default())
                .with_notifier(Arc::new(ChannelNotifier::new(notice_tx)));
        let mut channels = spawn_session(orch);

        channels
            .commands
            .send(SessionCommand::Create(vec!["img0".into()]))
            .unwrap();
        let snap = wait_for_phase(&mut channels.state, Phase::Ready).await;
        assert_eq!(snap.current_version, Some(0));

        channels
            .commands
            .send(SessionCommand::Update {
                instruction: "make it blue".into(),
                include_snapshot: false,
            })
            .unwrap();
        let notice = tokio::time::timeout(Duration::from_secs(2), notice_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("closed without a terminal event"));

        let snap = wait_for_phase(&mut channels.state, Phase::Ready).await;
        assert_eq!(snap.current_version, Some(0));
        assert_eq!(snap.history.len(), 1);
        assert!(snap.live_buffer.is_empty());

        channels.commands.send(SessionCommand::Quit).unwrap();
    }
}
