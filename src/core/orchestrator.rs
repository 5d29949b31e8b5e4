//! 生成编排器：会话状态机
//!
//! Idle --create--> Generating --complete--> Ready --update--> Generating ...
//! Generating 收到 Cancelled / Error 时回到 Ready（没有任何版本时回到 Idle）；reset 从任意阶段回到 Idle。
//! 编排器是 SessionState 与 VersionHistory 的唯一写者；传输事件按周期编号投递，过期周期的事件被拒绝。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::{
    CycleId, Notice, NotificationSink, Phase, SessionError, SessionSnapshot, SessionState,
    SessionSupervisor, TracingNotifier,
};
use crate::history::{render_tree, NewVersion, VersionHistory, VersionKind};
use crate::request::{capture_snapshot, GenerationRequest, RequestBuilder, SnapshotCapturer};
use crate::transport::{CancelReason, SessionTransport, TransportEvent};

/// 一个生成周期的事件流
#[derive(Debug)]
pub struct CycleStream {
    pub id: CycleId,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl CycleStream {
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// 非阻塞读取已到达的事件
    pub fn try_next(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

/// 周期开始时记录的上下文，完成时据此提交版本
#[derive(Debug, Clone)]
enum CycleContext {
    Create {
        image: String,
    },
    Edit {
        parent: usize,
        instruction: String,
        result_image: Option<String>,
    },
}

impl CycleContext {
    fn kind(&self) -> VersionKind {
        match self {
            CycleContext::Create { .. } => VersionKind::InitialCreate,
            CycleContext::Edit { .. } => VersionKind::Edit,
        }
    }

    fn into_version(self, code: String) -> NewVersion {
        match self {
            CycleContext::Create { image } => NewVersion::initial(code, image),
            CycleContext::Edit {
                parent,
                instruction,
                result_image,
            } => NewVersion::edit(parent, code, instruction, result_image),
        }
    }
}

/// 生成编排器
pub struct GenerationOrchestrator {
    transport: Arc<dyn SessionTransport>,
    builder: RequestBuilder,
    notifier: Arc<dyn NotificationSink>,
    capturer: Option<Arc<dyn SnapshotCapturer>>,
    supervisor: SessionSupervisor,
    state: SessionState,
    history: VersionHistory,
    cycle: Option<CycleContext>,
}

impl GenerationOrchestrator {
    pub fn new(transport: Arc<dyn SessionTransport>, builder: RequestBuilder) -> Self {
        Self {
            transport,
            builder,
            notifier: Arc::new(TracingNotifier),
            capturer: None,
            supervisor: SessionSupervisor::new(),
            state: SessionState::default(),
            history: VersionHistory::new(),
            cycle: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_capturer(mut self, capturer: Arc<dyn SnapshotCapturer>) -> Self {
        self.capturer = Some(capturer);
        self
    }

    /// 通知并返回错误（前置条件失败时状态不变）
    fn reject(&self, err: SessionError) -> SessionError {
        self.notifier.notify(Notice::from(&err));
        err
    }

    /// 初次生成：清空会话与历史，以第一张参考图开启 InitialCreate 周期
    pub fn create(&mut self, images: Vec<String>) -> Result<CycleStream, SessionError> {
        if self.state.phase == Phase::Generating {
            return Err(self.reject(SessionError::SessionBusy));
        }
        let Some(image) = images.first().cloned() else {
            return Err(self.reject(SessionError::NoReferenceImage));
        };

        self.reset();
        let request = self.builder.initial(&image);
        self.state.reference_images = images;
        Ok(self.begin(request, CycleContext::Create { image }))
    }

    /// 增量编辑：以当前版本为父节点开启 Edit 周期；可选附带当前渲染截图
    pub async fn update(
        &mut self,
        instruction: &str,
        include_snapshot: bool,
    ) -> Result<CycleStream, SessionError> {
        if self.state.phase == Phase::Generating {
            return Err(self.reject(SessionError::SessionBusy));
        }
        let Some(current) = self.state.current_version else {
            return Err(self.reject(SessionError::NoCurrentVersion));
        };

        let result_image = if include_snapshot {
            match &self.capturer {
                Some(capturer) => {
                    let code = &self.history.get(current)?.code;
                    capture_snapshot(capturer.as_ref(), code).await
                }
                None => {
                    tracing::warn!("Snapshot requested but no capturer configured");
                    self.notifier.notify(Notice::error(
                        "Screenshot capture is not available, sending the edit without a screenshot",
                    ));
                    None
                }
            }
        } else {
            None
        };

        let reference = self
            .state
            .reference_images
            .first()
            .cloned()
            .unwrap_or_default();
        let request = self.builder.edit(
            &self.history,
            current,
            &reference,
            instruction,
            result_image.clone(),
        )?;
        Ok(self.begin(
            request,
            CycleContext::Edit {
                parent: current,
                instruction: instruction.to_string(),
                result_image,
            },
        ))
    }

    fn begin(&mut self, request: GenerationRequest, context: CycleContext) -> CycleStream {
        let handle = self.transport.open(request);
        let id = self.supervisor.start(handle.cancel);
        tracing::info!(cycle = id, kind = ?context.kind(), "Generation started");
        self.state.begin_cycle();
        self.cycle = Some(context);
        CycleStream {
            id,
            events: handle.events,
        }
    }

    /// 按到达顺序应用传输事件；不属于在途周期的事件返回 IllegalTransition 且不改变状态
    pub fn handle_event(&mut self, id: CycleId, event: TransportEvent) -> Result<(), SessionError> {
        if !self.supervisor.is_active(id) || self.state.phase != Phase::Generating {
            return Err(SessionError::IllegalTransition {
                phase: self.state.phase,
                event: event.name(),
            });
        }

        match event {
            TransportEvent::Chunk(text) => self.state.live_buffer.push_str(&text),
            TransportEvent::Log(line) => self.state.console_log.push(line),
            TransportEvent::Complete(code) => {
                self.supervisor.finish(id);
                if let Some(context) = self.cycle.take() {
                    let index = self.history.append(context.into_version(code));
                    self.state.current_version = Some(index);
                    tracing::info!(cycle = id, version = index, "Generation committed");
                }
                self.state.settle();
            }
            TransportEvent::Cancelled => {
                self.supervisor.finish(id);
                self.cycle = None;
                self.state.settle();
                tracing::info!(cycle = id, "Generation cancelled");
                self.notifier.notify(Notice::from(&SessionError::UserCancelled));
            }
            TransportEvent::Error(reason) => {
                self.supervisor.finish(id);
                self.cycle = None;
                self.state.settle();
                tracing::warn!(cycle = id, "Generation failed: {}", reason);
                self.notifier
                    .notify(Notice::from(&SessionError::TransportError(reason)));
            }
        }
        Ok(())
    }

    /// 消费周期事件直到终止事件，返回最终阶段（非交互调用方使用）
    pub async fn run_cycle(&mut self, mut stream: CycleStream) -> Phase {
        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            if let Err(e) = self.handle_event(stream.id, event) {
                tracing::debug!("Dropping event: {}", e);
                break;
            }
            if terminal {
                break;
            }
        }
        self.state.phase
    }

    /// 请求停止在途生成；阶段在收到 Cancelled 终止事件后才改变
    pub fn stop(&self) -> bool {
        let signalled = self.supervisor.cancel(CancelReason::UserStop);
        if signalled {
            tracing::info!("Stop requested");
        }
        signalled
    }

    /// 无条件清空会话状态与版本历史；在途周期被取消并作废
    pub fn reset(&mut self) {
        self.supervisor.abort(CancelReason::Reset);
        self.cycle = None;
        self.state.clear();
        self.history.clear();
    }

    /// 回退到历史中的任意版本；不创建新版本，之后的 update 从该版本分叉
    pub fn revert_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.history.get(index)?;
        self.state.current_version = Some(index);
        tracing::debug!(version = index, "Reverted");
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn current_version(&self) -> Option<usize> {
        self.state.current_version
    }

    pub fn live_buffer(&self) -> &str {
        &self.state.live_buffer
    }

    pub fn console_log(&self) -> &[String] {
        &self.state.console_log
    }

    pub fn reference_images(&self) -> &[String] {
        &self.state.reference_images
    }

    /// 当前版本的代码
    pub fn current_code(&self) -> Option<&str> {
        self.state
            .current_version
            .and_then(|i| self.history.get(i).ok())
            .map(|n| n.code.as_str())
    }

    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    pub fn active_cycle(&self) -> Option<CycleId> {
        self.supervisor.active_id()
    }

    /// 投影为 UI 可渲染的快照
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.state.phase,
            current_version: self.state.current_version,
            live_buffer: self.state.live_buffer.clone(),
            current_code: self.current_code().map(str::to_string),
            console_tail: self.state.console_tail().map(str::to_string),
            history: render_tree(&self.history, self.state.current_version),
            reference_images: self.reference_images().len(),
            snapshot_capture: self.capturer.is_some(),
        }
    }
}
