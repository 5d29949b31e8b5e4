//! Mock 传输（用于测试与离线演示，无需后端）
//!
//! 按脚本依次发出 Log / Chunk，再以 Complete / Error 结束；Hang 模式发完片段后一直挂起直到被取消。
//! 每个事件之间检查取消令牌，取消后只发出 Cancelled。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::request::{GenerationRequest, GenerationType};
use crate::transport::{
    transport_channel, CancelHandle, EventSender, SessionTransport, TransportEvent,
    TransportHandle,
};

/// 脚本的结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Complete(String),
    Error(String),
    /// 不结束，直到被取消
    Hang,
}

/// 一次生成的脚本
#[derive(Debug, Clone)]
pub struct MockScript {
    pub logs: Vec<String>,
    pub chunks: Vec<String>,
    pub outcome: MockOutcome,
}

impl MockScript {
    /// 片段拼接即最终代码
    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            logs: vec!["Generating code...".to_string()],
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            outcome: MockOutcome::Complete(chunks.concat()),
        }
    }

    /// 根据请求生成一段示例 HTML（mock_ai_response 模式）
    pub fn for_request(request: &GenerationRequest) -> Self {
        let body = match request.generation_type {
            GenerationType::Create => "<h1>Mock page</h1>".to_string(),
            GenerationType::Update => format!(
                "<h1>Mock page</h1>\n<!-- {} -->",
                request.instruction().unwrap_or_default()
            ),
        };
        let code = format!(
            "<html>\n<head><script src=\"https://cdn.tailwindcss.com\"></script></head>\n<body>\n{body}\n</body>\n</html>"
        );
        let chunks = code
            .split_inclusive('\n')
            .map(str::to_string)
            .collect::<Vec<_>>();
        Self {
            logs: vec![format!("Generating {} code...", request.settings.code_flavor)],
            chunks,
            outcome: MockOutcome::Complete(code),
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptSource {
    Fixed(MockScript),
    FromRequest,
}

/// Mock 传输：记录收到的请求，便于断言
#[derive(Debug, Clone)]
pub struct MockTransport {
    source: ScriptSource,
    delay: Duration,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockTransport {
    /// 每次 open 都回放同一个脚本
    pub fn scripted(script: MockScript) -> Self {
        Self {
            source: ScriptSource::Fixed(script),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 根据请求内容生成示例代码
    pub fn from_requests() -> Self {
        Self {
            source: ScriptSource::FromRequest,
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 已打开的请求（按 open 顺序）
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl SessionTransport for MockTransport {
    fn open(&self, request: GenerationRequest) -> TransportHandle {
        let script = match &self.source {
            ScriptSource::Fixed(script) => script.clone(),
            ScriptSource::FromRequest => MockScript::for_request(&request),
        };
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let (tx, handle) = transport_channel();
        let cancel = handle.cancel.clone();
        tokio::spawn(play(script, self.delay, cancel, tx));
        handle
    }
}

/// 等待 delay；期间被取消则返回 false
async fn pause(delay: Duration, cancel: &CancelHandle) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn play(script: MockScript, delay: Duration, cancel: CancelHandle, mut tx: EventSender) {
    let events = script
        .logs
        .into_iter()
        .map(TransportEvent::Log)
        .chain(script.chunks.into_iter().map(TransportEvent::Chunk));

    for event in events {
        if !pause(delay, &cancel).await {
            tx.send(TransportEvent::Cancelled);
            return;
        }
        if !tx.send(event) {
            // 接收端已丢弃（会话被 reset）
            return;
        }
    }

    if !pause(delay, &cancel).await {
        tx.send(TransportEvent::Cancelled);
        return;
    }
    match script.outcome {
        MockOutcome::Complete(code) => {
            tx.send(TransportEvent::Complete(code));
        }
        MockOutcome::Error(reason) => {
            tx.send(TransportEvent::Error(reason));
        }
        MockOutcome::Hang => {
            cancel.cancelled().await;
            tx.send(TransportEvent::Cancelled);
        }
    }
}
