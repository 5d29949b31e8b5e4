//! WebSocket 传输：连接生成后端的 /generate-code
//!
//! 发送一帧 JSON 请求，随后后端推送 `{"type": "chunk" | "status" | "setCode" | "error", "value": ...}`。
//! 正常关闭且收到过 setCode 时以 Complete 结束；用户取消以 4333 关闭连接。

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::TransportSection;
use crate::request::GenerationRequest;
use crate::transport::{
    transport_channel, CancelHandle, CancelReason, EventSender, SessionTransport, TransportEvent,
    TransportHandle,
};

/// 后端约定：应用错误关闭码
pub const APP_ERROR_WEB_SOCKET_CODE: u16 = 4332;
/// 后端约定：用户主动关闭
pub const USER_CLOSE_WEB_SOCKET_CODE: u16 = 4333;

/// 后端推送的消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum BackendMessage {
    #[serde(rename = "chunk")]
    Chunk(String),
    #[serde(rename = "status")]
    Status(String),
    #[serde(rename = "setCode")]
    SetCode(String),
    #[serde(rename = "error")]
    Error(String),
}

/// WebSocket 传输
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(backend_url: &str, connect_timeout: Duration) -> Self {
        Self {
            url: format!("{}/generate-code", backend_url.trim_end_matches('/')),
            connect_timeout,
        }
    }

    pub fn from_config(cfg: &TransportSection) -> Self {
        Self::new(&cfg.backend_url, Duration::from_secs(cfg.connect_timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SessionTransport for WebSocketTransport {
    fn open(&self, request: GenerationRequest) -> TransportHandle {
        let (tx, handle) = transport_channel();
        tokio::spawn(run_session(
            self.url.clone(),
            self.connect_timeout,
            request,
            handle.cancel.clone(),
            tx,
        ));
        handle
    }
}

/// 连接关闭时根据关闭码与已收到的内容决定终止事件
pub fn close_outcome(
    code: Option<u16>,
    final_code: Option<String>,
    error: Option<String>,
) -> TransportEvent {
    if code == Some(USER_CLOSE_WEB_SOCKET_CODE) {
        return TransportEvent::Cancelled;
    }
    if let Some(reason) = error {
        return TransportEvent::Error(reason);
    }
    if code == Some(APP_ERROR_WEB_SOCKET_CODE) {
        return TransportEvent::Error("Backend closed the connection with an application error".into());
    }
    match final_code {
        Some(code) => TransportEvent::Complete(code),
        None => TransportEvent::Error("Connection closed before any code was produced".into()),
    }
}

fn close_frame(reason: Option<CancelReason>) -> CloseFrame<'static> {
    match reason {
        Some(CancelReason::Reset) => CloseFrame {
            code: CloseCode::Normal,
            reason: "session reset".into(),
        },
        _ => CloseFrame {
            code: CloseCode::from(USER_CLOSE_WEB_SOCKET_CODE),
            reason: "user cancelled".into(),
        },
    }
}

async fn run_session(
    url: String,
    connect_timeout: Duration,
    request: GenerationRequest,
    cancel: CancelHandle,
    mut tx: EventSender,
) {
    let payload = match serde_json::to_string(&request) {
        Ok(p) => p,
        Err(e) => {
            tx.send(TransportEvent::Error(format!("Failed to encode request: {e}")));
            return;
        }
    };

    let connect = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()));
    let ws = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tx.send(TransportEvent::Cancelled);
            return;
        }
        res = connect => match res {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => {
                tracing::warn!("WebSocket connect to {} failed: {}", url, e);
                tx.send(TransportEvent::Error(format!("Connect failed: {e}")));
                return;
            }
            Err(_) => {
                tracing::warn!("WebSocket connect to {} timed out", url);
                tx.send(TransportEvent::Error("Connect timed out".into()));
                return;
            }
        },
    };
    tracing::debug!("Connected to {}", url);

    let (mut sink, mut source) = ws.split();
    if let Err(e) = sink.send(WsMessage::Text(payload)).await {
        tx.send(TransportEvent::Error(format!("Failed to send request: {e}")));
        return;
    }

    let mut final_code: Option<String> = None;
    let mut error: Option<String> = None;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(Some(close_frame(cancel.reason())))).await;
                tx.send(TransportEvent::Cancelled);
                return;
            }
            msg = source.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<BackendMessage>(&text) {
                    Ok(BackendMessage::Chunk(value)) => {
                        tx.send(TransportEvent::Chunk(value));
                    }
                    Ok(BackendMessage::Status(value)) => {
                        tx.send(TransportEvent::Log(value));
                    }
                    Ok(BackendMessage::SetCode(value)) => final_code = Some(value),
                    Ok(BackendMessage::Error(value)) => {
                        tracing::warn!("Backend reported error: {}", value);
                        error = Some(value);
                    }
                    Err(e) => tracing::debug!("Ignoring unrecognised backend frame: {}", e),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    tx.send(close_outcome(code, final_code.take(), error.take()));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tx.send(TransportEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    tx.send(close_outcome(None, final_code.take(), error.take()));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::request::RequestBuilder;

    fn frame(kind: &str, value: &str) -> WsMessage {
        WsMessage::Text(serde_json::json!({ "type": kind, "value": value }).to_string())
    }

    /// 本地回环后端：接受一个连接并返回（地址, 服务端任务）
    async fn local_backend<F, Fut, T>(serve: F) -> (String, tokio::task::JoinHandle<T>)
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            serve(ws).await
        });
        (format!("ws://{addr}"), server)
    }

    async fn collect(handle: &mut TransportHandle) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) =
            tokio::time::timeout(Duration::from_secs(2), handle.events.recv())
                .await
                .unwrap()
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_backend_frames_map_to_events() {
        let (url, server) = local_backend(|mut ws| async move {
            let request = match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => text,
                other => panic!("Expected request frame, got {:?}", other),
            };
            ws.send(frame("status", "Generating code...")).await.unwrap();
            ws.send(frame("chunk", "<div")).await.unwrap();
            ws.send(frame("chunk", ">hi</div>")).await.unwrap();
            ws.send(frame("setCode", "<div>hi</div>")).await.unwrap();
            ws.close(None).await.unwrap();
            request
        })
        .await;

        let t = WebSocketTransport::new(&url, Duration::from_secs(2));
        let mut handle = t.open(RequestBuilder::default().initial("data:image/png;base64,AAAA"));
        assert_eq!(
            collect(&mut handle).await,
            vec![
                TransportEvent::Log("Generating code...".into()),
                TransportEvent::Chunk("<div".into()),
                TransportEvent::Chunk(">hi</div>".into()),
                TransportEvent::Complete("<div>hi</div>".into()),
            ]
        );

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["generationType"], "create");
        assert_eq!(request["image"], "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn test_backend_error_frame_then_app_close() {
        let (url, _server) = local_backend(|mut ws| async move {
            let _ = ws.next().await;
            ws.send(frame("error", "quota exceeded")).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::from(APP_ERROR_WEB_SOCKET_CODE),
                reason: "".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let t = WebSocketTransport::new(&url, Duration::from_secs(2));
        let mut handle = t.open(RequestBuilder::default().initial("img"));
        assert_eq!(
            collect(&mut handle).await,
            vec![TransportEvent::Error("quota exceeded".into())]
        );
    }

    #[tokio::test]
    async fn test_user_stop_closes_with_user_code() {
        let (url, server) = local_backend(|mut ws| async move {
            let _ = ws.next().await;
            ws.send(frame("chunk", "<div")).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Close(frame))) => return frame.map(|f| u16::from(f.code)),
                    Some(Ok(_)) => continue,
                    _ => return None,
                }
            }
        })
        .await;

        let t = WebSocketTransport::new(&url, Duration::from_secs(2));
        let mut handle = t.open(RequestBuilder::default().initial("img"));
        assert_eq!(
            handle.events.recv().await,
            Some(TransportEvent::Chunk("<div".into()))
        );

        handle.cancel.cancel(CancelReason::UserStop);
        assert_eq!(collect(&mut handle).await, vec![TransportEvent::Cancelled]);
        assert_eq!(server.await.unwrap(), Some(USER_CLOSE_WEB_SOCKET_CODE));
    }

    #[test]
    fn test_parse_backend_messages() {
        let msg: BackendMessage = serde_json::from_str(r#"{"type":"setCode","value":"<p/>"}"#).unwrap();
        assert_eq!(msg, BackendMessage::SetCode("<p/>".into()));
        let msg: BackendMessage =
            serde_json::from_str(r#"{"type":"status","value":"Generating code..."}"#).unwrap();
        assert_eq!(msg, BackendMessage::Status("Generating code...".into()));
        assert!(serde_json::from_str::<BackendMessage>(r#"{"type":"unknown","value":""}"#).is_err());
    }

    #[test]
    fn test_close_outcome() {
        assert_eq!(
            close_outcome(Some(1000), Some("<p/>".into()), None),
            TransportEvent::Complete("<p/>".into())
        );
        assert_eq!(
            close_outcome(Some(USER_CLOSE_WEB_SOCKET_CODE), Some("<p/>".into()), None),
            TransportEvent::Cancelled
        );
        assert_eq!(
            close_outcome(Some(APP_ERROR_WEB_SOCKET_CODE), None, Some("quota exceeded".into())),
            TransportEvent::Error("quota exceeded".into())
        );
        assert!(matches!(
            close_outcome(Some(APP_ERROR_WEB_SOCKET_CODE), Some("<p/>".into()), None),
            TransportEvent::Error(_)
        ));
        assert!(matches!(close_outcome(None, None, None), TransportEvent::Error(_)));
    }

    #[test]
    fn test_url_join() {
        let t = WebSocketTransport::new("ws://127.0.0.1:7001/", Duration::from_secs(1));
        assert_eq!(t.url(), "ws://127.0.0.1:7001/generate-code");
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_error() {
        // 端口 1 上通常没有服务，连接会被拒绝或超时
        let t = WebSocketTransport::new("ws://127.0.0.1:1", Duration::from_millis(500));
        let mut handle = t.open(RequestBuilder::default().initial("img"));
        match handle.events.recv().await {
            Some(TransportEvent::Error(_)) => {}
            other => panic!("Expected Error, got {:?}", other),
        }
        assert_eq!(handle.events.recv().await, None);
    }
}
