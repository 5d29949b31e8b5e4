//! 传输层：会话传输抽象与实现（WebSocket 后端 / Mock）

pub mod mock;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

pub use mock::{MockOutcome, MockScript, MockTransport};
pub use traits::{
    transport_channel, CancelHandle, CancelReason, EventSender, SessionTransport, TransportEvent,
    TransportHandle,
};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketTransport, USER_CLOSE_WEB_SOCKET_CODE};

use crate::config::AppConfig;

/// 根据配置选择传输：mock_ai_response 或未编译 websocket 特性时用 Mock
pub fn create_transport_from_config(cfg: &AppConfig) -> Arc<dyn SessionTransport> {
    let mock = || {
        Arc::new(
            MockTransport::from_requests()
                .with_delay(Duration::from_millis(cfg.mock.chunk_delay_ms)),
        )
    };
    if cfg.generation.mock_ai_response {
        tracing::info!("Using mock transport");
        return mock();
    }
    #[cfg(feature = "websocket")]
    {
        let transport = WebSocketTransport::from_config(&cfg.transport);
        tracing::info!("Using WebSocket backend ({})", transport.url());
        Arc::new(transport)
    }
    #[cfg(not(feature = "websocket"))]
    {
        tracing::warn!("Built without websocket support, using mock transport");
        mock()
    }
}
