//! 核心编排层：错误与通知、状态投影、周期监管、状态机、运行时

pub mod error;
pub mod orchestrator;
pub mod runtime;
pub mod session_supervisor;
pub mod state;

pub use error::{
    ChannelNotifier, Notice, NoticeLevel, NotificationSink, SessionError, TracingNotifier,
};
pub use orchestrator::{CycleStream, GenerationOrchestrator};
pub use runtime::{create_session, spawn_session, SessionChannels, SessionCommand};
pub use session_supervisor::{CycleId, SessionSupervisor};
pub use state::{Phase, SessionSnapshot, SessionState};
