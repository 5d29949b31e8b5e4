//! 请求层：生成请求组装与截图采集接口

pub mod builder;

pub use builder::{
    capture_snapshot, GenerationRequest, GenerationType, RequestBuilder, SnapshotCapturer,
};
