//! 可观测性：tracing 订阅器初始化

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志默认 info，可通过 RUST_LOG 覆盖；日志写 stderr，stdout 留给代码预览
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
