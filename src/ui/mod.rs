//! 终端界面：命令解析、图片载入/代码导出、交互循环

pub mod command;
pub mod io;
pub mod repl;

pub use command::{parse_line, ReplInput};
pub use repl::run_repl;
