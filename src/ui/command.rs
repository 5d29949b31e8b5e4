//! REPL 输入解析：冒号命令与普通文本

use std::path::PathBuf;

/// 一行用户输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    /// 普通文本：Idle 时视为参考图列表，Ready 时视为修改指令
    Text(String),
    Stop,
    Reset,
    RevertTo(usize),
    History,
    Snapshot(bool),
    Export(Option<PathBuf>),
    Help,
    Quit,
    Empty,
}

/// 解析一行输入；未知命令或参数错误返回提示文本
pub fn parse_line(line: &str) -> Result<ReplInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplInput::Empty);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(ReplInput::Text(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    match name {
        "q" | "quit" | "exit" => Ok(ReplInput::Quit),
        "stop" => Ok(ReplInput::Stop),
        "reset" => Ok(ReplInput::Reset),
        "history" | "h" => Ok(ReplInput::History),
        "help" | "?" => Ok(ReplInput::Help),
        "revert" => {
            let arg = arg.ok_or("usage: :revert <version>")?;
            let index = arg
                .trim_start_matches('v')
                .parse::<usize>()
                .map_err(|_| format!("invalid version: {arg}"))?;
            Ok(ReplInput::RevertTo(index))
        }
        "snapshot" => match arg {
            Some("on") => Ok(ReplInput::Snapshot(true)),
            Some("off") => Ok(ReplInput::Snapshot(false)),
            _ => Err("usage: :snapshot on|off".to_string()),
        },
        "export" => Ok(ReplInput::Export(arg.map(PathBuf::from))),
        other => Err(format!("unknown command: :{other} (try :help)")),
    }
}

pub const HELP: &str = "\
Commands:
  <image path or data URI> ...   start a new generation (when idle)
  <instruction>                  request an edit of the current version
  :stop                          stop the running generation
  :reset                         discard everything and start over
  :revert <n>                    make version n current (edits will branch from it)
  :history                       show the version tree
  :snapshot on|off               include a screenshot of the current render in edits
  :export [path]                 write the current code to a file
  :quit                          exit";
