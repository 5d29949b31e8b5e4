//! 终端交互循环
//!
//! 消费 state / stream / notices 三个接收端，把用户输入翻译成 SessionCommand。

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use crate::core::{Notice, NoticeLevel, Phase, SessionChannels, SessionCommand, SessionSnapshot};
use crate::ui::command::{parse_line, ReplInput, HELP};
use crate::ui::io::{export_code, load_image};

/// 阶段变化时打印的摘要
fn describe_transition(snap: &SessionSnapshot) -> String {
    match snap.phase {
        Phase::Idle => "[idle] enter image paths to start".to_string(),
        Phase::Generating => "[generating] :stop to cancel".to_string(),
        Phase::Ready => {
            let version = snap
                .current_version
                .map(|v| format!("v{v}"))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "[ready] current {} of {} versions ({} reference images); type an instruction to edit",
                version,
                snap.history.len(),
                snap.reference_images
            )
        }
    }
}

async fn handle_text(
    text: String,
    snap: &SessionSnapshot,
    include_snapshot: bool,
) -> anyhow::Result<Option<SessionCommand>> {
    match snap.phase {
        Phase::Idle => {
            let mut images = Vec::new();
            for arg in text.split_whitespace() {
                images.push(load_image(arg).await?);
            }
            Ok(Some(SessionCommand::Create(images)))
        }
        Phase::Ready => Ok(Some(SessionCommand::Update {
            instruction: text,
            include_snapshot,
        })),
        Phase::Generating => {
            println!("Generation in progress; wait or :stop first");
            Ok(None)
        }
    }
}

/// 没有截图采集器时拒绝打开截图开关
fn toggle_snapshot(on: bool, snap: &SessionSnapshot) -> Result<bool, &'static str> {
    if on && !snap.snapshot_capture {
        return Err("Screenshot capture is not available in this session");
    }
    Ok(on)
}

async fn export(snap: &SessionSnapshot, path: &Path) -> anyhow::Result<()> {
    let code = snap
        .current_code
        .as_deref()
        .context("No version to export yet")?;
    export_code(path, code).await?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// 运行 REPL，直到 :quit 或标准输入结束
pub async fn run_repl(
    channels: SessionChannels,
    mut notices: mpsc::UnboundedReceiver<Notice>,
    export_path: PathBuf,
) -> anyhow::Result<()> {
    let SessionChannels {
        commands,
        mut state,
        mut stream,
    } = channels;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut include_snapshot = false;
    let mut last_phase = state.borrow().phase;

    println!("{HELP}");
    println!("{}", describe_transition(&state.borrow()));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    let _ = commands.send(SessionCommand::Quit);
                    break;
                };
                let input = match parse_line(&line) {
                    Ok(input) => input,
                    Err(msg) => {
                        println!("{msg}");
                        continue;
                    }
                };
                let snap = state.borrow().clone();
                let cmd = match input {
                    ReplInput::Empty => None,
                    ReplInput::Help => {
                        println!("{HELP}");
                        None
                    }
                    ReplInput::Quit => {
                        let _ = commands.send(SessionCommand::Quit);
                        break;
                    }
                    ReplInput::Stop => Some(SessionCommand::Stop),
                    ReplInput::Reset => Some(SessionCommand::Reset),
                    ReplInput::RevertTo(index) => {
                        if index < snap.history.len() {
                            Some(SessionCommand::RevertTo(index))
                        } else {
                            println!("No version v{index} (history has {})", snap.history.len());
                            None
                        }
                    }
                    ReplInput::History => {
                        for line in &snap.history {
                            println!("{line}");
                        }
                        None
                    }
                    ReplInput::Snapshot(on) => {
                        match toggle_snapshot(on, &snap) {
                            Ok(on) => {
                                include_snapshot = on;
                                println!("Include screenshot: {}", if on { "on" } else { "off" });
                            }
                            Err(msg) => println!("{msg}"),
                        }
                        None
                    }
                    ReplInput::Export(path) => {
                        let path = path.unwrap_or_else(|| export_path.clone());
                        if let Err(e) = export(&snap, &path).await {
                            println!("{e:#}");
                        }
                        None
                    }
                    ReplInput::Text(text) => match handle_text(text, &snap, include_snapshot).await {
                        Ok(cmd) => cmd,
                        Err(e) => {
                            println!("{e:#}");
                            None
                        }
                    },
                };
                if let Some(cmd) = cmd {
                    if commands.send(cmd).is_err() {
                        break;
                    }
                }
            }
            chunk = stream.recv() => match chunk {
                Ok(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Preview lagged by {} chunks", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(notice) = notices.recv() => {
                match notice.level {
                    NoticeLevel::Info => println!("\n{}", notice.message),
                    NoticeLevel::Error => eprintln!("\nerror: {}", notice.message),
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = state.borrow_and_update().clone();
                if snap.phase != last_phase {
                    last_phase = snap.phase;
                    println!();
                    println!("{}", describe_transition(&snap));
                }
            }
        }
    }
    Ok(())
}
