//! 状态定义：SessionState 与 SessionSnapshot 投影
//!
//! Orchestrator 是 SessionState 的唯一写者；UI 只拿到轻量的 SessionSnapshot（阶段、当前版本、实时缓冲、控制台尾部）。

use serde::Serialize;

use crate::history::TreeLine;

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Generating,
    Ready,
}

/// 会话内部状态
#[derive(Clone, Debug)]
pub struct SessionState {
    pub phase: Phase,
    /// 指向 VersionHistory 的下标；Idle 时为 None
    pub current_version: Option<usize>,
    /// 正在生成的流式文本；完成或取消时丢弃
    pub live_buffer: String,
    /// 当前（或最近一次）生成的状态行
    pub console_log: Vec<String>,
    /// create 时提供的参考图；后续 Edit 请求始终使用第 0 张
    pub reference_images: Vec<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current_version: None,
            live_buffer: String::new(),
            console_log: Vec::new(),
            reference_images: Vec::new(),
        }
    }
}

impl SessionState {
    /// 清空全部状态，回到 Idle
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// 进入 Generating：清空实时缓冲与控制台
    pub fn begin_cycle(&mut self) {
        self.phase = Phase::Generating;
        self.live_buffer.clear();
        self.console_log.clear();
    }

    /// 离开 Generating：有可展示的版本则 Ready，否则回到 Idle
    pub fn settle(&mut self) {
        self.live_buffer.clear();
        self.phase = if self.current_version.is_some() {
            Phase::Ready
        } else {
            Phase::Idle
        };
    }

    pub fn console_tail(&self) -> Option<&str> {
        self.console_log.last().map(String::as_str)
    }
}

/// UI 看到的「投影」状态，可序列化
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub current_version: Option<usize>,
    /// Generating 期间的实时缓冲
    pub live_buffer: String,
    /// Ready 时当前版本的完整代码
    pub current_code: Option<String>,
    pub console_tail: Option<String>,
    /// 可导航的历史树
    pub history: Vec<TreeLine>,
    /// 本会话的参考图数量
    pub reference_images: usize,
    /// 是否配置了截图采集器（决定 `:snapshot on` 是否可用）
    pub snapshot_capture: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current_version: None,
            live_buffer: String::new(),
            current_code: None,
            console_tail: None,
            history: Vec::new(),
            reference_images: 0,
            snapshot_capture: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_without_version_falls_back_to_idle() {
        let mut state = SessionState::default();
        state.begin_cycle();
        state.live_buffer.push_str("<div");
        state.settle();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.live_buffer.is_empty());

        state.current_version = Some(0);
        state.begin_cycle();
        state.settle();
        assert_eq!(state.phase, Phase::Ready);
    }

    #[test]
    fn test_begin_cycle_clears_console() {
        let mut state = SessionState::default();
        state.console_log.push("Generating code...".into());
        state.begin_cycle();
        assert!(state.console_log.is_empty());
        assert_eq!(state.console_tail(), None);
    }
}
