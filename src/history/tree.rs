//! 历史树视图：按父子关系深度优先展开，供 UI 列表/树展示

use std::fmt;

use serde::Serialize;

use crate::history::{VersionHistory, VersionInputs};

/// 摘要最大字符数
const SUMMARY_MAX_CHARS: usize = 48;

/// 树中的一行
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeLine {
    pub index: usize,
    pub depth: usize,
    pub summary: String,
    pub is_current: bool,
}

impl fmt::Display for TreeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_current { '*' } else { ' ' };
        write!(
            f,
            "{} {}v{} {}",
            marker,
            "  ".repeat(self.depth),
            self.index,
            self.summary
        )
    }
}

fn summarize(inputs: &VersionInputs) -> String {
    match inputs {
        VersionInputs::Image { .. } => "create".to_string(),
        VersionInputs::Instruction { prompt, result_image } => {
            let mut text: String = prompt.chars().take(SUMMARY_MAX_CHARS).collect();
            if prompt.chars().count() > SUMMARY_MAX_CHARS {
                text.push('…');
            }
            if result_image.is_some() {
                text.push_str(" [+screenshot]");
            }
            format!("edit: {text}")
        }
    }
}

/// 将历史展开为带缩进的行（根优先，兄弟按追加顺序）
pub fn render_tree(history: &VersionHistory, current: Option<usize>) -> Vec<TreeLine> {
    let mut lines = Vec::with_capacity(history.len());
    let mut stack: Vec<(usize, usize)> = history.roots().into_iter().rev().map(|r| (r, 0)).collect();
    while let Some((index, depth)) = stack.pop() {
        let Ok(node) = history.get(index) else {
            continue;
        };
        lines.push(TreeLine {
            index,
            depth,
            summary: summarize(&node.inputs),
            is_current: current == Some(index),
        });
        for child in history.children(index).into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    lines
}
