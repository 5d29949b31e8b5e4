//! 版本历史：只追加的节点 arena
//!
//! 节点之间通过下标引用父节点（parent_index < index），从不修改或删除，
//! 因此被放弃的分支仍可回退。lineage 沿父链回溯到根再反转，得到根到节点的指令序列。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::SessionError;

/// 版本类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    InitialCreate,
    Edit,
}

/// 生成该版本的输入
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionInputs {
    /// 初次生成：参考图
    Image { image_url: String },
    /// 编辑：自然语言指令，可选附带上一版渲染截图
    Instruction {
        prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_image: Option<String>,
    },
}

impl VersionInputs {
    pub fn instruction(&self) -> Option<&str> {
        match self {
            VersionInputs::Instruction { prompt, .. } => Some(prompt.as_str()),
            VersionInputs::Image { .. } => None,
        }
    }
}

/// 一个生成的代码版本
#[derive(Clone, Debug, Serialize)]
pub struct VersionNode {
    pub index: usize,
    pub kind: VersionKind,
    pub parent_index: Option<usize>,
    pub code: String,
    pub inputs: VersionInputs,
    pub created_at: DateTime<Utc>,
}

/// 尚未入库的版本（index 由 store 分配）
#[derive(Clone, Debug)]
pub struct NewVersion {
    pub kind: VersionKind,
    pub parent_index: Option<usize>,
    pub code: String,
    pub inputs: VersionInputs,
}

impl NewVersion {
    pub fn initial(code: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            kind: VersionKind::InitialCreate,
            parent_index: None,
            code: code.into(),
            inputs: VersionInputs::Image {
                image_url: image_url.into(),
            },
        }
    }

    pub fn edit(
        parent_index: usize,
        code: impl Into<String>,
        prompt: impl Into<String>,
        result_image: Option<String>,
    ) -> Self {
        Self {
            kind: VersionKind::Edit,
            parent_index: Some(parent_index),
            code: code.into(),
            inputs: VersionInputs::Instruction {
                prompt: prompt.into(),
                result_image,
            },
        }
    }
}

/// 会话内的版本历史
#[derive(Clone, Debug, Default)]
pub struct VersionHistory {
    nodes: Vec<VersionNode>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加新版本并返回其下标。
    ///
    /// 父下标必须指向已存在的更早节点；否则按根节点入库并记录告警（仅出现在错误路径）。
    pub fn append(&mut self, version: NewVersion) -> usize {
        let index = self.nodes.len();
        let parent_index = match version.parent_index {
            Some(parent) if parent < index => Some(parent),
            Some(parent) => {
                tracing::warn!(parent, index, "Dangling parent index, storing version as a root");
                None
            }
            None => None,
        };
        self.nodes.push(VersionNode {
            index,
            kind: version.kind,
            parent_index,
            code: version.code,
            inputs: version.inputs,
            created_at: Utc::now(),
        });
        index
    }

    pub fn get(&self, index: usize) -> Result<&VersionNode, SessionError> {
        self.nodes.get(index).ok_or(SessionError::IndexOutOfRange {
            index,
            len: self.nodes.len(),
        })
    }

    /// 根到 index 的指令序列（按时间顺序，不含根节点的图片输入）
    pub fn lineage(&self, index: usize) -> Result<Vec<String>, SessionError> {
        let mut texts = Vec::new();
        let mut cursor = Some(self.get(index)?);
        while let Some(node) = cursor {
            if let Some(prompt) = node.inputs.instruction() {
                texts.push(prompt.to_string());
            }
            // parent_index < index 保证回溯必然终止
            cursor = node.parent_index.and_then(|p| self.nodes.get(p));
        }
        texts.reverse();
        Ok(texts)
    }

    /// 直接子节点（按追加顺序）
    pub fn children(&self, index: usize) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.parent_index == Some(index))
            .map(|n| n.index)
            .collect()
    }

    pub fn roots(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.parent_index.is_none())
            .map(|n| n.index)
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionNode> {
        self.nodes.iter()
    }
}
