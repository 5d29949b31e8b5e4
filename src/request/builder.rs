//! 生成请求组装
//!
//! InitialCreate：只带参考图；Edit：参考图 + lineage(current) + 新指令，可选附带当前渲染截图。
//! 配置（代码风格、凭据、开关）作为显式参数合并进每个请求。

use async_trait::async_trait;
use serde::Serialize;

use crate::config::GenerationSettings;
use crate::core::SessionError;
use crate::history::{VersionHistory, VersionKind};

/// 请求类型（后端字段 generationType）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    Create,
    Update,
}

/// 发往传输层的完整请求
#[derive(Clone, Debug, Serialize)]
pub struct GenerationRequest {
    #[serde(rename = "generationType")]
    pub generation_type: GenerationType,
    pub image: String,
    #[serde(rename = "resultImage", skip_serializing_if = "Option::is_none")]
    pub result_image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
    #[serde(flatten)]
    pub settings: GenerationSettings,
}

impl GenerationRequest {
    pub fn kind(&self) -> VersionKind {
        match self.generation_type {
            GenerationType::Create => VersionKind::InitialCreate,
            GenerationType::Update => VersionKind::Edit,
        }
    }

    /// Edit 请求的新指令（history 的最后一项）
    pub fn instruction(&self) -> Option<&str> {
        match self.generation_type {
            GenerationType::Create => None,
            GenerationType::Update => self.history.last().map(String::as_str),
        }
    }
}

/// 当前渲染截图采集器：给定代码返回截图（data URI）；失败或空结果视为「无截图」
#[async_trait]
pub trait SnapshotCapturer: Send + Sync {
    async fn capture(&self, code: &str) -> Result<String, String>;
}

/// 采集截图；失败降级为 None，不中断请求
pub async fn capture_snapshot(capturer: &dyn SnapshotCapturer, code: &str) -> Option<String> {
    match capturer.capture(code).await {
        Ok(image) if !image.is_empty() => Some(image),
        Ok(_) => {
            tracing::warn!("Snapshot capture returned empty image, sending update without it");
            None
        }
        Err(e) => {
            tracing::warn!("Snapshot capture failed ({}), sending update without it", e);
            None
        }
    }
}

/// 请求构建器：持有一份只读的生成配置
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    settings: GenerationSettings,
}

impl RequestBuilder {
    pub fn new(settings: GenerationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn initial(&self, image: &str) -> GenerationRequest {
        GenerationRequest {
            generation_type: GenerationType::Create,
            image: image.to_string(),
            result_image: None,
            history: Vec::new(),
            settings: self.settings.clone(),
        }
    }

    pub fn edit(
        &self,
        history: &VersionHistory,
        current: usize,
        reference_image: &str,
        instruction: &str,
        result_image: Option<String>,
    ) -> Result<GenerationRequest, SessionError> {
        let mut texts = history.lineage(current)?;
        texts.push(instruction.to_string());
        Ok(GenerationRequest {
            generation_type: GenerationType::Update,
            image: reference_image.to_string(),
            result_image,
            history: texts,
            settings: self.settings.clone(),
        })
    }
}
