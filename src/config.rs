//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SNAPCODE__*` 覆盖（双下划线表示嵌套，如 `SNAPCODE__GENERATION__CODE_FLAVOR=react_tailwind`）。
//! 配置对核心只读：`GenerationSettings` 作为显式参数交给 RequestBuilder 合并进每个请求。

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::SessionError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub mock: MockSection,
}

/// [app] 段：导出路径
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// `:export` 未指定路径时写入的文件
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            export_path: default_export_path(),
        }
    }
}

fn default_export_path() -> PathBuf {
    PathBuf::from("index.html")
}

/// 目标代码风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFlavor {
    #[default]
    HtmlTailwind,
    HtmlCss,
    ReactTailwind,
    Bootstrap,
    IonicTailwind,
    VueTailwind,
    Svg,
    ReactNative,
}

impl fmt::Display for CodeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodeFlavor::HtmlTailwind => "html_tailwind",
            CodeFlavor::HtmlCss => "html_css",
            CodeFlavor::ReactTailwind => "react_tailwind",
            CodeFlavor::Bootstrap => "bootstrap",
            CodeFlavor::IonicTailwind => "ionic_tailwind",
            CodeFlavor::VueTailwind => "vue_tailwind",
            CodeFlavor::Svg => "svg",
            CodeFlavor::ReactNative => "react_native",
        };
        f.write_str(name)
    }
}

/// [generation] 段：合并进每个生成请求的选项（序列化为后端的 camelCase 字段）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationSettings {
    #[serde(default, rename(serialize = "generatedCodeConfig"))]
    pub code_flavor: CodeFlavor,
    #[serde(default, rename(serialize = "openAiApiKey"))]
    pub openai_api_key: Option<String>,
    #[serde(default, rename(serialize = "openAiBaseURL"))]
    pub openai_base_url: Option<String>,
    #[serde(default, rename(serialize = "screenshotOneApiKey"))]
    pub screenshot_one_api_key: Option<String>,
    #[serde(
        default = "default_image_generation_enabled",
        rename(serialize = "isImageGenerationEnabled")
    )]
    pub image_generation_enabled: bool,
    /// 为 true 时使用本地 MockTransport，不连接后端
    #[serde(default, rename(serialize = "mockAiResponse"))]
    pub mock_ai_response: bool,
    /// 附加到系统提示的自定义提示词
    #[serde(default, rename(serialize = "promptCode"))]
    pub prompt_code: String,
    /// 托管版本的访问码
    #[serde(default, rename(serialize = "accessCode"))]
    pub access_code: Option<String>,
}

fn default_image_generation_enabled() -> bool {
    true
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            code_flavor: CodeFlavor::default(),
            openai_api_key: None,
            openai_base_url: None,
            screenshot_one_api_key: None,
            image_generation_enabled: default_image_generation_enabled(),
            mock_ai_response: false,
            prompt_code: String::new(),
            access_code: None,
        }
    }
}

impl GenerationSettings {
    /// 未配置的凭据从 OPENAI_API_KEY / OPENAI_BASE_URL 环境变量补齐
    pub fn with_env_credentials(mut self) -> Self {
        if self.openai_api_key.is_none() {
            self.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.openai_base_url.is_none() {
            self.openai_base_url = std::env::var("OPENAI_BASE_URL").ok();
        }
        self
    }
}

/// [transport] 段：生成后端地址与超时
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "ws://127.0.0.1:7001".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// [mock] 段：MockTransport 的逐事件延迟
#[derive(Debug, Clone, Deserialize)]
pub struct MockSection {
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for MockSection {
    fn default() -> Self {
        Self {
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_chunk_delay_ms() -> u64 {
    20
}

/// 从 config 目录加载配置，环境变量 SNAPCODE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SNAPCODE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, SessionError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SNAPCODE")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| SessionError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapcode.toml");
        std::fs::write(
            &path,
            r#"
[generation]
code_flavor = "react_tailwind"
prompt_code = "use semantic tags"

[transport]
backend_url = "ws://localhost:9000"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.generation.code_flavor, CodeFlavor::ReactTailwind);
        assert_eq!(cfg.generation.prompt_code, "use semantic tags");
        assert!(cfg.generation.image_generation_enabled);
        assert_eq!(cfg.transport.backend_url, "ws://localhost:9000");
        assert_eq!(cfg.transport.connect_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[generation]\ncode_flavor = \"cobol\"\n").unwrap();

        match load_config(Some(path)) {
            Err(SessionError::Config(msg)) => assert!(msg.contains("cobol"), "{msg}"),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_wire_names() {
        let settings = GenerationSettings {
            openai_api_key: Some("sk-test".into()),
            ..GenerationSettings::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["generatedCodeConfig"], "html_tailwind");
        assert_eq!(json["openAiApiKey"], "sk-test");
        assert_eq!(json["isImageGenerationEnabled"], true);
        assert_eq!(json["mockAiResponse"], false);
    }

    #[test]
    fn test_code_flavor_display_matches_wire() {
        let json = serde_json::to_value(CodeFlavor::ReactNative).unwrap();
        assert_eq!(json, CodeFlavor::ReactNative.to_string());
    }
}
