//! 图片载入与代码导出

use std::path::Path;

use anyhow::Context;
use base64::Engine;

/// 参数已是 data URI 或 http(s) 地址时原样返回，否则读取本地文件编码为 data URI
pub async fn load_image(arg: &str) -> anyhow::Result<String> {
    if arg.starts_with("data:") || arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(arg.to_string());
    }
    let path = Path::new(arg);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(format!(
        "data:{};base64,{}",
        mime_for(path),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    }
}

/// 将当前版本代码写入文件（父目录不存在时创建）
pub async fn export_code(path: &Path, code: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, code)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
