//! 从 LLM 文本中提取 JSON（```json ... ``` 代码块或首个 { 到末个 }）

use serde_json::Value;

use crate::llm::LlmError;

pub fn extract_json(output: &str) -> Result<Value, LlmError> {
    let trimmed = output.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    serde_json::from_str(json_str).map_err(|e| {
        let preview: String = json_str.chars().take(120).collect();
        LlmError::InvalidResponse(format!("{e}: {preview}"))
    })
}
