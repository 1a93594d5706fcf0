//! 参数模板解析
//!
//! 参数值中的 `{{stepId.field}}` 替换为该步骤输出中的字段（field 可用 `.` 继续下钻，数组用下标）。
//! 整个字符串恰为一个占位符时替换为原始 JSON 值；嵌在更长文本里时按文本插值。
//! 找不到步骤、步骤无输出或字段缺失时保留占位符原文，不阻塞执行。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::plan::{StepId, StepResult};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-\.]+)\s*\}\}")
            .unwrap_or_else(|e| panic!("placeholder regex is invalid: {e}"))
    })
}

/// 递归解析参数中的占位符
pub fn resolve_parameters(params: &Value, results: &HashMap<StepId, StepResult>) -> Value {
    match params {
        Value::String(s) => resolve_string(s, results),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_parameters(v, results))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_parameters(v, results)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, results: &HashMap<StepId, StepResult>) -> Value {
    let re = placeholder_re();

    if let Some(caps) = re.captures(s.trim()) {
        let whole = caps.get(0).map(|m| m.as_str().len()).unwrap_or(0);
        if whole == s.trim().len() {
            return lookup(&caps, results)
                .cloned()
                .unwrap_or_else(|| Value::String(s.to_string()));
        }
    }

    let replaced = re.replace_all(s, |caps: &Captures| match lookup(caps, results) {
        Some(Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    });
    Value::String(replaced.into_owned())
}

fn lookup<'a>(caps: &Captures, results: &'a HashMap<StepId, StepResult>) -> Option<&'a Value> {
    let output = results.get(&caps[1])?.output.as_ref()?;
    caps[2]
        .split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(output, |value, seg| match value {
            Value::Object(map) => map.get(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use serde_json::json;

    fn results(entries: &[(&str, Option<Value>)]) -> HashMap<StepId, StepResult> {
        entries
            .iter()
            .map(|(id, output)| {
                let step = PlanStep::new(*id, "think");
                let result = match output {
                    Some(v) => StepResult::succeeded(&step, v.clone(), 0, 1),
                    None => StepResult::failed(&step, "boom", 0, 1),
                };
                (id.to_string(), result)
            })
            .collect()
    }

    #[test]
    fn test_whole_placeholder_is_replaced() {
        let r = results(&[("step1", Some(json!({ "output": "Draft body" })))]);
        let resolved = resolve_parameters(&json!({ "body": "{{step1.output}}" }), &r);
        assert_eq!(resolved, json!({ "body": "Draft body" }));
    }

    #[test]
    fn test_missing_field_passes_through() {
        let r = results(&[("step1", Some(json!({ "summary": "x" })))]);
        let params = json!({ "body": "{{step1.output}}" });
        assert_eq!(resolve_parameters(&params, &r), params);
    }

    #[test]
    fn test_missing_step_and_failed_step_pass_through() {
        let r = results(&[("failed", None)]);
        let params = json!({ "a": "{{ghost.output}}", "b": "{{failed.output}}" });
        assert_eq!(resolve_parameters(&params, &r), params);
    }

    #[test]
    fn test_non_string_values_keep_their_type() {
        let r = results(&[("search", Some(json!({ "ids": ["m1", "m2"], "count": 2 })))]);
        let resolved = resolve_parameters(
            &json!({ "ids": "{{search.ids}}", "first": "{{search.ids.0}}", "n": "{{ search.count }}" }),
            &r,
        );
        assert_eq!(resolved, json!({ "ids": ["m1", "m2"], "first": "m1", "n": 2 }));
    }

    #[test]
    fn test_embedded_placeholders_are_interpolated() {
        let r = results(&[
            ("s1", Some(json!({ "output": "Bob" }))),
            ("s2", Some(json!({ "count": 3 }))),
        ]);
        let resolved = resolve_parameters(
            &json!({ "subject": "Hi {{s1.output}}, {{s2.count}} new, {{s3.x}}" }),
            &r,
        );
        assert_eq!(resolved, json!({ "subject": "Hi Bob, 3 new, {{s3.x}}" }));
    }

    #[test]
    fn test_nested_structures() {
        let r = results(&[("s1", Some(json!({ "output": "x" })))]);
        let resolved = resolve_parameters(
            &json!({ "list": ["{{s1.output}}", 5, { "deep": "{{s1.output}}" }] }),
            &r,
        );
        assert_eq!(resolved, json!({ "list": ["x", 5, { "deep": "x" }] }));
    }
}
