// Response Template Store
// Canonical fixed responses, handed out as deep-merged copies.

use crate::errors::MockError;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const SIMPLE_CHAT: &str = "SIMPLE_CHAT";
pub const FUNCTION_CALL: &str = "FUNCTION_CALL";
pub const TOOL_CALL: &str = "TOOL_CALL";
pub const IMAGE_GENERATION: &str = "IMAGE_GENERATION";

/// Named canonical response shapes. The stored templates are never handed
/// out by mutable reference; callers always receive copies.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    templates: BTreeMap<&'static str, Value>,
}

impl TemplateStore {
    pub fn new() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(SIMPLE_CHAT, simple_chat());
        templates.insert(FUNCTION_CALL, function_call());
        templates.insert(TOOL_CALL, tool_call());
        templates.insert(IMAGE_GENERATION, image_generation());
        Self { templates }
    }

    /// Borrow a template by name
    pub fn get(&self, name: &str) -> Result<&Value, MockError> {
        self.templates
            .get(name)
            .ok_or_else(|| MockError::UnknownTemplate(name.to_string()))
    }

    /// A copy of the named template with `overrides` deep-merged in
    pub fn create(&self, name: &str, overrides: &Value) -> Result<Value, MockError> {
        Ok(deep_merge(self.get(name)?, overrides))
    }

    /// Copies of every template, keyed by name
    pub fn all(&self) -> BTreeMap<String, Value> {
        self.templates
            .iter()
            .map(|(name, template)| (name.to_string(), template.clone()))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.templates.keys().copied()
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `overrides` into a copy of `base`.
///
/// Objects merge key by key, recursively. Any other override value, arrays
/// included, replaces the base value wholesale. Neither input is modified.
pub fn deep_merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in overrides {
                let next = match base.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overrides) => overrides.clone(),
    }
}

fn simple_chat() -> Value {
    json!({
        "id": "chatcmpl-mock-simple",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "This is a fixed mock response."
            },
            "logprobs": null,
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 7, "total_tokens": 17}
    })
}

fn function_call() -> Value {
    json!({
        "id": "chatcmpl-mock-function",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "function_call": {
                    "name": "get_current_weather",
                    "arguments": "{\"location\":\"Boston, MA\",\"unit\":\"celsius\"}"
                }
            },
            "logprobs": null,
            "finish_reason": "function_call"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 12, "total_tokens": 32}
    })
}

fn tool_call() -> Value {
    json!({
        "id": "chatcmpl-mock-tool",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_mock000000000000000000",
                    "type": "function",
                    "function": {
                        "name": "get_current_weather",
                        "arguments": "{\"location\":\"Boston, MA\",\"unit\":\"celsius\"}"
                    }
                }]
            },
            "logprobs": null,
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 12, "total_tokens": 32}
    })
}

fn image_generation() -> Value {
    json!({
        "created": 1_700_000_000,
        "data": [{
            "url": "https://mock-images.openai.invalid/fixed/image-0.png",
            "revised_prompt": "A fixed mock image."
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_template() {
        let store = TemplateStore::new();
        let err = store.create("NOPE", &json!({})).unwrap_err();
        assert!(matches!(err, MockError::UnknownTemplate(ref name) if name == "NOPE"));
        assert_eq!(err.to_string(), "Unknown template type: NOPE");
    }

    #[test]
    fn test_all_templates_present() {
        let store = TemplateStore::new();
        let names: Vec<_> = store.names().collect();
        assert_eq!(
            names,
            vec![FUNCTION_CALL, IMAGE_GENERATION, SIMPLE_CHAT, TOOL_CALL]
        );
        assert_eq!(store.all().len(), 4);
    }

    #[test]
    fn test_deep_merge_nested_objects() {
        let base = json!({"a": {"b": 1, "c": 2}, "d": 3});
        let merged = deep_merge(&base, &json!({"a": {"c": 20, "e": 5}}));
        assert_eq!(merged, json!({"a": {"b": 1, "c": 20, "e": 5}, "d": 3}));
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let base = json!({"list": [1, 2, 3], "nested": {"items": [{"x": 1}, {"y": 2}]}});
        let merged = deep_merge(&base, &json!({"list": [9], "nested": {"items": [{"z": 3}]}}));
        assert_eq!(merged["list"], json!([9]));
        assert_eq!(merged["nested"]["items"], json!([{"z": 3}]));
    }

    #[test]
    fn test_deep_merge_scalar_over_object() {
        let merged = deep_merge(&json!({"a": {"b": 1}}), &json!({"a": null}));
        assert_eq!(merged, json!({"a": null}));
    }

    #[test]
    fn test_create_never_mutates_store() {
        let store = TemplateStore::new();
        let pristine = store.get(SIMPLE_CHAT).unwrap().clone();

        let custom = store
            .create(
                SIMPLE_CHAT,
                &json!({"model": "gpt-4", "choices": [{"message": {"content": "hi"}}]}),
            )
            .unwrap();
        assert_eq!(custom["model"], "gpt-4");
        // arrays replace wholesale, so the choice loses its other keys
        assert_eq!(custom["choices"], json!([{"message": {"content": "hi"}}]));

        assert_eq!(store.get(SIMPLE_CHAT).unwrap(), &pristine);
        let again = store.create(SIMPLE_CHAT, &json!({})).unwrap();
        assert_eq!(again, pristine);
    }
}
