use serde_json::Value;

fn text_block(blocks: &[Value]) -> Option<Value> {
    blocks
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .map(|block| {
            let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
            Value::String(text.trim().to_string())
        })
}

/// Reduce a provider response to its text when it has a recognizable shape
/// (plain string, chat choices, content blocks, or a `content`/`text`/
/// `output` field). Anything else is returned unchanged.
pub fn extract_output(raw: Value) -> Value {
    match &raw {
        Value::String(s) => return Value::String(s.trim().to_string()),
        Value::Array(items) => {
            if let Some(first) = items.first() {
                if let Some(content) = first
                    .pointer("/message/content")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                {
                    return Value::String(content.trim().to_string());
                }
                match first.get("content") {
                    Some(Value::Array(blocks)) => {
                        if let Some(text) = text_block(blocks) {
                            return text;
                        }
                    }
                    Some(Value::String(s)) => return Value::String(s.trim().to_string()),
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            for key in ["content", "text", "output"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return Value::String(s.trim().to_string());
                }
            }
            if let Some(Value::Array(blocks)) = map.get("content") {
                if let Some(text) = text_block(blocks) {
                    return text;
                }
            }
        }
        _ => {}
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_is_trimmed() {
        assert_eq!(extract_output(json!("  hello \n")), json!("hello"));
    }

    #[test]
    fn test_chat_choice_shape() {
        let raw = json!([{"message": {"role": "assistant", "content": " Hi there "}}]);
        assert_eq!(extract_output(raw), json!("Hi there"));
    }

    #[test]
    fn test_content_block_shapes() {
        let raw = json!([{"content": [{"type": "tool_use"}, {"type": "text", "text": "answer"}]}]);
        assert_eq!(extract_output(raw), json!("answer"));

        let raw = json!({"content": [{"type": "text", "text": "block"}]});
        assert_eq!(extract_output(raw), json!("block"));
    }

    #[test]
    fn test_named_fields() {
        assert_eq!(extract_output(json!({"text": "t"})), json!("t"));
        assert_eq!(extract_output(json!({"output": "o", "usage": 3})), json!("o"));
    }

    #[test]
    fn test_structured_output_is_untouched() {
        let raw = json!({"category": "billing", "confidence": 0.9});
        assert_eq!(extract_output(raw.clone()), raw);
    }
}
