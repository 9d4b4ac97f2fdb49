//! Caller payloads and their mergeable text field.
//!
//! The engine does not own payload shape. It only needs one "primary text"
//! field to prepend context to. Two shapes ship with the crate:
//!
//! | Payload | Primary text |
//! |---------|--------------|
//! | `String` | the whole string |
//! | `serde_json::Value` | top-level `"prompt"`, else the last `"user"` message in `"messages"` |
//!
//! For a JSON message whose `"content"` is an array of blocks, the last
//! `{"type": "text"}` block's `"text"` is used.

use serde_json::Value;

/// A request object with one designated text field.
pub trait Payload {
    /// Current value of the primary text field, if the payload has one.
    fn primary_text(&self) -> Option<&str>;

    /// Replace the primary text. Returns `false` if there is no such field.
    fn set_primary_text(&mut self, text: String) -> bool;
}

impl Payload for String {
    fn primary_text(&self) -> Option<&str> {
        Some(self)
    }

    fn set_primary_text(&mut self, text: String) -> bool {
        *self = text;
        true
    }
}

impl Payload for Value {
    fn primary_text(&self) -> Option<&str> {
        if let Some(prompt) = self.get("prompt") {
            return prompt.as_str();
        }
        let message = last_user_message(self)?;
        match message.get("content")? {
            Value::String(s) => Some(s),
            Value::Array(blocks) => last_text_block(blocks)?.get("text")?.as_str(),
            _ => None,
        }
    }

    fn set_primary_text(&mut self, text: String) -> bool {
        if let Some(prompt) = self.get_mut("prompt") {
            if !prompt.is_string() {
                return false;
            }
            *prompt = Value::String(text);
            return true;
        }

        let Some(message) = last_user_message_mut(self) else {
            return false;
        };
        let Some(content) = message.get_mut("content") else {
            return false;
        };
        if content.is_string() {
            *content = Value::String(text);
            return true;
        }

        let slot = content
            .as_array_mut()
            .and_then(|blocks| last_text_block_mut(blocks))
            .and_then(|block| block.get_mut("text"));
        match slot {
            Some(slot) if slot.is_string() => {
                *slot = Value::String(text);
                true
            }
            _ => false,
        }
    }
}

fn is_user(message: &Value) -> bool {
    message.get("role").and_then(Value::as_str) == Some("user")
}

fn is_text_block(block: &Value) -> bool {
    block.get("type").and_then(Value::as_str) == Some("text")
}

fn last_user_message(payload: &Value) -> Option<&Value> {
    payload.get("messages")?.as_array()?.iter().rev().find(|m| is_user(m))
}

fn last_user_message_mut(payload: &mut Value) -> Option<&mut Value> {
    payload
        .get_mut("messages")?
        .as_array_mut()?
        .iter_mut()
        .rev()
        .find(|m| is_user(m))
}

fn last_text_block(blocks: &[Value]) -> Option<&Value> {
    blocks.iter().rev().find(|b| is_text_block(b))
}

fn last_text_block_mut(blocks: &mut [Value]) -> Option<&mut Value> {
    blocks.iter_mut().rev().find(|b| is_text_block(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_payload_is_its_own_text() {
        let mut payload = String::from("hello");
        assert_eq!(payload.primary_text(), Some("hello"));
        assert!(payload.set_primary_text("ctx\n\nhello".into()));
        assert_eq!(payload, "ctx\n\nhello");
    }

    #[test]
    fn prompt_field_wins() {
        let mut payload = json!({
            "prompt": "fix the deploy",
            "messages": [{ "role": "user", "content": "ignored" }]
        });
        assert_eq!(payload.primary_text(), Some("fix the deploy"));
        assert!(payload.set_primary_text("new".into()));
        assert_eq!(payload["prompt"], "new");
        assert_eq!(payload["messages"][0]["content"], "ignored");
    }

    #[test]
    fn last_user_message_is_used() {
        let mut payload = json!({
            "messages": [
                { "role": "user", "content": "first" },
                { "role": "assistant", "content": "reply" },
                { "role": "user", "content": "second" },
                { "role": "assistant", "content": "trailing" }
            ]
        });
        assert_eq!(payload.primary_text(), Some("second"));
        assert!(payload.set_primary_text("merged".into()));
        assert_eq!(payload["messages"][2]["content"], "merged");
        assert_eq!(payload["messages"][0]["content"], "first");
    }

    #[test]
    fn content_blocks_use_last_text_block() {
        let mut payload = json!({
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "one" },
                    { "type": "image", "source": "x" },
                    { "type": "text", "text": "two" }
                ]
            }]
        });
        assert_eq!(payload.primary_text(), Some("two"));
        assert!(payload.set_primary_text("merged".into()));
        assert_eq!(payload["messages"][0]["content"][2]["text"], "merged");
        assert_eq!(payload["messages"][0]["content"][0]["text"], "one");
    }

    #[test]
    fn shapes_without_text_are_left_alone() {
        for mut payload in [
            json!({ "other": 1 }),
            json!({ "prompt": 42 }),
            json!({ "messages": [{ "role": "assistant", "content": "x" }] }),
            json!({ "messages": [{ "role": "user", "content": [{ "type": "image" }] }] }),
            json!("bare string value"),
        ] {
            let before = payload.clone();
            assert!(payload.primary_text().is_none());
            assert!(!payload.set_primary_text("x".into()));
            assert_eq!(payload, before);
        }
    }
}
