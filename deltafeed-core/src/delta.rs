use serde::de::Error as _;
use serde_json::Value;

/// Decoded body of a `data:` frame: `{ "content"?: string, "done"?: boolean }`.
///
/// Field checks are truthiness checks, not type checks: `"content": ""` carries nothing and
/// `"done": 1` finishes the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaEvent {
    pub content: Option<String>,
    pub done: bool,
}

impl DeltaEvent {
    /// A bare `null` is rejected: it is not a frame any server sends on purpose.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(payload)?;
        if value.is_null() {
            return Err(serde_json::Error::custom("data frame is null"));
        }
        Ok(Self::from_value(&value))
    }

    /// Non-object JSON (`42`, `"hi"`, `[..]`) is a valid frame with no effect.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let content = map
            .get("content")
            .filter(|v| is_truthy(v))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        let done = map.get("done").is_some_and(is_truthy);
        Self { content, done }
    }

    /// Content to append, if any. A finishing frame never contributes content.
    pub fn delta(&self) -> Option<&str> {
        if self.done {
            return None;
        }
        self.content.as_deref()
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
