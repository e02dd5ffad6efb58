//! The row/value data model shared by every pipeline stage.
//!
//! A [`Value`] is one cell; a [`Row`] is one ordered record whose length
//! always equals the run's column set. Rows are owned and move from producer
//! to consumer; no stage mutates a row it did not create.

use serde_json::json;

/// A single column value. The set of types is closed: everything a format
/// codec or database adapter produces must fit one of these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

/// One record: ordered values, one per declared column.
pub type Row = Vec<Value>;

impl Value {
    /// Render the value as text for delimiter-separated output.
    ///
    /// Nulls become the empty string, booleans `true`/`false`, byte
    /// sequences are decoded as (lossy) UTF-8 text, and numbers use their
    /// natural textual form.
    pub fn render_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Convert to a JSON value for JSONL output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Text(s) => json!(s),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::Bool(b) => json!(b),
            Value::Bytes(b) => json!(String::from_utf8_lossy(b)),
        }
    }

    /// Convert a decoded JSON value into a [`Value`].
    ///
    /// Integral numbers map to [`Value::Int`], other numbers to
    /// [`Value::Float`]. Nested arrays and objects are carried as their
    /// compact JSON text; the pipeline does not transform structure.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_text_rules() {
        assert_eq!(Value::Null.render_text(), "");
        assert_eq!(Value::Bool(true).render_text(), "true");
        assert_eq!(Value::Bool(false).render_text(), "false");
        assert_eq!(Value::Int(-42).render_text(), "-42");
        assert_eq!(Value::Float(1.5).render_text(), "1.5");
        assert_eq!(Value::Bytes(b"abc".to_vec()).render_text(), "abc");
    }

    #[test]
    fn json_numbers_split_int_and_float() {
        assert_eq!(Value::from_json(&json!(7)), Value::Int(7));
        assert_eq!(Value::from_json(&json!(7.25)), Value::Float(7.25));
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
    }

    #[test]
    fn nested_json_carried_as_text() {
        let v = Value::from_json(&json!({"a": [1, 2]}));
        assert_eq!(v, Value::Text("{\"a\":[1,2]}".to_string()));
    }
}
