use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单条遥测记录：字段名 -> 值，字段缺失或为 `null` 均视为缺失值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading {
    fields: BTreeMap<String, Value>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_missing(&self, field: &str) -> bool {
        matches!(self.fields.get(field), None | Some(Value::Null))
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 所有字段的规范化表示，用于整行去重比较
    pub fn canonical_key(&self) -> String {
        // BTreeMap 保证字段顺序稳定
        serde_json::to_string(&self.fields).unwrap_or_default()
    }
}

impl FromIterator<(String, Value)> for Reading {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_detection() {
        let reading = Reading::new()
            .with("temperature", Value::Null)
            .with("humidity", 55.0);
        assert!(reading.is_missing("temperature"));
        assert!(reading.is_missing("pressure"));
        assert!(!reading.is_missing("humidity"));
        assert_eq!(reading.number("humidity"), Some(55.0));
    }

    #[test]
    fn test_canonical_key_ignores_insert_order() {
        let a = Reading::new().with("a", 1).with("b", json!("x"));
        let b = Reading::new().with("b", json!("x")).with("a", 1);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }
}
