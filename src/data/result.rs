//! Tool results
//!
//! A [`ResultData`] is an insertion-ordered map from string keys to values,
//! auxiliary images or another tool's nested results. Auxiliary images are
//! shared read-only behind `Arc`, so cloning a result never copies pixels.

use crate::data::ImageData;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Outcome of the node that produced a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    #[default]
    Ok,
    /// Node was disabled or had no required input
    Skipped,
    /// Node returned an error
    Failed,
}

/// One value in a [`ResultData`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEntry {
    Value(Value),
    Image(Arc<ImageData>),
    Nested(ResultData),
}

/// Insertion-ordered result map produced by one tool invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultData {
    tool_name: String,
    category: String,
    status: ResultStatus,
    message: Option<String>,
    entries: Vec<(String, ResultEntry)>,
}

impl ResultData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty result attributed to a tool
    pub fn for_tool(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Default::default()
        }
    }

    /// Marker for a node that did not run
    pub fn skipped(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ResultStatus::Skipped,
            message: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Marker for a node whose run failed
    pub fn failed(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ResultStatus::Failed,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn set_tool_name(&mut self, tool_name: impl Into<String>) {
        self.tool_name = tool_name.into();
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }

    /// Insert or replace a value, keeping the original position on replace
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), ResultEntry::Value(value.into()));
    }

    pub fn set_image(&mut self, key: impl Into<String>, image: ImageData) {
        self.insert(key.into(), ResultEntry::Image(Arc::new(image)));
    }

    /// Store another tool's results under its name
    pub fn insert_nested(&mut self, key: impl Into<String>, nested: ResultData) {
        self.insert(key.into(), ResultEntry::Nested(nested));
    }

    fn insert(&mut self, key: String, entry: ResultEntry) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((key, entry)),
        }
    }

    /// Copy every entry of `other` into this map (later keys win)
    pub fn extend_from(&mut self, other: &ResultData) {
        for (key, entry) in &other.entries {
            self.insert(key.clone(), entry.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResultEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.get(key) {
            Some(ResultEntry::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn image(&self, key: &str) -> Option<&Arc<ImageData>> {
        match self.get(key) {
            Some(ResultEntry::Image(image)) => Some(image),
            _ => None,
        }
    }

    pub fn nested(&self, key: &str) -> Option<&ResultData> {
        match self.get(key) {
            Some(ResultEntry::Nested(nested)) => Some(nested),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<ResultEntry> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResultEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON view for logging and export; images become shape summaries
    pub fn to_json(&self) -> Value {
        let mut values = serde_json::Map::new();
        for (key, entry) in &self.entries {
            let value = match entry {
                ResultEntry::Value(v) => v.clone(),
                ResultEntry::Image(image) => json!({
                    "width": image.width(),
                    "height": image.height(),
                    "format": image.format().display_name(),
                }),
                ResultEntry::Nested(nested) => nested.to_json(),
            };
            values.insert(key.clone(), value);
        }

        json!({
            "tool": self.tool_name,
            "category": self.category,
            "status": self.status,
            "message": self.message,
            "values": values,
        })
    }
}
