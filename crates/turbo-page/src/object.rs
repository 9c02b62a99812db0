//! The serialized page object.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use turbo_session::{ErrorMap, FlashMessages};

/// Validation errors, flat or scoped by bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Errors {
    /// Field -> message.
    Fields(ErrorMap),
    /// Bag -> field -> message.
    Bags(BTreeMap<String, ErrorMap>),
}

impl Default for Errors {
    fn default() -> Self {
        Self::Fields(ErrorMap::new())
    }
}

impl Errors {
    /// Whether there are no errors.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(fields) => fields.is_empty(),
            Self::Bags(bags) => bags.values().all(BTreeMap::is_empty),
        }
    }
}

/// Structured representation of one navigation's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageObject {
    pub component: String,
    pub props: BTreeMap<String, Value>,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub clear_history: bool,
    #[serde(default)]
    pub encrypt_history: bool,
    #[serde(default)]
    pub errors: Errors,
    #[serde(default)]
    pub flash: FlashMessages,
    /// Deferred keys by group, announced on full renders only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deferred_props: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_props: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prepend_props: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deep_merge_props: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_props_on: BTreeMap<String, Vec<String>>,
    /// Merge keys the client reset; never listed as merge props.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reset_props: Vec<String>,
    /// Per-prop provider failures.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prop_errors: BTreeMap<String, String>,
}

impl PageObject {
    /// Create a page object with no props or metadata.
    pub fn new(component: impl Into<String>, url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props: BTreeMap::new(),
            url: url.into(),
            version: version.into(),
            clear_history: false,
            encrypt_history: false,
            errors: Errors::default(),
            flash: FlashMessages::new(),
            deferred_props: BTreeMap::new(),
            merge_props: Vec::new(),
            prepend_props: Vec::new(),
            deep_merge_props: Vec::new(),
            match_props_on: BTreeMap::new(),
            reset_props: Vec::new(),
            prop_errors: BTreeMap::new(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Escape text for use inside a double-quoted HTML attribute.
pub fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}
