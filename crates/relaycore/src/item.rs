use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of data flowing along a connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Item {
    /// JSON payload, usually an object
    pub json: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryData>,

    /// Which input item this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired: Option<PairedItem>,
}

impl Item {
    pub fn new(json: impl Into<Value>) -> Self {
        Self {
            json: json.into(),
            binary: None,
            paired: None,
        }
    }

    /// The item handed to trigger nodes when the caller supplies no input
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    pub fn with_binary(mut self, binary: BinaryData) -> Self {
        self.binary = Some(binary);
        self
    }

    pub fn paired_with(mut self, item: usize, input: usize) -> Self {
        self.paired = Some(PairedItem { item, input });
        self
    }

    /// Look up a top-level field of an object payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.json.as_object().and_then(|obj| obj.get(key))
    }
}

impl From<Value> for Item {
    fn from(json: Value) -> Self {
        Item::new(json)
    }
}

/// Binary attachment carried next to the JSON payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinaryData {
    pub mime_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Base64 encoded content
    pub data: String,
}

/// Provenance: originating item index and input port
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairedItem {
    pub item: usize,
    pub input: usize,
}

/// Ordered items produced by one node execution on one output port
pub type Batch = Vec<Item>;
