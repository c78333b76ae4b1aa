//! Provider credentials referenced by workflow nodes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named credential set for one provider (DNS, deployer, notifier)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Access {
    /// Look up a string credential, treating empty strings as missing
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}
