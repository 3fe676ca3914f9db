use serde_json::Value;
use serde_json_path::JsonPath;

use crate::config::{Config, KeyPath};
use crate::error::{DosmatError, Result};

/// Query over a loaded config, written either as JSONPath (`$.optim.params.lr`)
/// or as a dotted key path (`optim.params.lr`)
#[derive(Debug, Clone)]
pub struct ConfigQuery {
    path: JsonPath,
    path_str: String,
}

impl ConfigQuery {
    pub fn new(query: &str) -> Result<Self> {
        let query = query.trim();
        let expression = if query.starts_with('$') {
            query.to_string()
        } else {
            Self::from_key_path(query)?
        };

        let parsed_path = JsonPath::parse(&expression).map_err(|e| {
            DosmatError::Query(format!("Failed to parse JSONPath '{}': {}", expression, e))
        })?;

        Ok(Self {
            path: parsed_path,
            path_str: expression,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path_str
    }

    /// All matching values
    pub fn query(&self, config: &Config) -> Result<Vec<Value>> {
        let data = serde_json::to_value(config)?;
        Ok(self.query_value(&data))
    }

    /// First matching value, if any
    pub fn query_single(&self, config: &Config) -> Result<Option<Value>> {
        Ok(self.query(config)?.into_iter().next())
    }

    pub fn query_value(&self, data: &Value) -> Vec<Value> {
        self.path.query(data).all().into_iter().cloned().collect()
    }

    fn from_key_path(query: &str) -> Result<String> {
        let key_path = KeyPath::parse(query)
            .map_err(|_| DosmatError::Query(format!("Invalid query '{}'", query)))?;

        let mut expression = String::from("$");
        for segment in key_path.segments() {
            match segment.parse::<usize>() {
                Ok(idx) => expression.push_str(&format!("[{}]", idx)),
                Err(_) => expression.push_str(&format!("['{}']", segment)),
            }
        }
        Ok(expression)
    }
}
