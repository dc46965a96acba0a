//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Chart values with deep merge semantics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML. An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            other => Ok(Self(other)),
        }
    }

    /// Deep merge another Values into this one
    ///
    /// Objects merge recursively; scalars and arrays in the overlay replace
    /// the base.
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::ValuesMerge {
                message: format!("Invalid value path '{}'", path),
            });
        }
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.0, |current, key| current.get(key))
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Scope values for a subchart
    ///
    /// The subchart sees `<subchart_name>.*` from the parent as its root
    /// values, plus `global.*` unchanged.
    pub fn scope_for_subchart(&self, subchart_name: &str) -> Values {
        let mut scoped = serde_json::Map::new();

        if let JsonValue::Object(parent) = &self.0 {
            if let Some(global) = parent.get("global") {
                scoped.insert("global".to_string(), global.clone());
            }
            if let Some(JsonValue::Object(sub)) = parent.get(subchart_name) {
                for (k, v) in sub {
                    scoped.insert(k.clone(), v.clone());
                }
            }
        }

        Values(JsonValue::Object(scoped))
    }

    /// Subchart defaults overlaid with the parent's scoped values
    pub fn for_subchart(subchart_defaults: Values, parent: &Values, subchart_name: &str) -> Values {
        let mut result = subchart_defaults;
        result.merge(&parent.scope_for_subchart(subchart_name));
        result
    }
}

fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert(key.to_string(), new_value);
        } else {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Parse `key=value` overrides into Values
///
/// Booleans, null, integers, floats and inline JSON arrays/objects are
/// typed; anything else is a string.
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesMerge {
            message: format!("Invalid set format: '{}'. Expected key=value", arg),
        })?;

        let json_value = match val {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            "null" => JsonValue::Null,
            _ => {
                if let Ok(num) = val.parse::<i64>() {
                    JsonValue::Number(num.into())
                } else if let Some(num) = val
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    JsonValue::Number(num)
                } else if val.starts_with('[') || val.starts_with('{') {
                    serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
                } else {
                    JsonValue::String(val.to_string())
                }
            }
        };

        values.set(key, json_value)?;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_empty_document() {
        assert!(Values::from_yaml("").unwrap().is_empty());
        assert!(Values::from_yaml("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_set_nested() {
        let mut values = Values::new();
        values.set("image.tag", JsonValue::String("v1".into())).unwrap();
        values.set("replicas", JsonValue::Number(3.into())).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v1");
        assert_eq!(values.get("replicas").unwrap(), 3);
        assert!(values.set("image..tag", JsonValue::Null).is_err());
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec![
            "image.tag=v2".to_string(),
            "replicas=5".to_string(),
            "debug=true".to_string(),
            "ports=[80,443]".to_string(),
        ];

        let values = parse_set_values(&args).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v2");
        assert_eq!(values.get("replicas").unwrap(), 5);
        assert_eq!(values.get("debug").unwrap(), true);
        assert_eq!(values.get("ports").unwrap(), &serde_json::json!([80, 443]));
        assert!(parse_set_values(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_scope_for_subchart() {
        let parent = Values::from_yaml(
            r#"
global:
  imageRegistry: docker.io
mariadb:
  enabled: true
  replicas: 3
memcached:
  enabled: false
"#,
        )
        .unwrap();

        let scoped = parent.scope_for_subchart("mariadb");

        assert_eq!(scoped.get("global.imageRegistry").unwrap(), "docker.io");
        assert_eq!(scoped.get("enabled").unwrap(), true);
        assert_eq!(scoped.get("replicas").unwrap(), 3);
        assert!(scoped.get("memcached").is_none());
        assert!(scoped.get("mariadb").is_none());
    }

    #[test]
    fn test_for_subchart_with_defaults() {
        let defaults = Values::from_yaml(
            r#"
replicas: 1
image:
  repository: mariadb
  tag: "11.0"
"#,
        )
        .unwrap();

        let parent = Values::from_yaml(
            r#"
global:
  pullPolicy: Always
mariadb:
  replicas: 3
"#,
        )
        .unwrap();

        let result = Values::for_subchart(defaults, &parent, "mariadb");

        assert_eq!(result.get("global.pullPolicy").unwrap(), "Always");
        assert_eq!(result.get("replicas").unwrap(), 3);
        assert_eq!(result.get("image.repository").unwrap(), "mariadb");
    }
}
