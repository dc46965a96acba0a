//! Template filters for manifest authoring

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use semver::{Version, VersionReq};
use sha2::{Digest, Sha256};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

fn as_text(value: &Value) -> String {
    value
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| value.to_string())
}

/// `{{ values.resources | toyaml }}`
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// `{{ values.config | tojson }}`
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("decoded value is not UTF-8: {}", e)))
}

/// Double-quote, escaping backslashes and quotes
pub fn quote(value: Value) -> String {
    let s = as_text(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Single-quote, YAML style
pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line by `spaces`
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like `indent`, with a leading newline
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail rendering when the value is undefined, none or an empty string
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().map(str::is_empty).unwrap_or(false);
    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    match value.len() {
        Some(len) => len == 0,
        None => value.as_str().map(str::is_empty).unwrap_or(false),
    }
}

/// `{% if values.ingress | haskey("tls") %}`
pub fn haskey(value: Value, key: String) -> bool {
    value
        .get_attr(&key)
        .map(|v| !v.is_undefined())
        .unwrap_or(false)
}

pub fn keys(value: Value) -> Result<Vec<String>, Error> {
    let iter = value
        .try_iter()
        .map_err(|_| invalid("cannot get keys from non-mapping value"))?;
    let mut keys: Vec<String> = iter.filter_map(|v| v.as_str().map(String::from)).collect();
    keys.sort();
    Ok(keys)
}

/// Deep merge, `overlay` wins
pub fn merge(base: Value, overlay: Value) -> Result<Value, Error> {
    let mut merged = chartpipe_core::Values(to_json(&base)?);
    merged.merge(&chartpipe_core::Values(to_json(&overlay)?));
    Ok(Value::from_serialize(merged.inner()))
}

/// Hex-encoded sha256 of the string
pub fn sha256(value: String) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Truncate to `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value
        .strip_prefix(prefix.as_str())
        .map(String::from)
        .unwrap_or(value)
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value
        .strip_suffix(suffix.as_str())
        .map(String::from)
        .unwrap_or(value)
}

/// `{{ capabilities.kubeVersion.version | semver_match(">=1.21.0-0") }}`
///
/// Pre-release and provider suffixes on the version are ignored.
pub fn semver_match(version: Value, constraint: String) -> Result<bool, Error> {
    let raw = version
        .as_str()
        .ok_or_else(|| invalid("version must be a string"))?;
    let version = parse_loose_version(raw)
        .ok_or_else(|| invalid(format!("invalid version '{}'", raw)))?;
    let req = VersionReq::parse(constraint.trim())
        .map_err(|e| invalid(format!("invalid constraint '{}': {}", constraint, e)))?;
    Ok(req.matches(&version))
}

/// `v1.23.10-gke.100` -> `1.23.10`, `1.24` -> `1.24.0`
pub fn parse_loose_version(raw: &str) -> Option<Version> {
    let core = raw.trim_start_matches('v');
    let core = core.split(['-', '+']).next().unwrap_or(core);
    let mut parts = core.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some(Version::new(major, minor, patch))
}
