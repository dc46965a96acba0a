//! Global template functions
//!
//! Nothing here depends on time or randomness, so identical inputs always
//! render identically.

use minijinja::{Error, ErrorKind, Value};

/// Abort rendering: `{{ fail("ingress.hostname is required") }}`
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// `{{ dict("app", chart.name, "release", release.name) }}`
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "dict keys must be strings"))?;
        let value = serde_json::to_value(&pair[1])
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        map.insert(key.to_string(), value);
    }
    Ok(Value::from_serialize(&map))
}

pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// `{{ get(values.image, "tag", chart.appVersion) }}`
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() && !v.is_none() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// First argument that is neither undefined, none nor an empty string
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|v| !v.is_undefined() && !v.is_none() && v.as_str() != Some(""))
        .unwrap_or(Value::UNDEFINED)
}

pub fn ternary(when_true: Value, when_false: Value, condition: Value) -> Value {
    if condition.is_true() {
        when_true
    } else {
        when_false
    }
}

pub fn tostring(value: Value) -> String {
    value
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| value.to_string())
}

pub fn toint(value: Value) -> Result<i64, Error> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    let text = tostring(value);
    text.trim()
        .parse::<i64>()
        .or_else(|_| text.trim().parse::<f64>().map(|f| f as i64))
        .map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot convert '{}' to an integer", text),
            )
        })
}

/// `%s`, `%v`, `%d` and `%%` formatting
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    let mut out = String::with_capacity(format.len());
    let mut args = args.into_iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => out.push('%'),
            Some('%') => out.push('%'),
            Some(spec) => {
                let arg = args.next().ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidOperation,
                        "not enough arguments for format string",
                    )
                })?;
                match spec {
                    'd' => out.push_str(&toint(arg)?.to_string()),
                    _ => out.push_str(&tostring(arg)),
                }
            }
        }
    }

    Ok(out)
}
