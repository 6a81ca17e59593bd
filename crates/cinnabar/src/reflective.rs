//! Serde-based default field extractor.
//!
//! Interprets a field name as a dotted path over the item's serialized
//! form: each segment matches object keys case-insensitively or indexes
//! into arrays by decimal position. Leaves render canonically: booleans as
//! `true`/`false`, integers in decimal, floats in general format with 10
//! significant digits.
//!
//! This is a convenience for callers that do not want to write a fielder
//! by hand; it costs a serialization per extraction, so hot stores should
//! prefer an explicit extractor.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::resolve::FieldFn;
use crate::store::Store;

/// A fielder that extracts dotted paths from the item's serialized form.
pub fn reflective_fielder<T: Serialize>() -> FieldFn<T> {
    Arc::new(|item: &T, field: &str| match serde_json::to_value(item) {
        Ok(value) => field_from_value(&value, field),
        Err(_) => String::new(),
    })
}

impl<T> Store<T>
where
    T: Send + Sync + fmt::Debug + Serialize + 'static,
{
    /// Use the reflective extractor as this store's capability fielder.
    /// An explicit [`Store::set_fielder`] still takes precedence.
    pub fn with_reflective_fielder(&self) -> &Self {
        self.configure("wire reflective fielder", |_| {
            self.core().resolver.set_capability_fielder(reflective_fielder::<T>());
        });
        self
    }
}

/// Resolve a dotted path against a serialized value.
pub fn field_from_value(value: &Value, field: &str) -> String {
    if field.is_empty() {
        return render_leaf(value);
    }
    let segments: Vec<&str> = field.split('.').collect();
    lookup(value, &segments)
}

fn lookup(value: &Value, path: &[&str]) -> String {
    let Some((head, rest)) = path.split_first() else {
        return render_leaf(value);
    };
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if key.eq_ignore_ascii_case(head) {
                    return lookup(nested, rest);
                }
            }
            String::new()
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) if index < items.len() => lookup(&items[index], rest),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

fn render_leaf(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format_general(n.as_f64().unwrap_or(0.0), 10)
            }
        }
        Value::String(s) => s.clone(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

/// Format a float in general notation with the given number of
/// significant digits: plain decimal for moderate exponents, scientific
/// otherwise, trailing zeros trimmed.
pub(crate) fn format_general(v: f64, sig: i32) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let exp = v.abs().log10().floor() as i32;
    if exp < -4 || exp >= sig {
        let digits = (sig - 1).max(0) as usize;
        let formatted = format!("{:.*e}", digits, v);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        let (sign, magnitude) = match exponent.strip_prefix('-') {
            Some(stripped) => ("-", stripped),
            None => ("+", exponent),
        };
        if magnitude.len() < 2 {
            format!("{mantissa}e{sign}0{magnitude}")
        } else {
            format!("{mantissa}e{sign}{magnitude}")
        }
    } else {
        let decimals = (sig - 1 - exp).max(0) as usize;
        let formatted = format!("{:.*}", decimals, v);
        if formatted.contains('.') {
            formatted
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        } else {
            formatted
        }
    }
}
