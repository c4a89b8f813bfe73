//! Explicit parameter schemas.
//!
//! Each tool declares its parameters as a value, not via reflection; the
//! dispatcher walks the declaration uniformly. Option sets are closed:
//! unknown keys fail validation, as do out-of-range numbers, oversized
//! strings, unknown enum members, disallowed URL schemes, and path
//! components that try to escape their directory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::error::ControlError;

/// Printable, non-control selector text. Anything outside this set is more
/// likely an injection attempt than a working selector.
static SELECTOR_SYNTAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\x00-\x1f\x7f]+$").unwrap());

/// Caps applied to string-ish fields unless the spec overrides them.
const DEFAULT_STRING_CAP: usize = 8192;
const SELECTOR_CAP: usize = 1024;
const URL_CAP: usize = 2048;

/// Schemes a URL-typed parameter may carry.
pub const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https"];

/// How much of an offending value survives into an error envelope.
const VALUE_SNIPPET_CAP: usize = 128;

#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Bool,
    Integer,
    Number,
    /// http(s) URL, scheme-checked before any session is bound.
    Url,
    /// CSS or `xpath=`-prefixed selector.
    Selector,
    /// Closed set of accepted strings.
    Enum(&'static [&'static str]),
    /// A single path component for artifact names; traversal rejected.
    FileStem,
    Object,
    Array,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub max_len: Option<usize>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Redact the offending value in validation errors.
    pub secret: bool,
}

impl FieldSpec {
    fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            max_len: None,
            min: None,
            max: None,
            secret: false,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn url(name: &'static str) -> Self {
        Self::new(name, FieldType::Url)
    }

    pub fn selector(name: &'static str) -> Self {
        Self::new(name, FieldType::Selector)
    }

    pub fn one_of(name: &'static str, members: &'static [&'static str]) -> Self {
        Self::new(name, FieldType::Enum(members))
    }

    pub fn file_stem(name: &'static str) -> Self {
        Self::new(name, FieldType::FileStem)
    }

    pub fn object(name: &'static str) -> Self {
        Self::new(name, FieldType::Object)
    }

    pub fn array(name: &'static str) -> Self {
        Self::new(name, FieldType::Array)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn max_len(mut self, cap: usize) -> Self {
        self.max_len = Some(cap);
        self
    }

    #[must_use]
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// A tool's declared parameter shape.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    fields: Vec<FieldSpec>,
}

impl ParamSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A schema that takes no parameters at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate `params` against the declaration. The first violation is
    /// returned with the field name and a sanitized value.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<(), ControlError> {
        for key in params.keys() {
            if !self.fields.iter().any(|f| f.name == key) {
                return Err(ControlError::validation(
                    key.clone(),
                    None,
                    "unrecognized parameter",
                ));
            }
        }

        for spec in &self.fields {
            let value = params.get(spec.name);
            match value {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(ControlError::validation(
                            spec.name,
                            None,
                            "required parameter is missing",
                        ));
                    }
                }
                Some(value) => self.validate_field(spec, value)?,
            }
        }
        Ok(())
    }

    fn validate_field(&self, spec: &FieldSpec, value: &Value) -> Result<(), ControlError> {
        let fail = |reason: String| {
            let shown = if spec.secret {
                None
            } else {
                Some(snippet(value))
            };
            Err(ControlError::validation(spec.name, shown, reason))
        };

        match &spec.field_type {
            FieldType::Bool => {
                if !value.is_boolean() {
                    return fail("expected a boolean".to_string());
                }
            }
            FieldType::Integer => {
                let Some(n) = value.as_i64() else {
                    return fail("expected an integer".to_string());
                };
                if let Some(min) = spec.min {
                    if n < min {
                        return fail(format!("must be at least {min}"));
                    }
                }
                if let Some(max) = spec.max {
                    if n > max {
                        return fail(format!("must be at most {max}"));
                    }
                }
            }
            FieldType::Number => {
                if value.as_f64().is_none() {
                    return fail("expected a number".to_string());
                }
            }
            FieldType::String => {
                let Some(s) = value.as_str() else {
                    return fail("expected a string".to_string());
                };
                let cap = spec.max_len.unwrap_or(DEFAULT_STRING_CAP);
                if s.len() > cap {
                    return fail(format!("exceeds {cap} byte cap"));
                }
            }
            FieldType::Url => {
                let Some(s) = value.as_str() else {
                    return fail("expected a URL string".to_string());
                };
                if s.len() > spec.max_len.unwrap_or(URL_CAP) {
                    return fail("URL is too long".to_string());
                }
                let parsed = match Url::parse(s) {
                    Ok(parsed) => parsed,
                    Err(err) => return fail(format!("not a valid URL: {err}")),
                };
                if !ALLOWED_URL_SCHEMES.contains(&parsed.scheme()) {
                    return fail(format!(
                        "scheme `{}` is not allowed (use http or https)",
                        parsed.scheme()
                    ));
                }
            }
            FieldType::Selector => {
                let Some(s) = value.as_str() else {
                    return fail("expected a selector string".to_string());
                };
                if s.trim().is_empty() {
                    return fail("selector is empty".to_string());
                }
                if s.len() > spec.max_len.unwrap_or(SELECTOR_CAP) {
                    return fail("selector is too long".to_string());
                }
                if !SELECTOR_SYNTAX.is_match(s) {
                    return fail("selector contains control characters".to_string());
                }
            }
            FieldType::Enum(members) => {
                let Some(s) = value.as_str() else {
                    return fail("expected a string".to_string());
                };
                if !members.contains(&s) {
                    return fail(format!("must be one of: {}", members.join(", ")));
                }
            }
            FieldType::FileStem => {
                let Some(s) = value.as_str() else {
                    return fail("expected a file name string".to_string());
                };
                if s.is_empty() || s.len() > 128 {
                    return fail("file name must be 1..=128 bytes".to_string());
                }
                if s.contains("..") || s.contains('/') || s.contains('\\') || s.contains('\0') {
                    return fail("file name may not contain path separators".to_string());
                }
            }
            FieldType::Object => {
                if !value.is_object() {
                    return fail("expected an object".to_string());
                }
            }
            FieldType::Array => {
                if !value.is_array() {
                    return fail("expected an array".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Sanitized rendering of a value for the error envelope.
fn snippet(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if raw.len() > VALUE_SNIPPET_CAP {
        let cut = raw
            .char_indices()
            .take_while(|(i, _)| *i < VALUE_SNIPPET_CAP)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}…", &raw[..cut])
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unknown_keys_fail_the_closed_set() {
        let schema = ParamSchema::new().field(FieldSpec::url("url").required());
        let err = schema
            .validate(&params(json!({ "url": "https://x.test/", "wat": 1 })))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(err.to_string().contains("wat"));
    }

    #[test]
    fn url_scheme_allow_list_is_enforced() {
        let schema = ParamSchema::new().field(FieldSpec::url("url").required());
        assert!(schema
            .validate(&params(json!({ "url": "https://example.test/" })))
            .is_ok());

        let err = schema
            .validate(&params(json!({ "url": "file:///etc/passwd" })))
            .unwrap_err();
        let crate::error::ControlError::Validation { field, value, .. } = &err else {
            panic!("expected validation error");
        };
        assert_eq!(field, "url");
        assert_eq!(value.as_deref(), Some("file:///etc/passwd"));
    }

    #[test]
    fn integer_ranges_and_enums_are_checked() {
        let schema = ParamSchema::new()
            .field(FieldSpec::integer("count").range(1, 10))
            .field(FieldSpec::one_of("kind", &["chromium", "firefox"]));

        assert!(schema
            .validate(&params(json!({ "count": 5, "kind": "firefox" })))
            .is_ok());
        assert!(schema.validate(&params(json!({ "count": 0 }))).is_err());
        assert!(schema
            .validate(&params(json!({ "kind": "safari" })))
            .is_err());
    }

    #[test]
    fn traversal_is_rejected_in_file_stems() {
        let schema = ParamSchema::new().field(FieldSpec::file_stem("name"));
        assert!(schema.validate(&params(json!({ "name": "shot-1" }))).is_ok());
        assert!(schema
            .validate(&params(json!({ "name": "../../etc/cron.d/x" })))
            .is_err());
    }

    #[test]
    fn secret_fields_redact_their_value() {
        let schema = ParamSchema::new().field(FieldSpec::string("token").secret().max_len(4));
        let err = schema
            .validate(&params(json!({ "token": "super-secret-material" })))
            .unwrap_err();
        let crate::error::ControlError::Validation { value, .. } = &err else {
            panic!("expected validation error");
        };
        assert!(value.is_none());
    }
}
