//! Binding target declarations.
//!
//! Targets are declared once per endpoint and never change afterwards:
//!
//! ```
//! use web_scaffold::binding::BindingTarget;
//!
//! let targets = [
//!     BindingTarget::path("id").integer().required(),
//!     BindingTarget::query("page").integer().default_value(1i64),
//!     BindingTarget::form_map("user").required(),
//! ];
//! # let _ = targets;
//! ```

use std::fmt;

use crate::binding::error::FieldError;
use crate::binding::value::FieldValue;

/// Where a target's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    /// Plain form key, or nested `key[sub]` entries collected into a map.
    Form,
    /// Nested `key[sub]` entries only.
    FormMap,
    Json,
    Xml,
    Yaml,
}

impl Source {
    pub fn body_encoding(self) -> Option<BodyEncoding> {
        match self {
            Source::Json => Some(BodyEncoding::Json),
            Source::Xml => Some(BodyEncoding::Xml),
            Source::Yaml => Some(BodyEncoding::Yaml),
            _ => None,
        }
    }

    pub fn is_form(self) -> bool {
        matches!(self, Source::Form | Source::FormMap)
    }

    /// Whether binding this source needs the request body.
    pub fn reads_body(self) -> bool {
        self.is_form() || self.body_encoding().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Path => "path",
            Source::Query => "query",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Form => "form",
            Source::FormMap => "form-map",
            Source::Json => "json-body",
            Source::Xml => "xml-body",
            Source::Yaml => "yaml-body",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body encodings understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyEncoding {
    UrlEncoded,
    Multipart,
    Json,
    Xml,
    Yaml,
}

impl BodyEncoding {
    pub fn mime(self) -> &'static str {
        match self {
            BodyEncoding::UrlEncoded => "application/x-www-form-urlencoded",
            BodyEncoding::Multipart => "multipart/form-data",
            BodyEncoding::Json => "application/json",
            BodyEncoding::Xml => "application/xml",
            BodyEncoding::Yaml => "application/x-yaml",
        }
    }

    /// Negotiate from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/x-www-form-urlencoded" => Some(BodyEncoding::UrlEncoded),
            "multipart/form-data" => Some(BodyEncoding::Multipart),
            "application/json" => Some(BodyEncoding::Json),
            "application/xml" | "text/xml" => Some(BodyEncoding::Xml),
            "application/x-yaml" | "application/yaml" | "text/yaml" => Some(BodyEncoding::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BodyEncoding::UrlEncoded => "urlencoded form",
            BodyEncoding::Multipart => "multipart form",
            BodyEncoding::Json => "JSON",
            BodyEncoding::Xml => "XML",
            BodyEncoding::Yaml => "YAML",
        })
    }
}

/// How a raw value is converted before it lands in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    /// Strict base-10 signed integer.
    Integer,
    Float,
    /// `true`/`false`/`1`/`0`.
    Bool,
    /// Keep whatever structure the source produced.
    Any,
}

impl Coercion {
    pub fn expected(self) -> &'static str {
        match self {
            Coercion::Text => "string",
            Coercion::Integer => "integer",
            Coercion::Float => "number",
            Coercion::Bool => "boolean",
            Coercion::Any => "any value",
        }
    }

    pub(crate) fn apply(self, field: &str, value: FieldValue) -> Result<FieldValue, FieldError> {
        let mismatch = |value: &FieldValue| FieldError::TypeMismatch {
            field: field.to_string(),
            expected: self.expected(),
            got: value.describe(),
        };

        match (self, value) {
            (Coercion::Any, v) => Ok(v),
            (Coercion::Text, v @ FieldValue::Text(_)) => Ok(v),
            (Coercion::Integer, v @ FieldValue::Integer(_)) => Ok(v),
            (Coercion::Integer, FieldValue::Text(s)) => match parse_decimal(&s) {
                Some(i) => Ok(FieldValue::Integer(i)),
                None => Err(mismatch(&FieldValue::Text(s))),
            },
            (Coercion::Float, v @ FieldValue::Float(_)) => Ok(v),
            (Coercion::Float, FieldValue::Integer(i)) => Ok(FieldValue::Float(i as f64)),
            (Coercion::Float, FieldValue::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() && s.trim() == s => Ok(FieldValue::Float(f)),
                _ => Err(mismatch(&FieldValue::Text(s))),
            },
            (Coercion::Bool, v @ FieldValue::Bool(_)) => Ok(v),
            (Coercion::Bool, FieldValue::Text(s)) => match s.as_str() {
                "true" | "1" => Ok(FieldValue::Bool(true)),
                "false" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(mismatch(&FieldValue::Text(s))),
            },
            (_, v) => Err(mismatch(&v)),
        }
    }
}

/// Optional sign followed by ASCII digits only; no whitespace, no radix prefixes.
fn parse_decimal(s: &str) -> Option<i64> {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// A declared field-to-source mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingTarget {
    /// Name in the bound result.
    pub field: String,
    /// Lookup key in the source; usually equal to `field`.
    pub key: String,
    pub source: Source,
    pub required: bool,
    pub default: Option<FieldValue>,
    pub coercion: Coercion,
}

impl BindingTarget {
    pub fn new(field: impl Into<String>, source: Source) -> Self {
        let field = field.into();
        let coercion = match source {
            Source::Path | Source::Query | Source::Header | Source::Cookie => Coercion::Text,
            Source::Form | Source::FormMap | Source::Json | Source::Xml | Source::Yaml => {
                Coercion::Any
            }
        };
        Self {
            key: field.clone(),
            field,
            source,
            required: false,
            default: None,
            coercion,
        }
    }

    pub fn path(field: impl Into<String>) -> Self {
        Self::new(field, Source::Path)
    }

    pub fn query(field: impl Into<String>) -> Self {
        Self::new(field, Source::Query)
    }

    pub fn header(field: impl Into<String>) -> Self {
        Self::new(field, Source::Header)
    }

    pub fn cookie(field: impl Into<String>) -> Self {
        Self::new(field, Source::Cookie)
    }

    pub fn form(field: impl Into<String>) -> Self {
        Self::new(field, Source::Form)
    }

    pub fn form_map(field: impl Into<String>) -> Self {
        Self::new(field, Source::FormMap)
    }

    pub fn json(field: impl Into<String>) -> Self {
        Self::new(field, Source::Json)
    }

    pub fn xml(field: impl Into<String>) -> Self {
        Self::new(field, Source::Xml)
    }

    pub fn yaml(field: impl Into<String>) -> Self {
        Self::new(field, Source::Yaml)
    }

    /// Read from a differently named key (e.g. header `X-Token` into `token`).
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn coerce(mut self, coercion: Coercion) -> Self {
        self.coercion = coercion;
        self
    }

    pub fn text(self) -> Self {
        self.coerce(Coercion::Text)
    }

    pub fn integer(self) -> Self {
        self.coerce(Coercion::Integer)
    }

    pub fn float(self) -> Self {
        self.coerce(Coercion::Float)
    }

    pub fn boolean(self) -> Self {
        self.coerce(Coercion::Bool)
    }

    pub fn any(self) -> Self {
        self.coerce(Coercion::Any)
    }
}
