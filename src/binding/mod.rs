//! Binding pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext + &[BindingTarget]
//!     → per target: resolve source
//!         path/query/header/cookie → ParamSource lookups
//!         form/form-map            → form.rs (parsed once, urlencoded or multipart)
//!         json/xml/yaml            → body.rs (decoded once per encoding)
//!     → default (absent + optional) | Missing (absent + required)
//!     → coercion (target.rs)
//!     → Bound | BindingError::Invalid(all failures) | MalformedBody
//! ```
//!
//! # Design Decisions
//! - Targets are plain data, declared once per endpoint
//! - Every target is evaluated so one response lists every violation
//! - No partially populated result is ever returned
//! - A body that fails to decode stops binding at once

pub mod body;
pub mod error;
pub mod form;
pub mod target;
pub mod value;

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

pub use error::{BindingError, FieldError};
pub use form::FormData;
pub use target::{BindingTarget, BodyEncoding, Coercion, Source};
pub use value::{Bound, FieldValue};

/// Read access to the non-body parts of a request.
pub trait ParamSource {
    fn path_param(&self, name: &str) -> Option<&str>;
    /// Every value supplied for `name`, in request order.
    fn query_values(&self, name: &str) -> Vec<&str>;
    /// Case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;
    fn cookie(&self, name: &str) -> Option<&str>;
    fn content_type(&self) -> Option<&str>;
}

/// Bind `targets` against a request's parameters and its buffered body.
pub async fn bind_with<S>(
    source: &S,
    body: Bytes,
    targets: &[BindingTarget],
) -> Result<Bound, BindingError>
where
    S: ParamSource + ?Sized,
{
    let form = if targets.iter().any(|t| t.source.is_form()) {
        Some(parse_form(source, body.clone()).await?)
    } else {
        None
    };

    let mut documents: HashMap<BodyEncoding, FieldValue> = HashMap::new();
    let mut fields = BTreeMap::new();
    let mut errors = Vec::new();

    for target in targets {
        let raw = match target.source {
            Source::Path => source.path_param(&target.key).map(FieldValue::from),
            Source::Query => query_value(source.query_values(&target.key), target.coercion),
            Source::Header => source.header(&target.key).map(FieldValue::from),
            Source::Cookie => source.cookie(&target.key).map(FieldValue::from),
            Source::Form => form.as_ref().and_then(|f| f.lookup(&target.key)),
            Source::FormMap => form.as_ref().and_then(|f| f.nested(&target.key)),
            Source::Json | Source::Xml | Source::Yaml => {
                let encoding = match target.source.body_encoding() {
                    Some(encoding) => encoding,
                    None => continue,
                };
                if !documents.contains_key(&encoding) {
                    let document = body::decode(encoding, &body)?;
                    documents.insert(encoding, document);
                }
                documents
                    .get(&encoding)
                    .and_then(|doc| member(doc, &target.key))
            }
        };

        let value = match raw.filter(|v| !v.is_null()) {
            Some(value) => value,
            None if target.required => {
                errors.push(FieldError::Missing {
                    field: target.field.clone(),
                    location: target.source,
                });
                continue;
            }
            None => match &target.default {
                Some(default) => default.clone(),
                None => continue,
            },
        };

        match target.coercion.apply(&target.field, value) {
            Ok(value) => {
                fields.insert(target.field.clone(), value);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(Bound::new(fields))
    } else {
        tracing::debug!(failures = errors.len(), "binding rejected request");
        Err(BindingError::Invalid(errors))
    }
}

async fn parse_form<S>(source: &S, body: Bytes) -> Result<FormData, BindingError>
where
    S: ParamSource + ?Sized,
{
    match source.content_type() {
        Some(ct) if BodyEncoding::from_content_type(ct) == Some(BodyEncoding::Multipart) => {
            FormData::parse_multipart(ct, body).await
        }
        _ => Ok(FormData::parse_urlencoded(&body)),
    }
}

fn query_value(values: Vec<&str>, coercion: Coercion) -> Option<FieldValue> {
    match (values.as_slice(), coercion) {
        ([], _) => None,
        ([_, _, ..], Coercion::Any) => Some(FieldValue::List(
            values.into_iter().map(FieldValue::from).collect(),
        )),
        ([first, ..], _) => Some(FieldValue::from(*first)),
    }
}

/// An empty key selects the whole document.
fn member(document: &FieldValue, key: &str) -> Option<FieldValue> {
    if key.is_empty() {
        return Some(document.clone());
    }
    document.as_map().and_then(|m| m.get(key)).cloned()
}
