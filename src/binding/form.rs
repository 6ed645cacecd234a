//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.
//!
//! Keys may use bracket notation. `user[name]=John&user[age]=30` yields the
//! map `{name: "John", age: "30"}` under `user`; `tags[]=a&tags[]=b` yields a
//! list. The first value wins when a scalar key repeats.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;

use crate::binding::error::BindingError;
use crate::binding::target::BodyEncoding;
use crate::binding::value::FieldValue;

/// Ordered key/value pairs of a decoded form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_urlencoded(body: &[u8]) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(body).into_owned().collect(),
        }
    }

    /// Collect the text parts of a multipart body. File parts are skipped.
    pub async fn parse_multipart(content_type: &str, body: Bytes) -> Result<Self, BindingError> {
        let request = Request::builder()
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .map_err(|e| BindingError::malformed(BodyEncoding::Multipart, e))?;
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| BindingError::malformed(BodyEncoding::Multipart, e.body_text()))?;

        let mut form = Self::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| BindingError::malformed(BodyEncoding::Multipart, e.body_text()))?
        {
            if field.file_name().is_some() {
                continue;
            }
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field
                .text()
                .await
                .map_err(|e| BindingError::malformed(BodyEncoding::Multipart, e.body_text()))?;
            form.push(name, value);
        }
        Ok(form)
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Structure built from every `root[...]` key, if any exist.
    pub fn nested(&self, root: &str) -> Option<FieldValue> {
        let mut node = FieldValue::Null;
        for (key, value) in &self.pairs {
            let Some((name, path)) = split_key(key) else {
                continue;
            };
            if name == root {
                insert(&mut node, &path, value);
            }
        }
        (!node.is_null()).then_some(node)
    }

    /// Plain key first, then bracket notation.
    pub fn lookup(&self, key: &str) -> Option<FieldValue> {
        self.first(key)
            .map(FieldValue::from)
            .or_else(|| self.nested(key))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// `user[name][first]` → (`user`, [`name`, `first`]). Plain keys yield `None`.
fn split_key(key: &str) -> Option<(&str, Vec<&str>)> {
    let open = key.find('[')?;
    let (name, mut rest) = key.split_at(open);
    if name.is_empty() {
        return None;
    }

    let mut path = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        path.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    Some((name, path))
}

fn insert(node: &mut FieldValue, path: &[&str], value: &str) {
    let Some((head, tail)) = path.split_first() else {
        if node.is_null() {
            *node = FieldValue::Text(value.to_string());
        }
        return;
    };

    if head.is_empty() {
        if node.is_null() {
            *node = FieldValue::List(Vec::new());
        }
        if let FieldValue::List(items) = node {
            let mut child = FieldValue::Null;
            insert(&mut child, tail, value);
            items.push(child);
        }
        return;
    }

    if node.is_null() {
        *node = FieldValue::Map(BTreeMap::new());
    }
    if let FieldValue::Map(map) = node {
        let child = map.entry(head.to_string()).or_insert(FieldValue::Null);
        insert(child, tail, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn nested_keys_build_maps() {
        let form = FormData::parse_urlencoded(b"user%5Bname%5D=John&user[age]=30&other=x");
        let user = form.nested("user").unwrap();
        let map = user.as_map().unwrap();
        assert_eq!(map.get("name"), Some(&text("John")));
        assert_eq!(map.get("age"), Some(&text("30")));
        assert_eq!(map.len(), 2);
        assert!(form.nested("other").is_none());
    }

    #[test]
    fn deep_nesting_and_lists() {
        let form = FormData::parse_urlencoded(
            b"info[address][city]=Paris&tags[]=a&tags[]=b&info[name]=x&info[name]=y",
        );
        let info = form.nested("info").unwrap();
        let city = info.as_map().unwrap()["address"].as_map().unwrap()["city"].clone();
        assert_eq!(city, text("Paris"));
        // first scalar wins
        assert_eq!(info.as_map().unwrap()["name"], text("x"));
        assert_eq!(form.nested("tags").unwrap(), FieldValue::List(vec![text("a"), text("b")]));
    }

    #[test]
    fn plain_keys_take_the_first_value() {
        let form = FormData::parse_urlencoded(b"name=John+Doe&name=Other&age=");
        assert_eq!(form.lookup("name"), Some(text("John Doe")));
        assert_eq!(form.all("name").len(), 2);
        assert_eq!(form.lookup("age"), Some(text("")));
        assert_eq!(form.lookup("missing"), None);
    }

    #[test]
    fn unbalanced_brackets_are_plain_keys() {
        assert_eq!(split_key("user[name"), None);
        assert_eq!(split_key("[name]"), None);
        assert_eq!(split_key("a[b]c"), None);
        assert_eq!(split_key("a[b][]"), Some(("a", vec!["b", ""])));
    }

    #[tokio::test]
    async fn multipart_text_fields_are_collected() {
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"user[name]\"\r\n\r\n",
            "John\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"user[age]\"\r\n\r\n",
            "30\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "ignored\r\n",
            "--XBOUNDARY--\r\n",
        );
        let form = FormData::parse_multipart(
            "multipart/form-data; boundary=XBOUNDARY",
            Bytes::from_static(body.as_bytes()),
        )
        .await
        .unwrap();

        let user = form.nested("user").unwrap();
        assert_eq!(user.as_map().unwrap()["name"], text("John"));
        assert_eq!(user.as_map().unwrap()["age"], text("30"));
        assert!(form.first("file").is_none());
    }

    #[tokio::test]
    async fn multipart_without_boundary_is_malformed() {
        let err = FormData::parse_multipart("multipart/form-data", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BindingError::MalformedBody {
                encoding: BodyEncoding::Multipart,
                ..
            }
        ));
    }
}
