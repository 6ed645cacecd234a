//! Route pattern parsing and matching logic.
//!
//! # Responsibilities
//! - Parse pattern text into literal / parameter / wildcard segments
//! - Match a segmented request path against a pattern
//! - Rank patterns by specificity for tie-breaking
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Parameters accept `:id` and `{id}`; wildcards `*rest` and `{*rest}`
//! - A wildcard must be the last segment and captures one or more segments
//! - No regex to guarantee O(n) matching

use std::cmp::Ordering;

use crate::routing::error::RouteError;

/// One element of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// Segment kind with parameter names erased. Two patterns with equal
/// shapes match exactly the same set of paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SegmentShape {
    Literal(String),
    Param,
    Wildcard,
}

/// Path parameters captured during a match, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ranking key: larger is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    literal_prefix: usize,
    literals: usize,
    no_wildcard: bool,
}

/// A parsed route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern such as `/items/:id` or `/files/{*path}`.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| RouteError::invalid(raw, "pattern must start with '/'"))?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                segments.push(parse_segment(raw, part)?);
            }
        }

        let mut names: Vec<&str> = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let name = match segment {
                Segment::Literal(_) => continue,
                Segment::Param(name) => name,
                Segment::Wildcard(name) => {
                    if i + 1 != segments.len() {
                        return Err(RouteError::invalid(raw, "wildcard must be the last segment"));
                    }
                    name
                }
            };
            if names.contains(&name.as_str()) {
                return Err(RouteError::invalid(
                    raw,
                    format!("parameter '{}' appears more than once", name),
                ));
            }
            names.push(name);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn shape(&self) -> Vec<SegmentShape> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => SegmentShape::Literal(l.clone()),
                Segment::Param(_) => SegmentShape::Param,
                Segment::Wildcard(_) => SegmentShape::Wildcard,
            })
            .collect()
    }

    /// Literal segments before the first parameter or wildcard.
    pub fn literal_prefix_len(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    pub fn specificity(&self) -> Specificity {
        Specificity {
            literal_prefix: self.literal_prefix_len(),
            literals: self
                .segments
                .iter()
                .filter(|s| matches!(s, Segment::Literal(_)))
                .count(),
            no_wildcard: !matches!(self.segments.last(), Some(Segment::Wildcard(_))),
        }
    }

    /// Compare two patterns; `Ordering::Greater` means `self` is preferred.
    pub fn compare_specificity(&self, other: &Pattern) -> Ordering {
        self.specificity().cmp(&other.specificity())
    }

    /// Match already-split, already-decoded path segments.
    pub fn matches(&self, path: &[&str]) -> Option<PathParams> {
        let mut params = PathParams::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if path.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = path.get(i)?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), *value);
                }
                Segment::Wildcard(name) => {
                    if path.len() <= i {
                        return None;
                    }
                    params.insert(name.clone(), path[i..].join("/"));
                    return Some(params);
                }
            }
        }

        if path.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

fn parse_segment(raw: &str, part: &str) -> Result<Segment, RouteError> {
    if part.is_empty() {
        return Err(RouteError::invalid(raw, "empty path segment"));
    }

    if let Some(inner) = part.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| RouteError::invalid(raw, format!("unterminated parameter '{}'", part)))?;
        return match inner.strip_prefix('*') {
            Some(name) => Ok(Segment::Wildcard(param_name(raw, part, name)?)),
            None => Ok(Segment::Param(param_name(raw, part, inner)?)),
        };
    }
    if let Some(name) = part.strip_prefix(':') {
        return Ok(Segment::Param(param_name(raw, part, name)?));
    }
    if let Some(name) = part.strip_prefix('*') {
        return Ok(Segment::Wildcard(param_name(raw, part, name)?));
    }
    if part.contains('{') || part.contains('}') {
        return Err(RouteError::invalid(raw, format!("unbalanced brace in '{}'", part)));
    }

    Ok(Segment::Literal(part.to_string()))
}

fn param_name(raw: &str, part: &str, name: &str) -> Result<String, RouteError> {
    if name.is_empty() {
        return Err(RouteError::invalid(raw, format!("empty parameter name in '{}'", part)));
    }
    if name.contains(['{', '}', ':', '*']) {
        return Err(RouteError::invalid(raw, format!("malformed parameter '{}'", part)));
    }
    Ok(name.to_string())
}
