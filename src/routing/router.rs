//! Route registry and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes per method
//! - Reject duplicate or malformed patterns at registration time
//! - Look up the most specific route for a (method, path) pair
//! - Distinguish "no such path" from "path exists under other methods"
//!
//! # Design Decisions
//! - Built once during startup, then shared immutably behind an `Arc`
//! - O(n) scan per method (acceptable for typical route counts)
//! - Longest literal prefix wins; registration order breaks remaining ties
//! - Generic over the handler type so matching stays independent of HTTP

use std::borrow::Cow;
use std::collections::HashMap;

use axum::http::Method;
use percent_encoding::percent_decode_str;

use crate::routing::error::RouteError;
use crate::routing::matcher::{PathParams, Pattern};

struct Route<H> {
    pattern: Pattern,
    handler: H,
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct Matched<'a, H> {
    pub handler: &'a H,
    pub params: PathParams,
    /// Pattern text of the selected route (used as a low-cardinality metric label).
    pub pattern: &'a str,
}

/// Registry of routes, keyed by method.
pub struct RouteRegistry<H> {
    routes: HashMap<Method, Vec<Route<H>>>,
    /// Methods in first-registration order, for stable `Allow` lists.
    methods: Vec<Method>,
}

impl<H> Default for RouteRegistry<H> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            methods: Vec::new(),
        }
    }
}

impl<H> std::fmt::Debug for RouteRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<H> RouteRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method` + `pattern`.
    pub fn register(&mut self, method: Method, pattern: &str, handler: H) -> Result<(), RouteError> {
        let pattern = Pattern::parse(pattern)?;
        let shape = pattern.shape();

        let bucket = self.routes.entry(method.clone()).or_default();
        if let Some(existing) = bucket.iter().find(|r| r.pattern.shape() == shape) {
            return Err(RouteError::DuplicateRoute {
                method,
                pattern: pattern.as_str().to_string(),
                existing: existing.pattern.as_str().to_string(),
            });
        }

        tracing::debug!(method = %method, pattern = %pattern.as_str(), "Route registered");
        bucket.push(Route { pattern, handler });
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        Ok(())
    }

    /// Scope further registrations under a path prefix.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_, H> {
        RouteGroup {
            registry: self,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Find the handler for a request.
    pub fn dispatch(&self, method: &Method, path: &str) -> Result<Matched<'_, H>, RouteError> {
        let decoded: Vec<Cow<'_, str>> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy())
            .collect();
        let segments: Vec<&str> = decoded.iter().map(|s| s.as_ref()).collect();

        if let Some(found) = self.best_match(method, &segments) {
            return Ok(found);
        }

        let allowed: Vec<Method> = self
            .methods
            .iter()
            .filter(|m| *m != method)
            .filter(|m| self.best_match(m, &segments).is_some())
            .cloned()
            .collect();

        if allowed.is_empty() {
            Err(RouteError::NotFound {
                path: path.to_string(),
            })
        } else {
            Err(RouteError::MethodNotAllowed {
                method: method.clone(),
                path: path.to_string(),
                allowed,
            })
        }
    }

    fn best_match(&self, method: &Method, segments: &[&str]) -> Option<Matched<'_, H>> {
        let mut best: Option<(&Route<H>, PathParams)> = None;

        for route in self.routes.get(method)? {
            let Some(params) = route.pattern.matches(segments) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _)) => route.pattern.specificity() > current.pattern.specificity(),
            };
            if better {
                best = Some((route, params));
            }
        }

        best.map(|(route, params)| Matched {
            handler: &route.handler,
            params,
            pattern: route.pattern.as_str(),
        })
    }

    /// All registered (method, pattern) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.methods.iter().flat_map(move |m| {
            self.routes
                .get(m)
                .into_iter()
                .flatten()
                .map(move |r| (m, r.pattern.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registration helper that prefixes every pattern.
pub struct RouteGroup<'a, H> {
    registry: &'a mut RouteRegistry<H>,
    prefix: String,
}

impl<H> RouteGroup<'_, H> {
    pub fn route(&mut self, method: Method, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        let full = if pattern == "/" || pattern.is_empty() {
            if self.prefix.is_empty() {
                "/".to_string()
            } else {
                self.prefix.clone()
            }
        } else {
            format!("{}{}", self.prefix, pattern)
        };
        self.registry.register(method, &full, handler)?;
        Ok(self)
    }

    pub fn get(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.route(Method::DELETE, pattern, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(routes: &[(Method, &str, &'static str)]) -> RouteRegistry<&'static str> {
        let mut r = RouteRegistry::new();
        for (m, p, h) in routes {
            r.register(m.clone(), p, *h).unwrap();
        }
        r
    }

    #[test]
    fn literal_route_beats_parameter_route() {
        let r = registry(&[
            (Method::GET, "/items/:id", "by_id"),
            (Method::GET, "/items/active", "active"),
        ]);
        let m = r.dispatch(&Method::GET, "/items/active").unwrap();
        assert_eq!(*m.handler, "active");
        assert!(m.params.is_empty());

        let m = r.dispatch(&Method::GET, "/items/42").unwrap();
        assert_eq!(*m.handler, "by_id");
        assert_eq!(m.params.get("id"), Some("42"));
    }

    #[test]
    fn specificity_does_not_depend_on_registration_order() {
        let r = registry(&[
            (Method::GET, "/get/download/a.log", "literal"),
            (Method::GET, "/get/:a/:b", "generic"),
            (Method::GET, "/get/download/:file", "download"),
        ]);
        assert_eq!(*r.dispatch(&Method::GET, "/get/download/a.log").unwrap().handler, "literal");
        assert_eq!(*r.dispatch(&Method::GET, "/get/download/b.log").unwrap().handler, "download");
        assert_eq!(*r.dispatch(&Method::GET, "/get/x/y").unwrap().handler, "generic");
    }

    #[test]
    fn duplicate_shapes_are_rejected() {
        let mut r = registry(&[(Method::GET, "/items/:id", "a")]);
        let err = r.register(Method::GET, "/items/{other}", "b").unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute { .. }));
        // same shape under another method is fine
        r.register(Method::DELETE, "/items/:id", "c").unwrap();
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn malformed_patterns_fail_registration() {
        let mut r: RouteRegistry<()> = RouteRegistry::new();
        assert!(matches!(
            r.register(Method::GET, "/items/{id", ()),
            Err(RouteError::InvalidPattern { .. })
        ));
        assert!(r.is_empty());
    }

    #[test]
    fn not_found_versus_method_not_allowed() {
        let r = registry(&[
            (Method::GET, "/items/:id", "get"),
            (Method::DELETE, "/items/:id", "delete"),
        ]);
        match r.dispatch(&Method::POST, "/items/1").unwrap_err() {
            RouteError::MethodNotAllowed { allowed, .. } => {
                assert_eq!(allowed, vec![Method::GET, Method::DELETE]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            r.dispatch(&Method::GET, "/nothing/here").unwrap_err(),
            RouteError::NotFound { .. }
        ));
    }

    #[test]
    fn path_params_are_percent_decoded() {
        let r = registry(&[(Method::GET, "/files/:name", "f")]);
        let m = r.dispatch(&Method::GET, "/files/my%20report.txt").unwrap();
        assert_eq!(m.params.get("name"), Some("my report.txt"));
    }

    #[test]
    fn empty_segments_are_ignored() {
        let r = registry(&[(Method::GET, "/a/b", "ab"), (Method::GET, "/", "root")]);
        assert_eq!(*r.dispatch(&Method::GET, "//a//b/").unwrap().handler, "ab");
        assert_eq!(*r.dispatch(&Method::GET, "/").unwrap().handler, "root");
    }

    #[test]
    fn groups_prefix_patterns() {
        let mut r = RouteRegistry::new();
        r.group("/api/v1/")
            .get("/get", "get")
            .unwrap()
            .post("/post/:id", "post")
            .unwrap()
            .get("/", "index")
            .unwrap();
        assert_eq!(*r.dispatch(&Method::GET, "/api/v1/get").unwrap().handler, "get");
        assert_eq!(*r.dispatch(&Method::POST, "/api/v1/post/7").unwrap().handler, "post");
        assert_eq!(*r.dispatch(&Method::GET, "/api/v1").unwrap().handler, "index");
        let listed: Vec<_> = r.iter().map(|(m, p)| format!("{m} {p}")).collect();
        assert_eq!(listed, vec!["GET /api/v1/get", "GET /api/v1", "POST /api/v1/post/:id"]);
    }

    #[test]
    fn wildcard_captures_remainder() {
        let r = registry(&[
            (Method::GET, "/static/*path", "static"),
            (Method::GET, "/static/index.html", "index"),
        ]);
        let m = r.dispatch(&Method::GET, "/static/js/app.js").unwrap();
        assert_eq!(*m.handler, "static");
        assert_eq!(m.params.get("path"), Some("js/app.js"));
        assert_eq!(*r.dispatch(&Method::GET, "/static/index.html").unwrap().handler, "index");
    }
}
