//! Route cursors: the path a route reserves while its field options compile,
//! and the per-request view its field modifiers consume.
use std::{collections::VecDeque, fmt};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, request::Parts};
use thiserror::Error;

use crate::core::{error::RegistrationError, node::Node};

/// One path position reserved by a field option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Fixed(String),
    Variable,
}

/// Registration-time binding context of a single route.
///
/// Field options record the path positions they reserve here. The steps are
/// applied to the trie only once every field compiled, so a route that
/// fails to register leaves the trie untouched.
#[derive(Debug, Default)]
pub struct Route {
    steps: Vec<PathStep>,
    remainder: bool,
    field: String,
}

impl Route {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_field(&mut self, field: &str) {
        self.field.clear();
        self.field.push_str(field);
    }

    /// Reserve a literal segment.
    pub fn add_fixed_to_path(&mut self, literal: impl Into<String>) -> Result<(), RegistrationError> {
        self.ensure_open()?;
        self.steps.push(PathStep::Fixed(literal.into()));
        Ok(())
    }

    /// Reserve a variable segment.
    pub fn add_var_to_path(&mut self) -> Result<(), RegistrationError> {
        self.ensure_open()?;
        self.steps.push(PathStep::Variable);
        Ok(())
    }

    /// Let the route absorb any unmatched suffix. Nothing path-related may
    /// follow.
    pub fn allow_remainder(&mut self) -> Result<(), RegistrationError> {
        self.ensure_open()?;
        self.remainder = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), RegistrationError> {
        if self.remainder {
            return Err(RegistrationError::PathAfterRemainder {
                field: self.field.clone(),
            });
        }
        Ok(())
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn allows_remainder(&self) -> bool {
        self.remainder
    }

    /// Walk (creating as needed) the reserved path below `root` and bind
    /// `handler` at its end. Returns the handler it replaced, if any.
    pub(crate) fn install<H>(&self, root: &mut Node<H>, handler: H) -> Option<H> {
        let mut node = root;
        for step in &self.steps {
            node = match step {
                PathStep::Fixed(literal) => node.bind_fixed(literal),
                PathStep::Variable => node.bind_variable(),
            };
        }
        if self.remainder {
            node.mark_remainder();
        }
        node.set_handler(handler)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() && !self.remainder {
            return f.write_str("/");
        }
        for step in &self.steps {
            match step {
                PathStep::Fixed(literal) => write!(f, "/{literal}")?,
                PathStep::Variable => f.write_str("/{}")?,
            }
        }
        if self.remainder {
            f.write_str("/*")?;
        }
        Ok(())
    }
}

/// The request ran out of path segments before every path field was bound.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no path segment left to bind")]
pub struct PathExhausted;

/// Per-request state handed to field modifiers.
///
/// Holds the request head, the buffered body and a destructive cursor over
/// the path segments not yet consumed by earlier fields.
#[derive(Debug)]
pub struct RequestContext {
    parts: Parts,
    body: Bytes,
    tail: VecDeque<String>,
}

impl RequestContext {
    pub(crate) fn new(parts: Parts, body: Bytes, segments: Vec<String>) -> Self {
        Self {
            parts,
            body,
            tail: segments.into(),
        }
    }

    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn extensions(&self) -> &http::Extensions {
        &self.parts.extensions
    }

    /// The buffered request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decoded path segments not consumed yet.
    pub fn remaining_segments(&self) -> impl Iterator<Item = &str> {
        self.tail.iter().map(String::as_str)
    }

    /// Consume the next path segment.
    pub fn pop_segment(&mut self) -> Result<String, PathExhausted> {
        self.tail.pop_front().ok_or(PathExhausted)
    }

    /// Consume every remaining path segment.
    pub fn take_remaining(&mut self) -> Vec<String> {
        self.tail.drain(..).collect()
    }

    pub(crate) fn into_parts(self) -> Parts {
        self.parts
    }
}

#[cfg(test)]
pub(crate) fn test_context(method: Method, uri: &str, body: &str) -> RequestContext {
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .unwrap()
        .into_parts();
    let segments = crate::utils::path::split_path(parts.uri.path()).unwrap();
    RequestContext::new(parts, Bytes::from(body.to_string()), segments)
}
