//! Segment trie used to resolve a request path to a route handler.
//!
//! Each node may hold literal children, a single variable child and a
//! catch-all flag. Lookup prefers the literal child; when that whole subtree
//! misses, the same node tries its variable child and then its catch-all
//! flag before reporting a miss to its parent. Nodes are only created
//! while routes register. Once the router is frozen the trie is read-only
//! and shared across requests without locking; mutating it while serving
//! is a precondition violation.
use std::collections::HashMap;

use http::Method;

/// A position in the path hierarchy.
#[derive(Debug)]
pub struct Node<H> {
    statics: HashMap<String, Node<H>>,
    dynamic: Option<Box<Node<H>>>,
    allow_remainder: bool,
    handler: Option<H>,
}

impl<H> Default for Node<H> {
    fn default() -> Self {
        Self {
            statics: HashMap::new(),
            dynamic: None,
            allow_remainder: false,
            handler: None,
        }
    }
}

impl<H> Node<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend into the literal child for `literal`, creating it if absent.
    pub fn bind_fixed(&mut self, literal: &str) -> &mut Node<H> {
        self.statics.entry(literal.to_string()).or_default()
    }

    /// Descend into the variable child, creating it if absent.
    pub fn bind_variable(&mut self) -> &mut Node<H> {
        self.dynamic.get_or_insert_with(Box::default)
    }

    /// Let this node absorb any deeper, otherwise unmatched suffix.
    pub fn mark_remainder(&mut self) {
        self.allow_remainder = true;
    }

    /// Bind the terminal handler, returning the one it replaced.
    ///
    /// Re-registering the same position is not rejected; the later handler
    /// wins.
    pub fn set_handler(&mut self, handler: H) -> Option<H> {
        self.handler.replace(handler)
    }

    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    pub fn allows_remainder(&self) -> bool {
        self.allow_remainder
    }

    /// Resolve `segments` below this node.
    pub fn lookup<S: AsRef<str>>(&self, segments: &[S]) -> Option<&H> {
        let Some((first, rest)) = segments.split_first() else {
            return self.handler.as_ref();
        };

        if let Some(found) = self
            .statics
            .get(first.as_ref())
            .and_then(|child| child.lookup(rest))
        {
            return Some(found);
        }

        if let Some(found) = self.dynamic.as_ref().and_then(|child| child.lookup(rest)) {
            return Some(found);
        }

        if self.allow_remainder {
            return self.handler.as_ref();
        }

        None
    }
}

/// Per-method trie roots. GET and HEAD share a root.
#[derive(Debug)]
pub struct MethodRoots<H> {
    get: Node<H>,
    post: Node<H>,
    put: Node<H>,
    delete: Node<H>,
}

impl<H> Default for MethodRoots<H> {
    fn default() -> Self {
        Self {
            get: Node::new(),
            post: Node::new(),
            put: Node::new(),
            delete: Node::new(),
        }
    }
}

impl<H> MethodRoots<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root serving `method`, `None` for methods that never match.
    pub fn root(&self, method: &Method) -> Option<&Node<H>> {
        match *method {
            Method::GET | Method::HEAD => Some(&self.get),
            Method::POST => Some(&self.post),
            Method::PUT => Some(&self.put),
            Method::DELETE => Some(&self.delete),
            _ => None,
        }
    }

    pub fn root_mut(&mut self, method: &Method) -> Option<&mut Node<H>> {
        match *method {
            Method::GET | Method::HEAD => Some(&mut self.get),
            Method::POST => Some(&mut self.post),
            Method::PUT => Some(&mut self.put),
            Method::DELETE => Some(&mut self.delete),
            _ => None,
        }
    }

    pub fn lookup<S: AsRef<str>>(&self, method: &Method, segments: &[S]) -> Option<&H> {
        self.root(method)?.lookup(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&str> {
        path.split('/').skip(1).filter(|s| !s.is_empty()).collect()
    }

    #[test]
    fn test_exact_static_match() {
        let mut root = Node::new();
        root.bind_fixed("foo").set_handler("foo");

        assert_eq!(root.lookup(&segs("/foo")), Some(&"foo"));
        assert_eq!(root.lookup(&segs("/fooo")), None);
        assert_eq!(root.lookup(&segs("/foo/bar")), None);
        assert_eq!(root.lookup::<&str>(&[]), None);
    }

    #[test]
    fn test_variable_segment_matches_any_value() {
        let mut root = Node::new();
        root.bind_variable()
            .bind_fixed("stuff")
            .bind_variable()
            .set_handler("ids");

        assert_eq!(root.lookup(&segs("/7/stuff/World")), Some(&"ids"));
        assert_eq!(root.lookup(&segs("/x/stuff/y")), Some(&"ids"));
        assert_eq!(root.lookup(&segs("/7/other/World")), None);
    }

    #[test]
    fn test_static_failure_falls_back_to_sibling_variable() {
        let mut root = Node::new();
        root.bind_fixed("users").bind_fixed("me").set_handler("me");
        root.bind_variable().bind_fixed("profile").set_handler("profile");

        assert_eq!(root.lookup(&segs("/users/me")), Some(&"me"));
        // "users" exists statically but has no "profile" child; the same
        // node's variable child takes over.
        assert_eq!(root.lookup(&segs("/users/profile")), Some(&"profile"));
    }

    #[test]
    fn test_deep_static_failure_falls_back_per_node() {
        let mut root = Node::new();
        let a = root.bind_fixed("a");
        a.bind_fixed("b").bind_fixed("c").set_handler("abc");
        root.bind_variable()
            .bind_variable()
            .bind_fixed("d")
            .set_handler("vvd");

        // Nothing along the "a" branch has a variable child, so the miss at
        // "d" surfaces at the root, which then tries its own variable child.
        assert_eq!(root.lookup(&segs("/a/b/d")), Some(&"vvd"));

        let mut root = Node::new();
        let a = root.bind_fixed("a");
        a.bind_variable().bind_fixed("x").set_handler("a-v-x");
        a.bind_fixed("b").bind_fixed("c").set_handler("abc");

        // "y" misses below "b"; a's variable child takes "b" but needs "x".
        assert_eq!(root.lookup(&segs("/a/b/y")), None);
        assert_eq!(root.lookup(&segs("/a/b/x")), Some(&"a-v-x"));
    }

    #[test]
    fn test_remainder_swallows_suffix() {
        let mut root = Node::new();
        let files = root.bind_fixed("files");
        files.mark_remainder();
        files.set_handler("files");

        assert_eq!(root.lookup(&segs("/files")), Some(&"files"));
        assert_eq!(root.lookup(&segs("/files/a/b/c")), Some(&"files"));
        assert_eq!(root.lookup(&segs("/other/a")), None);
    }

    #[test]
    fn test_remainder_answers_after_children_miss() {
        let mut root = Node::new();
        let files = root.bind_fixed("files");
        files.mark_remainder();
        files.set_handler("files");
        files.bind_variable().bind_fixed("x").set_handler("files-v-x");
        files.bind_fixed("static").bind_fixed("y").set_handler("files-static-y");

        assert_eq!(root.lookup(&segs("/files/a/x")), Some(&"files-v-x"));
        assert_eq!(root.lookup(&segs("/files/static/y")), Some(&"files-static-y"));
        // Both the variable subtree and the static one miss; the node's own
        // remainder takes the request.
        assert_eq!(root.lookup(&segs("/files/a/y")), Some(&"files"));
        assert_eq!(root.lookup(&segs("/files/static/z")), Some(&"files"));
    }

    #[test]
    fn test_remainder_without_handler_misses() {
        let mut root: Node<&str> = Node::new();
        root.bind_fixed("open").mark_remainder();

        assert_eq!(root.lookup(&segs("/open/x")), None);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut root = Node::new();
        assert_eq!(root.bind_fixed("x").set_handler("first"), None);
        assert_eq!(root.bind_fixed("x").set_handler("second"), Some("first"));

        assert_eq!(root.lookup(&segs("/x")), Some(&"second"));
    }

    #[test]
    fn test_root_handler_matches_empty_path() {
        let mut root = Node::new();
        root.set_handler("root");

        assert_eq!(root.lookup::<&str>(&[]), Some(&"root"));
        assert_eq!(root.lookup(&segs("/nothing")), None);
    }

    #[test]
    fn test_method_roots_share_get_and_head() {
        let mut roots = MethodRoots::new();
        roots
            .root_mut(&Method::GET)
            .unwrap()
            .bind_fixed("foo")
            .set_handler("get");
        roots
            .root_mut(&Method::POST)
            .unwrap()
            .bind_fixed("foo")
            .set_handler("post");

        assert_eq!(roots.lookup(&Method::HEAD, &segs("/foo")), Some(&"get"));
        assert_eq!(roots.lookup(&Method::GET, &segs("/foo")), Some(&"get"));
        assert_eq!(roots.lookup(&Method::POST, &segs("/foo")), Some(&"post"));
        assert_eq!(roots.lookup(&Method::PUT, &segs("/foo")), None);
        assert_eq!(roots.lookup(&Method::PATCH, &segs("/foo")), None);
        assert!(roots.root_mut(&Method::OPTIONS).is_none());
    }
}
