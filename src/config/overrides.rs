//! Path-addressed overrides applied on top of the merged tree.
//!
//! An override path is a dotted list of keys. A key may carry an array
//! index (`servers[0].port`), and `\.` embeds a literal dot in a key
//! (`my\.logger.level`).

use std::collections::BTreeMap;

use log::debug;
use thiserror::Error;

use super::error::{ConfigError, ErrorKind};
use super::tree::{Map, Node};

/// Why an override path could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OverrideError {
    #[error("the path is empty or has an empty segment")]
    EmptySegment,

    #[error("`{0}` is not an object")]
    NotAnObject(String),

    #[error("`{0}` does not exist, so it cannot be indexed")]
    IndexedNodeMissing(String),

    #[error("`{0}` is not an array, so it cannot be indexed")]
    NotAnArray(String),

    #[error("index {index} is out of range for `{name}` with {len} element(s)")]
    IndexOutOfRange {
        name: String,
        index: String,
        len: usize,
    },

    #[error("`{0}` is an array but no index was given")]
    ArrayWithoutIndex(String),
}

/// Override entries keyed by path, applied in sorted path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    entries: BTreeMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any earlier value for the same path.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(path.into(), value.into());
    }

    /// Collects the pairs whose key starts with `prefix`, with the prefix
    /// stripped.
    ///
    /// A trailing `.` is added to the prefix when missing, so `"dw"` selects
    /// `dw.server.port` as `server.port`.
    pub fn from_prefixed<I, K, V>(prefix: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let prefix = if prefix.is_empty() || prefix.ends_with('.') {
            prefix.to_string()
        } else {
            format!("{prefix}.")
        };

        let entries = pairs
            .into_iter()
            .filter_map(|(key, value)| {
                key.as_ref()
                    .strip_prefix(&prefix)
                    .filter(|path| !path.is_empty())
                    .map(|path| (path.to_string(), value.into()))
            })
            .collect();

        Self { entries }
    }

    /// Collects overrides from process environment variables.
    ///
    /// `MYAPP__SERVER__PORT` with prefix `MYAPP` and separator `__` becomes
    /// the path `server.port`.
    pub fn from_env(prefix: &str, separator: &str) -> Self {
        Self::from_env_vars(prefix, separator, std::env::vars())
    }

    fn from_env_vars<I>(prefix: &str, separator: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        assert!(!separator.is_empty(), "separator must not be empty");
        let prefix_with_sep = format!("{prefix}{separator}");

        let entries = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let path = key.strip_prefix(&prefix_with_sep)?;
                if path.is_empty() {
                    return None;
                }
                let path = path
                    .split(separator)
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
                    .join(".");
                Some((path, value))
            })
            .collect();

        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Applies every entry to `tree`, stopping at the first invalid path.
    pub fn apply(&self, tree: &mut Node, origin: &str) -> Result<(), ConfigError> {
        for (path, value) in self.iter() {
            debug!("overriding {path}");
            apply_override(tree, path, value).map_err(|e| {
                ConfigError::builder(
                    ErrorKind::InvalidOverridePath,
                    format!("Unable to override {path}"),
                )
                .field_path(path)
                .detail(e.to_string())
                .cause(e)
                .build(origin)
            })?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One parsed path segment.
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Indexed { name: &'a str, index: &'a str },
}

impl<'a> Segment<'a> {
    fn parse(key: &'a str) -> Self {
        if let Some(body) = key.strip_suffix(']') {
            if let Some((name, index)) = body.split_once('[') {
                if !name.is_empty()
                    && !index.is_empty()
                    && index.chars().all(|c| c.is_ascii_digit())
                {
                    return Segment::Indexed { name, index };
                }
            }
        }
        Segment::Key(key)
    }
}

/// Sets the value at `path` inside `tree` to `value`.
///
/// Missing intermediate objects are created. When the terminal key already
/// holds an array, `value` is split on unescaped commas (`\,` is a literal
/// comma) and replaces the array's contents. Values are stored as strings;
/// conversion happens at binding.
pub fn apply_override(tree: &mut Node, path: &str, value: &str) -> Result<(), OverrideError> {
    let parts = split_path(path);
    if parts.iter().any(String::is_empty) {
        return Err(OverrideError::EmptySegment);
    }

    let mut node = tree;
    for (i, key) in parts.iter().enumerate() {
        let traversed = || parts[..i].join(".");
        let obj: &mut Map = match node {
            Node::Object(obj) => obj,
            _ => return Err(OverrideError::NotAnObject(traversed())),
        };

        // a key that itself contains dots, e.g. `settings.enabled`
        let remaining = parts[i..].join(".");
        if i + 1 < parts.len() {
            if let Some(existing) = obj.get_mut(&remaining).filter(|n| n.is_scalar()) {
                *existing = Node::string(value);
                return Ok(());
            }
        }

        let more = i + 1 < parts.len();
        match Segment::parse(key) {
            Segment::Indexed { name, index } => {
                let child = obj
                    .get_mut(name)
                    .ok_or_else(|| OverrideError::IndexedNodeMissing(name.to_string()))?;
                let Node::Array(items) = child else {
                    return Err(OverrideError::NotAnArray(name.to_string()));
                };
                let len = items.len();
                let element = match index.parse::<usize>().ok().filter(|&i| i < len) {
                    Some(i) => &mut items[i],
                    None => {
                        return Err(OverrideError::IndexOutOfRange {
                            name: name.to_string(),
                            index: index.to_string(),
                            len,
                        })
                    }
                };
                if !more {
                    *element = Node::string(value);
                    return Ok(());
                }
                node = element;
            }
            Segment::Key(name) if more => {
                let child = obj.entry(name.to_string()).or_insert_with(Node::object);
                if matches!(child, Node::Array(_)) {
                    return Err(OverrideError::ArrayWithoutIndex(name.to_string()));
                }
                node = child;
            }
            Segment::Key(name) => {
                match obj.get_mut(name) {
                    Some(Node::Array(items)) => *items = split_list(value),
                    _ => {
                        obj.insert(name.to_string(), Node::string(value));
                    }
                }
                return Ok(());
            }
        }
    }

    Err(OverrideError::EmptySegment)
}

/// Splits a path on unescaped dots, trimming each segment.
fn split_path(path: &str) -> Vec<String> {
    split_unescaped(path, '.')
}

/// Splits a list override on unescaped commas.
fn split_list(value: &str) -> Vec<Node> {
    split_unescaped(value, ',')
        .into_iter()
        .map(Node::string)
        .collect()
}

fn split_unescaped(text: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek() == Some(&delimiter) {
            current.push(delimiter);
            chars.next();
        } else if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    parts.push(current.trim().to_string());

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(json: &str) -> Node {
        Node::from(serde_json::from_str::<serde_json::Value>(json).unwrap())
    }

    #[test]
    fn test_synthesizes_missing_objects() {
        let mut root = Node::object();
        apply_override(&mut root, "server.ssl.enabled", "true").unwrap();
        assert_eq!(root, tree(r#"{"server": {"ssl": {"enabled": "true"}}}"#));
    }

    #[test]
    fn test_replaces_scalar() {
        let mut root = tree(r#"{"name": "Coda Hale", "server": {"port": 8080}}"#);
        apply_override(&mut root, "name", "Overridden").unwrap();
        apply_override(&mut root, "server.port", "9000").unwrap();
        assert_eq!(
            root,
            tree(r#"{"name": "Overridden", "server": {"port": "9000"}}"#)
        );
    }

    #[test]
    fn test_array_override_with_escaped_comma() {
        let mut root = tree(r#"{"tags": ["x"]}"#);
        apply_override(&mut root, "tags", r"a\,b,c").unwrap();
        assert_eq!(root, tree(r#"{"tags": ["a,b", "c"]}"#));
    }

    #[test]
    fn test_array_override_trims_elements() {
        let mut root = tree(r#"{"type": ["coder", "wizard"]}"#);
        apply_override(&mut root, "type", "coder, wizard ,overridden").unwrap();
        assert_eq!(root, tree(r#"{"type": ["coder", "wizard", "overridden"]}"#));
    }

    #[test]
    fn test_indexed_terminal_and_nested() {
        let mut root = tree(
            r#"{"type": ["coder", "wizard"], "servers": [{"port": 8080}, {"port": 8081}]}"#,
        );
        apply_override(&mut root, "type[1]", "overridden").unwrap();
        apply_override(&mut root, "servers[0].port", "7000").unwrap();
        assert_eq!(
            root,
            tree(
                r#"{"type": ["coder", "overridden"],
                    "servers": [{"port": "7000"}, {"port": 8081}]}"#
            )
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let mut root = tree(r#"{"type": ["coder", "wizard"]}"#);
        let err = apply_override(&mut root, "type[2]", "invalid").unwrap_err();
        assert!(matches!(err, OverrideError::IndexOutOfRange { len: 2, .. }));
    }

    #[test]
    fn test_index_into_non_array() {
        let mut root = tree(r#"{"name": "x"}"#);
        let err = apply_override(&mut root, "name[0]", "y").unwrap_err();
        assert_eq!(err, OverrideError::NotAnArray("name".into()));

        let err = apply_override(&mut root, "missing[0]", "y").unwrap_err();
        assert_eq!(err, OverrideError::IndexedNodeMissing("missing".into()));
    }

    #[test]
    fn test_array_without_index() {
        let mut root = tree(r#"{"servers": [{"port": 8080}]}"#);
        let err = apply_override(&mut root, "servers.port", "9000").unwrap_err();
        assert_eq!(err, OverrideError::ArrayWithoutIndex("servers".into()));
    }

    #[test]
    fn test_descend_into_scalar() {
        let mut root = tree(r#"{"name": "x"}"#);
        let err = apply_override(&mut root, "name.first", "y").unwrap_err();
        assert_eq!(err, OverrideError::NotAnObject("name".into()));
    }

    #[test]
    fn test_escaped_dot_keys() {
        let mut root = tree(r#"{"my.logger": {"level": "info"}}"#);
        apply_override(&mut root, r"my\.logger.level", "debug").unwrap();
        apply_override(&mut root, r"my\.logger.com\.example", "error").unwrap();
        assert_eq!(
            root,
            tree(r#"{"my.logger": {"level": "debug", "com.example": "error"}}"#)
        );
    }

    #[test]
    fn test_existing_dotted_key_is_replaced() {
        let mut root = tree(r#"{"properties": {"settings.enabled": "false"}}"#);
        apply_override(&mut root, "properties.settings.enabled", "true").unwrap();
        assert_eq!(root, tree(r#"{"properties": {"settings.enabled": "true"}}"#));
    }

    #[test]
    fn test_empty_segment() {
        let mut root = Node::object();
        assert_eq!(
            apply_override(&mut root, "server..port", "1").unwrap_err(),
            OverrideError::EmptySegment
        );
        assert_eq!(
            apply_override(&mut root, "", "1").unwrap_err(),
            OverrideError::EmptySegment
        );
    }

    #[test]
    fn test_later_entry_for_same_path_wins() {
        let overrides = Overrides::new().set("name", "first").set("name", "second");
        let mut root = Node::object();
        overrides.apply(&mut root, "test").unwrap();
        assert_eq!(root, tree(r#"{"name": "second"}"#));
    }

    #[test]
    fn test_apply_wraps_errors() {
        let overrides = Overrides::new().set("servers.port", "9000");
        let mut root = tree(r#"{"servers": []}"#);
        let err = overrides.apply(&mut root, "config.yaml").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidOverridePath);
        assert_eq!(err.field_path(), Some("servers.port"));
        assert_eq!(err.origin(), "config.yaml");
    }

    #[test]
    fn test_from_prefixed() {
        let overrides = Overrides::from_prefixed(
            "dw",
            [("dw.server.port", "9000"), ("other.name", "x"), ("dw.", "y")],
        );
        assert_eq!(
            overrides.iter().collect::<Vec<_>>(),
            vec![("server.port", "9000")]
        );
    }

    #[test]
    fn test_from_env_vars() {
        let vars = vec![
            ("MYAPP__SERVER__PORT".to_string(), "9000".to_string()),
            ("MYAPP__NAME".to_string(), "demo".to_string()),
            ("OTHER__NAME".to_string(), "x".to_string()),
            ("MYAPP__".to_string(), "y".to_string()),
        ];
        let overrides = Overrides::from_env_vars("MYAPP", "__", vars);
        assert_eq!(
            overrides.iter().collect::<Vec<_>>(),
            vec![("name", "demo"), ("server.port", "9000")]
        );
    }
}
