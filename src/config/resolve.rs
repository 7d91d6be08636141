//! Variable reference resolution for configuration values.
//!
//! Supports `${path.to.field}` syntax for referencing scalar values elsewhere
//! in the merged configuration. Array elements are addressed by index, e.g.
//! `${servers.0.port}`.
//!
//! References are resolved against a table collected once, before any
//! substitution, so they are resolved one level deep: a value that points at
//! another value containing `${...}` receives that text verbatim.

use std::collections::BTreeMap;

use super::error::{levenshtein, ConfigError, ErrorKind, MAX_SUGGESTIONS};
use super::tree::{Node, Scalar};

/// Fully-qualified dotted path of every scalar in a tree.
pub type BindingTable = BTreeMap<String, Scalar>;

/// Resolves all `${...}` references in `tree`.
///
/// Every rewritten value is coerced back to a boolean or number when its
/// text spells one. Fails with [`ErrorKind::UnresolvedVariable`] when a
/// reference names a path with no scalar value.
pub fn resolve_variables(tree: &mut Node, origin: &str) -> Result<(), ConfigError> {
    let table = collect_bindings(tree);
    substitute(tree, "", &table, origin)
}

/// Flattens `tree` into a path-to-scalar lookup table.
pub fn collect_bindings(tree: &Node) -> BindingTable {
    let mut table = BindingTable::new();
    collect(tree, "", &mut table);
    table
}

fn collect(node: &Node, path: &str, table: &mut BindingTable) {
    match node {
        Node::Object(map) => {
            for (key, child) in map {
                collect(child, &join(path, key), table);
            }
        }
        Node::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect(child, &join(path, &index.to_string()), table);
            }
        }
        Node::Scalar(scalar) => {
            table.insert(path.to_string(), scalar.clone());
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn substitute(
    node: &mut Node,
    path: &str,
    table: &BindingTable,
    origin: &str,
) -> Result<(), ConfigError> {
    match node {
        Node::Object(map) => {
            for (key, child) in map.iter_mut() {
                substitute(child, &join(path, key), table, origin)?;
            }
        }
        Node::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                substitute(child, &join(path, &index.to_string()), table, origin)?;
            }
        }
        Node::Scalar(Scalar::String(text)) if has_reference(text) => {
            let resolved = resolve_string(text, table).map_err(|name| {
                ConfigError::builder(ErrorKind::UnresolvedVariable, "Unresolved variable")
                    .field_path(path)
                    .detail(format!("no value named `{name}` to substitute for `${{{name}}}`"))
                    .suggestions(nearest_keys(table, &name))
                    .build(origin)
            })?;
            *node = Node::Scalar(Scalar::coerce(&resolved));
        }
        Node::Scalar(_) => {}
    }
    Ok(())
}

/// The table keys closest to `name`, closest first.
fn nearest_keys(table: &BindingTable, name: &str) -> Vec<String> {
    let mut keys: Vec<(usize, &String)> = table
        .keys()
        .map(|key| (levenshtein(key, name), key))
        .collect();
    keys.sort();
    keys.into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, key)| key.clone())
        .collect()
}

/// Whether `text` contains at least one `${name}` with a non-empty name.
fn has_reference(text: &str) -> bool {
    references(text).next().is_some()
}

/// Iterates over `(start, end, name)` for each reference in `text`, where
/// `start..end` spans the whole `${name}`.
fn references(text: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    let mut cursor = 0;
    std::iter::from_fn(move || loop {
        let start = cursor + text[cursor..].find("${")?;
        let close = start + 2 + text[start + 2..].find('}')?;
        cursor = close + 1;
        if close > start + 2 {
            return Some((start, close + 1, &text[start + 2..close]));
        }
    })
}

/// Replaces every reference in `text`, returning the missing name on failure.
fn resolve_string(text: &str, table: &BindingTable) -> Result<String, String> {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;

    for (start, end, name) in references(text) {
        let value = table.get(name).ok_or_else(|| name.to_string())?;
        result.push_str(&text[last..start]);
        result.push_str(&value.to_string());
        last = end;
    }
    result.push_str(&text[last..]);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(json: &str) -> Node {
        Node::from(serde_json::from_str::<serde_json::Value>(json).unwrap())
    }

    fn resolve(json: &str) -> Node {
        let mut node = tree(json);
        resolve_variables(&mut node, "test").unwrap();
        node
    }

    #[test]
    fn test_simple_reference() {
        let resolved = resolve(r#"{"logdir": "/var/log", "path": "${logdir}/app.log"}"#);
        assert_eq!(resolved.get("path"), Some(&Node::string("/var/log/app.log")));
    }

    #[test]
    fn test_nested_path() {
        let resolved = resolve(
            r#"{"server": {"host": "example.com", "port": 8080},
                "client": {"endpoint": "https://${server.host}:${server.port}"}}"#,
        );
        assert_eq!(
            resolved.pointer(["client", "endpoint"]),
            Some(&Node::string("https://example.com:8080"))
        );
    }

    #[test]
    fn test_integer_coercion() {
        let resolved = resolve(r#"{"count": "${n}", "n": 3}"#);
        assert_eq!(resolved.get("count"), Some(&Node::Scalar(Scalar::Integer(3))));
    }

    #[test]
    fn test_boolean_and_float_coercion() {
        let resolved = resolve(
            r#"{"flag": "TRUE", "enabled": "${flag}", "ratio": "${r}", "r": "0.25"}"#,
        );
        assert_eq!(resolved.get("enabled"), Some(&Node::Scalar(Scalar::Bool(true))));
        assert_eq!(resolved.get("ratio"), Some(&Node::Scalar(Scalar::Float(0.25))));
        // values without references are left alone
        assert_eq!(resolved.get("flag"), Some(&Node::string("TRUE")));
    }

    #[test]
    fn test_references_are_resolved_one_level_deep() {
        let resolved = resolve(r#"{"a": "hello", "b": "${a} world", "c": "${b}!"}"#);
        assert_eq!(resolved.get("b"), Some(&Node::string("hello world")));
        assert_eq!(resolved.get("c"), Some(&Node::string("${a} world!")));
    }

    #[test]
    fn test_array_values() {
        let resolved = resolve(
            r#"{"base": "/api", "ports": [80, 443],
                "endpoints": ["${base}/users", "${base}/posts", "${ports.1}"]}"#,
        );
        assert_eq!(
            resolved.get("endpoints"),
            Some(&tree(r#"["/api/users", "/api/posts", 443]"#))
        );
    }

    #[test]
    fn test_unclosed_and_empty_references_left_alone() {
        let resolved = resolve(r#"{"a": "${unclosed", "b": "${}", "c": "$5"}"#);
        assert_eq!(resolved.get("a"), Some(&Node::string("${unclosed")));
        assert_eq!(resolved.get("b"), Some(&Node::string("${}")));
        assert_eq!(resolved.get("c"), Some(&Node::string("$5")));
    }

    #[test]
    fn test_missing_reference() {
        let mut node = tree(r#"{"logdir": "/var/log", "path": "${missing}/x"}"#);
        let err = resolve_variables(&mut node, "config.yaml").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnresolvedVariable);
        assert_eq!(err.field_path(), Some("path"));
        assert!(err.detail().unwrap().contains("missing"));
    }

    #[test]
    fn test_containers_are_not_bindable() {
        let mut node = tree(r#"{"server": {"port": 1}, "copy": "${server}"}"#);
        let err = resolve_variables(&mut node, "test").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedVariable);
        assert_eq!(err.suggestions()[0], "server.port");
    }

    #[test]
    fn test_suggestions_are_bounded_and_nearest_first() {
        let keys = (0..40)
            .map(|i| format!(r#""key{i}": {i}"#))
            .collect::<Vec<_>>()
            .join(", ");
        let mut node = tree(&format!(r#"{{{keys}, "logdir": "/var/log", "path": "${{logdr}}"}}"#));

        let err = resolve_variables(&mut node, "test").unwrap_err();

        assert_eq!(err.suggestions().len(), 5);
        assert_eq!(err.suggestions()[0], "logdir");
        assert!(!err.to_string().contains("more]"));
    }

    #[test]
    fn test_collect_bindings_paths() {
        let table = collect_bindings(&tree(r#"{"a": {"b": [true, {"c": null}]}}"#));
        assert_eq!(
            table.into_iter().collect::<Vec<_>>(),
            vec![
                ("a.b.0".to_string(), Scalar::Bool(true)),
                ("a.b.1.c".to_string(), Scalar::Null),
            ]
        );
    }
}
