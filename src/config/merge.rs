//! Deep merging of configuration trees.

use log::trace;

use super::chain::ConfigChain;
use super::tree::Node;

/// Merges `overlay` on top of `base` and returns the result.
///
/// Objects present on both sides are merged recursively; every other value
/// (arrays included) in `overlay` replaces the one in `base` wholesale. Keys
/// only present in `base` are kept.
pub fn merge(mut base: Node, overlay: Node) -> Node {
    deep_merge(&mut base, overlay);
    base
}

/// Folds a chain into one tree, ancestor first, so descendants win.
pub fn merge_chain(chain: ConfigChain) -> Node {
    chain
        .into_documents()
        .into_iter()
        .fold(Node::object(), |merged, document| {
            trace!("merging {}", document.origin);
            merge(merged, document.root)
        })
}

fn deep_merge(base: &mut Node, overlay: Node) {
    match (base, overlay) {
        (Node::Object(base), Node::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(json: &str) -> Node {
        Node::from(serde_json::from_str::<serde_json::Value>(json).unwrap())
    }

    #[test]
    fn test_descendant_scalar_wins() {
        let merged = merge(tree(r#"{"name": "base"}"#), tree(r#"{"name": "child"}"#));
        assert_eq!(merged, tree(r#"{"name": "child"}"#));
    }

    #[test]
    fn test_nested_objects_union() {
        let merged = merge(
            tree(r#"{"server": {"port": 9090, "adminPort": 9091}}"#),
            tree(r#"{"server": {"port": 8080}}"#),
        );
        assert_eq!(merged, tree(r#"{"server": {"port": 8080, "adminPort": 9091}}"#));
    }

    #[test]
    fn test_arrays_replaced_wholesale() {
        let merged = merge(
            tree(r#"{"tags": ["a", "b", "c"]}"#),
            tree(r#"{"tags": ["z"]}"#),
        );
        assert_eq!(merged, tree(r#"{"tags": ["z"]}"#));
    }

    #[test]
    fn test_object_replaced_by_scalar_and_back() {
        let merged = merge(
            tree(r#"{"a": {"b": 1}, "c": 2}"#),
            tree(r#"{"a": "flat", "c": {"d": 3}}"#),
        );
        assert_eq!(merged, tree(r#"{"a": "flat", "c": {"d": 3}}"#));
    }

    #[test]
    fn test_base_only_keys_retained() {
        let merged = merge(tree(r#"{"a": 1, "b": 2}"#), tree(r#"{"c": 3}"#));
        assert_eq!(merged, tree(r#"{"a": 1, "b": 2, "c": 3}"#));
    }
}
