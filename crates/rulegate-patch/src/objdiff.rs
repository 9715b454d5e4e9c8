//! Structural diffs of parsed configuration trees.
//!
//! Files whose extension marks them as structured configuration are parsed
//! into a normalized tree ([`serde_json::Value`]) and diffed object-by-
//! object, so rules can reason about *what* changed rather than which
//! lines moved. Scalar equality is strict: `1` and `"1"` differ, `null`
//! equals only `null`.

use serde_json::Value;

use crate::error::PatchError;
use crate::types::{ObjectChange, ObjectDiff, PatchOp, PathStep};

/// Structured configuration dialects the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// Strict JSON (`.json`).
    Json,
    /// JSON5 (`.json5`).
    Json5,
    /// YAML (`.yaml` / `.yml`).
    Yaml,
    /// TOML (`.toml`).
    Toml,
}

impl ConfigFormat {
    /// Select a format from a file path's extension, case-insensitively.
    /// Returns `None` for paths that are not structured configuration.
    pub fn from_path(path: &str) -> Option<Self> {
        let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "json5" => Some(Self::Json5),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Parse file text into a normalized tree.
///
/// Any parser failure is a [`PatchError::ParseFailure`] carrying the file
/// path; it fails the enclosing patch assembly rather than degrading to a
/// missing object diff.
pub fn parse_tree(format: ConfigFormat, path: &str, text: &str) -> Result<Value, PatchError> {
    let parse_failure = |reason: String| PatchError::ParseFailure {
        path: path.to_string(),
        reason,
    };

    match format {
        ConfigFormat::Json => serde_json::from_str(text).map_err(|e| parse_failure(e.to_string())),
        ConfigFormat::Json5 => json5::from_str(text).map_err(|e| parse_failure(e.to_string())),
        ConfigFormat::Yaml => {
            let tree: serde_yml::Value =
                serde_yml::from_str(text).map_err(|e| parse_failure(e.to_string()))?;
            serde_json::to_value(tree).map_err(|e| parse_failure(e.to_string()))
        }
        ConfigFormat::Toml => {
            let tree: toml::Value =
                toml::from_str(text).map_err(|e| parse_failure(e.to_string()))?;
            serde_json::to_value(tree).map_err(|e| parse_failure(e.to_string()))
        }
    }
}

/// Compute the minimal ordered change list transforming `previous` into
/// `current`.
///
/// Matching container kinds recurse with the key/index appended to the
/// path; everything else emits a `CHANGE`. Keys only in `current` emit
/// `CREATE`, keys only in `previous` emit `REMOVE`. Sequences compare
/// positionally, with length changes emitting `CREATE`/`REMOVE` entries
/// for the tail.
pub fn diff_trees(previous: &Value, current: &Value) -> Vec<ObjectChange> {
    let mut changes = Vec::new();
    diff_value(&mut Vec::new(), previous, current, &mut changes);
    changes
}

fn diff_value(path: &mut Vec<PathStep>, previous: &Value, current: &Value, out: &mut Vec<ObjectChange>) {
    if previous == current {
        return;
    }

    match (previous, current) {
        (Value::Object(prev), Value::Object(cur)) => {
            for (key, prev_value) in prev {
                if let Some(cur_value) = cur.get(key) {
                    path.push(PathStep::Key(key.clone()));
                    diff_value(path, prev_value, cur_value, out);
                    path.pop();
                }
            }
            for (key, cur_value) in cur {
                if !prev.contains_key(key) {
                    let mut created = path.clone();
                    created.push(PathStep::Key(key.clone()));
                    out.push(ObjectChange::create(created, cur_value.clone()));
                }
            }
            for (key, prev_value) in prev {
                if !cur.contains_key(key) {
                    let mut removed = path.clone();
                    removed.push(PathStep::Key(key.clone()));
                    out.push(ObjectChange::remove(removed, prev_value.clone()));
                }
            }
        }
        (Value::Array(prev), Value::Array(cur)) => {
            let shared = prev.len().min(cur.len());
            for index in 0..shared {
                path.push(PathStep::Index(index));
                diff_value(path, &prev[index], &cur[index], out);
                path.pop();
            }
            for (index, value) in cur.iter().enumerate().skip(shared) {
                let mut created = path.clone();
                created.push(PathStep::Index(index));
                out.push(ObjectChange::create(created, value.clone()));
            }
            for (index, value) in prev.iter().enumerate().skip(shared) {
                let mut removed = path.clone();
                removed.push(PathStep::Index(index));
                out.push(ObjectChange::remove(removed, value.clone()));
            }
        }
        _ => out.push(ObjectChange::change(
            path.clone(),
            previous.clone(),
            current.clone(),
        )),
    }
}

/// Build the [`ObjectDiff`] for one patch, if its path is recognized as
/// structured configuration.
///
/// Which side's contents are required follows the patch op: head-only for
/// `Insert`, base-only for `Delete`, both for `Modified`. `Unknown` ops
/// never carry an object diff.
pub fn object_diff_for(
    op: PatchOp,
    path: &str,
    base_text: Option<&str>,
    head_text: Option<&str>,
) -> Result<Option<ObjectDiff>, PatchError> {
    let Some(format) = ConfigFormat::from_path(path) else {
        return Ok(None);
    };

    let missing = |side: &str| PatchError::ParseFailure {
        path: path.to_string(),
        reason: format!("{side} contents unavailable"),
    };

    match op {
        PatchOp::Insert => {
            let current = parse_tree(format, path, head_text.ok_or_else(|| missing("head"))?)?;
            Ok(Some(ObjectDiff {
                previous: None,
                current: Some(current),
                diff: Vec::new(),
            }))
        }
        PatchOp::Delete => {
            let previous = parse_tree(format, path, base_text.ok_or_else(|| missing("base"))?)?;
            Ok(Some(ObjectDiff {
                previous: Some(previous),
                current: None,
                diff: Vec::new(),
            }))
        }
        PatchOp::Modified => {
            let previous = parse_tree(format, path, base_text.ok_or_else(|| missing("base"))?)?;
            let current = parse_tree(format, path, head_text.ok_or_else(|| missing("head"))?)?;
            let diff = diff_trees(&previous, &current);
            Ok(Some(ObjectDiff {
                previous: Some(previous),
                current: Some(current),
                diff,
            }))
        }
        PatchOp::Unknown => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeType;
    use serde_json::json;

    /// Re-apply a change list to `previous` and check it reproduces
    /// `current` (spec §8 property 3), comparing canonical
    /// re-serializations.
    fn assert_inversion(previous: &Value, current: &Value, changes: &[ObjectChange]) {
        let mut patched = previous.clone();
        for change in changes {
            apply_change(&mut patched, change);
        }
        assert_eq!(
            serde_json::to_string(&patched).unwrap(),
            serde_json::to_string(current).unwrap(),
            "applying the diff must reproduce the current tree"
        );
    }

    fn apply_change(tree: &mut Value, change: &ObjectChange) {
        let (last, parents) = change.path.split_last().expect("non-empty path");
        let mut target = tree;
        for step in parents {
            target = match step {
                PathStep::Key(key) => target.get_mut(key.as_str()).expect("parent key"),
                PathStep::Index(index) => target.get_mut(index).expect("parent index"),
            };
        }
        match (change.change_type, last) {
            (ChangeType::Create | ChangeType::Change, PathStep::Key(key)) => {
                target.as_object_mut().expect("object").insert(
                    key.clone(),
                    change.value.clone().expect("value present"),
                );
            }
            (ChangeType::Remove, PathStep::Key(key)) => {
                target.as_object_mut().expect("object").remove(key);
            }
            (ChangeType::Change, PathStep::Index(index)) => {
                target.as_array_mut().expect("array")[*index] =
                    change.value.clone().expect("value present");
            }
            (ChangeType::Create, PathStep::Index(index)) => {
                let array = target.as_array_mut().expect("array");
                assert_eq!(array.len(), *index, "tail create");
                array.push(change.value.clone().expect("value present"));
            }
            (ChangeType::Remove, PathStep::Index(_)) => {
                target.as_array_mut().expect("array").pop();
            }
        }
    }

    #[test]
    fn format_selection_by_extension() {
        assert_eq!(ConfigFormat::from_path("a/b/deploy.json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_path("pkg.JSON5"), Some(ConfigFormat::Json5));
        assert_eq!(ConfigFormat::from_path("ci.yml"), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path("stack.yaml"), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path("Cargo.toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path("main.rs"), None);
        assert_eq!(ConfigFormat::from_path("Makefile"), None);
    }

    #[test]
    fn scalar_change_at_key() {
        let previous = json!({"app": "core", "subapp": "v1.1.0"});
        let current = json!({"app": "core", "subapp": "v1.2.0"});

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Change);
        assert_eq!(changes[0].path, vec![PathStep::Key("subapp".into())]);
        assert_eq!(changes[0].old_value, Some(json!("v1.1.0")));
        assert_eq!(changes[0].value, Some(json!("v1.2.0")));
        assert_inversion(&previous, &current, &changes);
    }

    #[test]
    fn nested_change_recurses_into_matching_containers() {
        let previous = json!({"deps": {"serde": "1.0", "tokio": "1.38"}});
        let current = json!({"deps": {"serde": "1.0", "tokio": "1.40"}});

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].path,
            vec![PathStep::Key("deps".into()), PathStep::Key("tokio".into())]
        );
        assert_inversion(&previous, &current, &changes);
    }

    #[test]
    fn kind_mismatch_is_a_single_change() {
        // Container replaced by scalar: no recursion, one CHANGE.
        let previous = json!({"feature": {"enabled": true}});
        let current = json!({"feature": "on"});

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Change);
        assert_eq!(changes[0].old_value, Some(json!({"enabled": true})));
        assert_inversion(&previous, &current, &changes);
    }

    #[test]
    fn create_and_remove_keys() {
        let previous = json!({"kept": 1, "dropped": 2});
        let current = json!({"kept": 1, "added": 3});

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::Create);
        assert_eq!(changes[0].path, vec![PathStep::Key("added".into())]);
        assert_eq!(changes[1].change_type, ChangeType::Remove);
        assert_eq!(changes[1].path, vec![PathStep::Key("dropped".into())]);
        assert_inversion(&previous, &current, &changes);
    }

    #[test]
    fn sequences_compare_positionally() {
        let previous = json!({"steps": ["build", "test"]});
        let current = json!({"steps": ["build", "lint", "deploy"]});

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::Change);
        assert_eq!(
            changes[0].path,
            vec![PathStep::Key("steps".into()), PathStep::Index(1)]
        );
        assert_eq!(changes[1].change_type, ChangeType::Create);
        assert_eq!(
            changes[1].path,
            vec![PathStep::Key("steps".into()), PathStep::Index(2)]
        );
        assert_inversion(&previous, &current, &changes);
    }

    #[test]
    fn shrinking_sequence_removes_tail() {
        let previous = json!([1, 2, 3]);
        let current = json!([1]);

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|c| c.change_type == ChangeType::Remove));
        assert_inversion(&previous, &current, &changes);
    }

    #[test]
    fn scalar_equality_is_strict() {
        // 1 and "1" are different; null equals only null.
        let changes = diff_trees(&json!({"v": 1}), &json!({"v": "1"}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Change);

        let changes = diff_trees(&json!({"v": null}), &json!({"v": null}));
        assert!(changes.is_empty());

        let changes = diff_trees(&json!({"v": null}), &json!({"v": false}));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn identical_trees_diff_empty() {
        let tree = json!({"a": [1, {"b": null}], "c": "x"});
        assert!(diff_trees(&tree, &tree).is_empty());
    }

    #[test]
    fn object_diff_for_insert_and_delete_have_empty_diff() {
        let inserted = object_diff_for(PatchOp::Insert, "new.json", None, Some(r#"{"a":1}"#))
            .unwrap()
            .unwrap();
        assert!(inserted.previous.is_none());
        assert_eq!(inserted.current, Some(json!({"a": 1})));
        assert!(inserted.diff.is_empty());

        let deleted = object_diff_for(PatchOp::Delete, "old.yaml", Some("a: 1\n"), None)
            .unwrap()
            .unwrap();
        assert_eq!(deleted.previous, Some(json!({"a": 1})));
        assert!(deleted.current.is_none());
        assert!(deleted.diff.is_empty());
    }

    #[test]
    fn object_diff_for_modified_toml() {
        let base = "coreapp = \"v0.1.0\"\nsecond = true\nthird = false\n";
        let head = "coreapp = \"v0.2.0\"\nsecond = true\nthird = false\n";

        let diff = object_diff_for(PatchOp::Modified, "versions.toml", Some(base), Some(head))
            .unwrap()
            .unwrap();
        assert_eq!(diff.diff.len(), 1);
        assert_eq!(diff.diff[0].change_type, ChangeType::Change);
        assert_eq!(diff.diff[0].path, vec![PathStep::Key("coreapp".into())]);
        assert_eq!(diff.diff[0].value, Some(json!("v0.2.0")));
    }

    #[test]
    fn object_diff_for_unrecognized_extension_is_none() {
        let diff = object_diff_for(PatchOp::Modified, "main.rs", Some("x"), Some("y")).unwrap();
        assert!(diff.is_none());
    }

    #[test]
    fn parse_failure_carries_path() {
        let err = object_diff_for(PatchOp::Insert, "bad.json", None, Some("{not json"))
            .unwrap_err();
        match err {
            PatchError::ParseFailure { path, .. } => assert_eq!(path, "bad.json"),
            other => panic!("expected ParseFailure, got {other:?}"),
        }
    }

    #[test]
    fn json5_accepts_relaxed_syntax() {
        let diff = object_diff_for(
            PatchOp::Modified,
            "app.json5",
            Some("{version: 'v1', /* pinned */ replicas: 2}"),
            Some("{version: 'v2', replicas: 2}"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(diff.diff.len(), 1);
        assert_eq!(diff.diff[0].path, vec![PathStep::Key("version".into())]);
    }

    #[test]
    fn yaml_tree_normalizes_like_json() {
        let previous = parse_tree(ConfigFormat::Yaml, "a.yaml", "svc:\n  replicas: 2\n").unwrap();
        let current = parse_tree(ConfigFormat::Yaml, "a.yaml", "svc:\n  replicas: 3\n").unwrap();

        let changes = diff_trees(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].path,
            vec![PathStep::Key("svc".into()), PathStep::Key("replicas".into())]
        );
        assert_eq!(changes[0].value, Some(json!(3)));
    }
}
