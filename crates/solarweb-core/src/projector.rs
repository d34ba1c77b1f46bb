// ── JSON to tree projection ──
//
// Merges one schema-less JSON value into the state tree below a mount
// path. The mapping is deterministic: the same value at the same mount
// always touches the same set of paths with the same leaf values, so
// projections can be repeated (and can overlap) freely.
//
//   null    -> nothing
//   scalar  -> leaf at P
//   object  -> container at P, recurse into P/key in payload order
//   array   -> container at P, recurse into P/segment per element
//
// Nodes missing from a later payload are left alone.

use std::collections::HashSet;

use serde_json::Value;
use tracing::trace;

use crate::store::{NodePath, NodeSpec, ScalarValue, StateSink, sanitize_segment};

/// Per-feed projection knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// Address every array element by its index.
    pub force_indexed: bool,
    /// Object member whose text value names an array element.
    pub array_name_field: Option<String>,
    /// Label of the container created at the mount path.
    pub container_label: Option<String>,
}

impl ProjectionOptions {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            container_label: Some(label.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_array_name_field(mut self, field: impl Into<String>) -> Self {
        self.array_name_field = Some(field.into());
        self
    }
}

/// What a projection touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub containers: usize,
    pub leaves: usize,
    /// `null` members and scalars that had no name to live under.
    pub skipped: usize,
}

/// The projection algorithm, configured once per feed.
#[derive(Debug, Clone, Default)]
pub struct JsonTreeProjector {
    options: ProjectionOptions,
}

impl JsonTreeProjector {
    pub fn new(options: ProjectionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    /// Merge `value` into `sink` at `mount`.
    pub fn project<S: StateSink + ?Sized>(
        &self,
        sink: &S,
        value: &Value,
        mount: &NodePath,
    ) -> ProjectionStats {
        let mut stats = ProjectionStats::default();
        let label = self
            .options
            .container_label
            .clone()
            .or_else(|| mount.name().map(str::to_owned))
            .unwrap_or_default();
        self.walk(sink, value, mount, &label, &mut stats);
        trace!(
            mount = %mount,
            containers = stats.containers,
            leaves = stats.leaves,
            "projection complete"
        );
        stats
    }

    fn walk<S: StateSink + ?Sized>(
        &self,
        sink: &S,
        value: &Value,
        path: &NodePath,
        label: &str,
        stats: &mut ProjectionStats,
    ) {
        match value {
            Value::Null => stats.skipped += 1,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                let Some(scalar) = ScalarValue::from_json(value) else {
                    stats.skipped += 1;
                    return;
                };
                if path.is_empty() {
                    stats.skipped += 1;
                    return;
                }
                sink.ensure_node(path, &NodeSpec::leaf(label, scalar.scalar_type()));
                sink.set_value(path, scalar, true);
                stats.leaves += 1;
            }
            Value::Object(members) => {
                self.ensure_container(sink, path, label, stats);
                let mut taken = HashSet::with_capacity(members.len());
                for (key, child) in members {
                    let Some(base) = sanitize_segment(key) else {
                        stats.skipped += 1;
                        continue;
                    };
                    let segment = claim_segment(&mut taken, base);
                    self.walk(sink, child, &path.child(segment), key, stats);
                }
            }
            Value::Array(elements) => {
                self.ensure_container(sink, path, label, stats);
                let segments = array_segments(
                    elements,
                    self.options.array_name_field.as_deref(),
                    self.options.force_indexed,
                );
                for (element, (segment, element_label)) in elements.iter().zip(segments) {
                    self.walk(sink, element, &path.child(segment), &element_label, stats);
                }
            }
        }
    }

    fn ensure_container<S: StateSink + ?Sized>(
        &self,
        sink: &S,
        path: &NodePath,
        label: &str,
        stats: &mut ProjectionStats,
    ) {
        if path.is_empty() {
            return;
        }
        sink.ensure_node(path, &NodeSpec::container(label));
        stats.containers += 1;
    }
}

/// Child segment and label for every element of an array.
///
/// An element is named by `name_field` when naming is not forced to be
/// positional, the element is an object, and the field holds non-empty
/// text. Otherwise its zero-based index is used. Colliding segments get
/// `_1`, `_2`, ... appended in element order.
pub fn array_segments(
    elements: &[Value],
    name_field: Option<&str>,
    force_indexed: bool,
) -> Vec<(String, String)> {
    let mut taken: HashSet<String> = HashSet::with_capacity(elements.len());

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let named = if force_indexed {
                None
            } else {
                name_field.and_then(|field| element_name(element, field))
            };
            let (base, label) = named.unwrap_or_else(|| (index.to_string(), index.to_string()));
            (claim_segment(&mut taken, base), label)
        })
        .collect()
}

/// Reserve `base` among its siblings, appending `_1`, `_2`, ... on collision.
fn claim_segment(taken: &mut HashSet<String>, base: String) -> String {
    let mut segment = base.clone();
    let mut suffix = 1usize;
    while taken.contains(&segment) {
        segment = format!("{base}_{suffix}");
        suffix += 1;
    }
    taken.insert(segment.clone());
    segment
}

/// The sanitized segment and raw label an element is named by, if any.
fn element_name(element: &Value, field: &str) -> Option<(String, String)> {
    let raw = element.as_object()?.get(field)?.as_str()?;
    let segment = sanitize_segment(raw)?;
    Some((segment, raw.trim().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NodeKind, ScalarType, TreeStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn p(raw: &str) -> NodePath {
        NodePath::parse(raw)
    }

    fn named(field: &str) -> JsonTreeProjector {
        JsonTreeProjector::new(ProjectionOptions::labelled("Flowdata").with_array_name_field(field))
    }

    fn segments(value: &Value, field: Option<&str>, force: bool) -> Vec<String> {
        let elements = value.as_array().expect("array");
        array_segments(elements, field, force)
            .into_iter()
            .map(|(segment, _)| segment)
            .collect()
    }

    #[test]
    fn scalars_become_typed_leaves() {
        let store = TreeStore::new();
        let payload = json!({ "power": 1234.5, "status": "OK", "online": true });
        named("name").project(&store, &payload, &p("sys.flowdata"));

        let power = store.get(&p("sys.flowdata.power")).expect("power");
        assert_eq!(power.spec.scalar_type, Some(ScalarType::Number));
        assert_eq!(power.value, Some(ScalarValue::Number(1234.5)));

        let status = store.get(&p("sys.flowdata.status")).expect("status");
        assert_eq!(status.spec.scalar_type, Some(ScalarType::Text));
        assert_eq!(status.value, Some(ScalarValue::Text("OK".into())));

        assert_eq!(store.value(&p("sys.flowdata.online")), Some(ScalarValue::Bool(true)));
    }

    #[test]
    fn mount_container_gets_configured_label() {
        let store = TreeStore::new();
        named("name").project(&store, &json!({ "a": { "b": 1 } }), &p("sys.flowdata"));

        let mount = store.get(&p("sys.flowdata")).expect("mount");
        assert_eq!(mount.spec.kind, NodeKind::Container);
        assert_eq!(mount.spec.label, "Flowdata");
        assert_eq!(store.label(&p("sys.flowdata.a")).as_deref(), Some("a"));
    }

    #[test]
    fn projection_is_idempotent() {
        let payload = json!({
            "site": { "channels": [
                { "name": "PV", "value": 10 },
                { "name": "Load", "value": -3.5 }
            ]},
            "status": "OK",
            "missing": null
        });

        let store = TreeStore::new();
        let first = named("name").project(&store, &payload, &p("sys.feed"));
        let snapshot = store.to_json();
        let count = store.len();

        let second = named("name").project(&store, &payload, &p("sys.feed"));
        assert_eq!(first, second);
        assert_eq!(store.len(), count);
        assert_eq!(store.to_json(), snapshot);
    }

    #[test]
    fn named_elements_survive_reordering() {
        let store = TreeStore::new();
        let projector = named("name");
        projector.project(
            &store,
            &json!([{ "name": "A", "v": 1 }, { "name": "B", "v": 2 }]),
            &p("sys.list"),
        );
        projector.project(
            &store,
            &json!([{ "name": "B", "v": 20 }, { "name": "A", "v": 10 }]),
            &p("sys.list"),
        );

        assert_eq!(store.value(&p("sys.list.A.v")), Some(ScalarValue::Number(10.0)));
        assert_eq!(store.value(&p("sys.list.B.v")), Some(ScalarValue::Number(20.0)));
        assert!(!store.contains(&p("sys.list.0")));
    }

    #[test]
    fn elements_without_name_fall_back_to_index() {
        let value = json!([{ "v": 1 }, { "v": 2 }]);
        assert_eq!(segments(&value, Some("name"), false), vec!["0", "1"]);

        let store = TreeStore::new();
        named("name").project(&store, &value, &p("sys.list"));
        assert_eq!(store.value(&p("sys.list.1.v")), Some(ScalarValue::Number(2.0)));
    }

    #[test]
    fn colliding_names_are_disambiguated() {
        let value = json!([{ "name": "x" }, { "name": " x " }, { "name": "x" }]);
        assert_eq!(segments(&value, Some("name"), false), vec!["x", "x_1", "x_2"]);
    }

    #[test]
    fn sanitized_names_collide_too() {
        let value = json!([{ "name": "a.b" }, { "name": "a_b" }]);
        assert_eq!(segments(&value, Some("name"), false), vec!["a_b", "a_b_1"]);
    }

    #[test]
    fn forced_indexing_ignores_names() {
        let value = json!([{ "name": "A" }, { "name": "B" }]);
        assert_eq!(segments(&value, Some("name"), true), vec!["0", "1"]);
    }

    #[test]
    fn blank_or_non_text_names_use_index() {
        let value = json!([{ "name": "  " }, { "name": 5 }, "scalar", { "name": "ok" }]);
        assert_eq!(segments(&value, Some("name"), false), vec!["0", "1", "2", "ok"]);
    }

    #[test]
    fn named_element_keeps_raw_label() {
        let store = TreeStore::new();
        named("channelName").project(
            &store,
            &json!({ "channels": [{ "channelName": "Power.PV", "value": 1 }] }),
            &p("sys.flowdata"),
        );
        let node = store.get(&p("sys.flowdata.channels.Power_PV")).expect("node");
        assert_eq!(node.spec.label, "Power.PV");
    }

    #[test]
    fn null_never_deletes() {
        let store = TreeStore::new();
        let projector = named("name");
        projector.project(&store, &json!({ "power": 5 }), &p("sys.feed"));
        let stats = projector.project(&store, &json!({ "power": null }), &p("sys.feed"));
        projector.project(&store, &Value::Null, &p("sys.feed"));

        assert_eq!(stats.skipped, 1);
        assert_eq!(store.value(&p("sys.feed.power")), Some(ScalarValue::Number(5.0)));
    }

    #[test]
    fn absent_members_are_kept() {
        let store = TreeStore::new();
        let projector = named("name");
        projector.project(&store, &json!({ "a": 1, "b": 2 }), &p("sys.feed"));
        projector.project(&store, &json!({ "a": 3 }), &p("sys.feed"));

        assert_eq!(store.value(&p("sys.feed.a")), Some(ScalarValue::Number(3.0)));
        assert_eq!(store.value(&p("sys.feed.b")), Some(ScalarValue::Number(2.0)));
    }

    #[test]
    fn container_label_is_not_overwritten() {
        let store = TreeStore::new();
        let projector = named("name");
        projector.project(&store, &json!({ "a": 1 }), &p("sys.feed"));
        store.rename(&p("sys.feed"), "Renamed");
        projector.project(&store, &json!({ "a": 2 }), &p("sys.feed"));

        assert_eq!(store.label(&p("sys.feed")).as_deref(), Some("Renamed"));
    }

    #[test]
    fn keys_with_delimiters_are_sanitized() {
        let store = TreeStore::new();
        named("name").project(&store, &json!({ "a.b": 1, "": 2 }), &p("sys"));
        assert_eq!(store.value(&p("sys.a_b")), Some(ScalarValue::Number(1.0)));
        assert_eq!(store.children(&p("sys")), vec![p("sys.a_b")]);
    }

    #[test]
    fn keys_sanitizing_alike_stay_distinct() {
        let store = TreeStore::new();
        named("name").project(&store, &json!({ "a.b": 1, "a_b": 2 }), &p("sys"));
        assert_eq!(store.value(&p("sys.a_b")), Some(ScalarValue::Number(1.0)));
        assert_eq!(store.value(&p("sys.a_b_1")), Some(ScalarValue::Number(2.0)));
        assert_eq!(store.children(&p("sys")).len(), 2);
        assert_eq!(store.label(&p("sys.a_b_1")).as_deref(), Some("a_b"));
    }

    #[test]
    fn retyped_value_updates_leaf_type() {
        let store = TreeStore::new();
        let projector = named("name");
        projector.project(&store, &json!({ "state": 1 }), &p("sys"));
        projector.project(&store, &json!({ "state": "Sleeping" }), &p("sys"));

        let node = store.get(&p("sys.state")).expect("node");
        assert_eq!(node.spec.kind, NodeKind::Leaf);
        assert_eq!(node.spec.scalar_type, Some(ScalarType::Text));
        assert_eq!(node.value, Some(ScalarValue::from("Sleeping")));
    }

    #[test]
    fn scalar_at_root_is_skipped() {
        let store = TreeStore::new();
        let stats = JsonTreeProjector::default().project(&store, &json!(1), &NodePath::root());
        assert_eq!(stats.skipped, 1);
        assert!(store.is_empty());
    }
}
