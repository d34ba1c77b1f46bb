// ── In-memory hierarchical state store ──
//
// Lock-free concurrent node map with push-based change notification.
// Every mutation bumps a `watch` version counter; unacknowledged writes
// (commands coming from outside the mirror) are additionally broadcast.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use super::{NodeKind, NodePath, NodeSpec, ScalarValue, StateSink};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// A stored node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub spec: NodeSpec,
    pub value: Option<ScalarValue>,
    /// `false` while an inbound command has not been handled yet.
    pub ack: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An unacknowledged write, i.e. an inbound command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandWrite {
    pub path: NodePath,
    pub value: ScalarValue,
}

/// Reference [`StateSink`] keeping the whole tree in memory.
pub struct TreeStore {
    nodes: DashMap<NodePath, Node>,
    version: watch::Sender<u64>,
    commands: broadcast::Sender<CommandWrite>,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (commands, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            nodes: DashMap::new(),
            version,
            commands,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, path: &NodePath) -> Option<Node> {
        self.nodes.get(path).map(|r| r.value().clone())
    }

    pub fn value(&self, path: &NodePath) -> Option<ScalarValue> {
        self.nodes.get(path).and_then(|r| r.value.clone())
    }

    pub fn label(&self, path: &NodePath) -> Option<String> {
        self.nodes.get(path).map(|r| r.spec.label.clone())
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children of `parent`, sorted.
    pub fn children(&self, parent: &NodePath) -> Vec<NodePath> {
        let depth = parent.len() + 1;
        let mut children: Vec<NodePath> = self
            .nodes
            .iter()
            .filter(|r| r.key().len() == depth && r.key().segments().starts_with(parent.segments()))
            .map(|r| r.key().clone())
            .collect();
        children.sort();
        children
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Receive every unacknowledged write made after this call.
    pub fn subscribe_commands(&self) -> broadcast::Receiver<CommandWrite> {
        self.commands.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── External writers ─────────────────────────────────────────────

    /// Write a command value into a writable leaf, as an external process
    /// would. Returns `false` if the node is missing or read-only.
    pub fn write_command(&self, path: &NodePath, value: ScalarValue) -> bool {
        let writable = self.nodes.get(path).is_some_and(|r| r.spec.writable);
        if !writable {
            debug!(path = %path, "rejected command write to non-writable node");
            return false;
        }
        self.set_value(path, value, false);
        true
    }

    /// Relabel an existing node, as a user editing the store would.
    /// Later `ensure_node` calls never undo this.
    pub fn rename(&self, path: &NodePath, label: impl Into<String>) -> bool {
        let renamed = self
            .nodes
            .get_mut(path)
            .map(|mut r| r.spec.label = label.into())
            .is_some();
        if renamed {
            self.bump_version();
        }
        renamed
    }

    // ── Export ───────────────────────────────────────────────────────

    /// The whole tree as nested JSON: containers become objects, leaves
    /// their value (`null` until first written).
    pub fn to_json(&self) -> Value {
        let mut entries: Vec<(NodePath, Node)> = self
            .nodes
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut root = Map::new();
        'entries: for (path, node) in entries {
            let Some((name, parents)) = path.segments().split_last() else {
                continue;
            };

            let mut cursor = &mut root;
            for segment in parents {
                let slot = cursor
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    // A leaf that later grew children renders as a container.
                    *slot = Value::Object(Map::new());
                }
                cursor = match slot {
                    Value::Object(map) => map,
                    _ => continue 'entries,
                };
            }

            match node.spec.kind {
                NodeKind::Container => {
                    cursor
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                }
                NodeKind::Leaf => {
                    let value = node.value.as_ref().map_or(Value::Null, ScalarValue::to_json);
                    cursor.insert(name.clone(), value);
                }
            }
        }
        Value::Object(root)
    }

    /// Write [`to_json`](Self::to_json) to `path`, replacing it atomically.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(&self.to_json()).map_err(io::Error::other)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        trace!(path = %path.display(), "state snapshot written");
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}

impl StateSink for TreeStore {
    fn ensure_node(&self, path: &NodePath, spec: &NodeSpec) {
        let mut created = false;
        self.nodes.entry(path.clone()).or_insert_with(|| {
            created = true;
            Node {
                spec: spec.clone(),
                value: None,
                ack: true,
                updated_at: None,
            }
        });
        if created {
            trace!(path = %path, kind = %spec.kind, "node created");
            self.bump_version();
        }
    }

    fn set_value(&self, path: &NodePath, value: ScalarValue, ack: bool) {
        let now = Utc::now();
        {
            let mut entry = self.nodes.entry(path.clone()).or_insert_with(|| Node {
                spec: NodeSpec::leaf(path.name().unwrap_or_default(), value.scalar_type()),
                value: None,
                ack,
                updated_at: None,
            });
            let scalar_type = value.scalar_type();
            if entry.spec.kind == NodeKind::Leaf && entry.spec.scalar_type != Some(scalar_type) {
                entry.spec.scalar_type = Some(scalar_type);
            }
            entry.value = Some(value.clone());
            entry.ack = ack;
            entry.updated_at = Some(now);
        }
        self.bump_version();

        if !ack {
            // No receivers is fine: nobody is listening for commands.
            let _ = self.commands.send(CommandWrite {
                path: path.clone(),
                value,
            });
        }
    }
}
