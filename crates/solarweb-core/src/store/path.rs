// ── Node addressing ──
//
// A node path is a list of segments, rendered with `.` between them
// (`sys-1.flowdata.channels.PowerPV.value`). Segments never contain the
// delimiter: everything that becomes a segment goes through
// `sanitize_segment` first.

use std::fmt;

use serde::{Serialize, Serializer};

/// Separator between rendered path segments.
pub const PATH_DELIMITER: char = '.';

/// Longest segment (in chars) produced by [`sanitize_segment`].
pub const MAX_SEGMENT_LEN: usize = 64;

/// Characters the state store refuses inside a segment.
const FORBIDDEN_CHARS: &[char] = &[
    PATH_DELIMITER,
    '[',
    ']',
    '*',
    ',',
    ';',
    '\'',
    '"',
    '`',
    '<',
    '>',
    '\\',
    '?',
];

const SUBSTITUTE: char = '_';

/// Address of a node in the state tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Split a rendered path on the delimiter. Empty segments are dropped.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(PATH_DELIMITER)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// A new path one level below `self`.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The last segment, or `None` at the root.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_DELIMITER}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&str> for NodePath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Turn arbitrary payload text into a legal path segment.
///
/// Trims surrounding whitespace, replaces the delimiter, control
/// characters and store-forbidden characters with `_`, and caps the
/// result at [`MAX_SEGMENT_LEN`] chars. Returns `None` when nothing is
/// left after trimming.
pub fn sanitize_segment(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let sanitized: String = trimmed
        .chars()
        .take(MAX_SEGMENT_LEN)
        .map(|c| {
            if c.is_control() || FORBIDDEN_CHARS.contains(&c) {
                SUBSTITUTE
            } else {
                c
            }
        })
        .collect();

    // Truncation can expose trailing whitespace again.
    let sanitized = sanitized.trim_end();
    (!sanitized.is_empty()).then(|| sanitized.to_owned())
}
