use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// Separator between path segments in the textual form.
pub const PATH_SEPARATOR: char = '/';

/// Entity kind carried alongside every path and in the `model` wire field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Cluster,
    Commodity,
    Transport,
}

impl EntityKind {
    /// Whether paths of this kind may have children.
    pub fn can_own_children(self) -> bool {
        matches!(self, EntityKind::Cluster)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Cluster => "Cluster",
            EntityKind::Commodity => "Commodity",
            EntityKind::Transport => "Transport",
        };
        f.write_str(name)
    }
}

/// Immutable hierarchical address of one remote entity.
///
/// Equality and hashing cover both the segment sequence and the kind, so a
/// cluster `/a/b` and a transport `/a/b` never alias in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
    kind: EntityKind,
}

impl Path {
    /// Parses `raw` (e.g. `/root/north`) into a path of the given kind.
    ///
    /// Leading, trailing and repeated separators are ignored; input with no
    /// segments at all fails with [`PathError::InvalidPath`].
    pub fn new(raw: &str, kind: EntityKind) -> Result<Self, PathError> {
        let segments: Vec<String> = raw
            .split(PATH_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(PathError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments, kind })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment.
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Owning cluster path, or `None` for a top-level path.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            kind: EntityKind::Cluster,
        })
    }

    /// Derives the path of a child named `name` with the given kind.
    pub fn child(&self, name: &str, kind: EntityKind) -> Result<Path, PathError> {
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(PathError::InvalidName(name.to_string()));
        }
        if !self.kind.can_own_children() {
            return Err(PathError::InvalidHierarchy {
                path: self.to_string(),
                kind: self.kind,
            });
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments, kind })
    }

    /// True when `self` is the direct parent of `other`.
    pub fn is_parent_of(&self, other: &Path) -> bool {
        other.parent().as_ref() == Some(self)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{PATH_SEPARATOR}{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{EntityKind, Path};
    use crate::error::PathError;

    #[test]
    fn parses_and_renders_segments() {
        let path = Path::new("/root/north/", EntityKind::Cluster).expect("valid path");
        assert_eq!(path.segments(), ["root", "north"]);
        assert_eq!(path.to_string(), "/root/north");
        assert_eq!(path.name(), "north");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            Path::new("", EntityKind::Cluster),
            Err(PathError::InvalidPath(String::new()))
        );
        assert!(matches!(
            Path::new("//", EntityKind::Cluster),
            Err(PathError::InvalidPath(_))
        ));
    }

    #[test]
    fn parent_strips_last_segment() {
        let path = Path::new("/root/north/7", EntityKind::Transport).expect("valid path");
        let parent = path.parent().expect("has parent");
        assert_eq!(parent.to_string(), "/root/north");
        assert_eq!(parent.kind(), EntityKind::Cluster);
        assert!(parent.is_parent_of(&path));

        let top = Path::new("/root", EntityKind::Cluster).expect("valid path");
        assert!(top.parent().is_none());
    }

    #[test]
    fn child_validates_name_and_hierarchy() {
        let root = Path::new("/root", EntityKind::Cluster).expect("valid path");
        let t = root
            .child("7", EntityKind::Transport)
            .expect("clusters own children");
        assert_eq!(t.to_string(), "/root/7");

        assert_eq!(
            root.child("a/b", EntityKind::Commodity),
            Err(PathError::InvalidName("a/b".into()))
        );
        assert!(matches!(
            t.child("x", EntityKind::Commodity),
            Err(PathError::InvalidHierarchy { .. })
        ));
    }

    #[test]
    fn equality_includes_kind() {
        let a = Path::new("/root/7", EntityKind::Transport).expect("valid path");
        let b = Path::new("/root/7", EntityKind::Commodity).expect("valid path");
        assert_ne!(a, b);

        let set: HashSet<Path> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&EntityKind::Commodity).expect("serialize");
        assert_eq!(json, "\"Commodity\"");
    }
}
