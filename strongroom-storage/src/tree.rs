//! The recursive object tree: directory nodes owning child maps of
//! sub-directories and file entries.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    File,
    /// Reserved; the pipeline only produces `File` entries.
    Dir,
}

/// A stored object as the index knows it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Full logical path as presented by the client.
    pub path: String,
    /// hex(SHA-256) of the physical storage path at creation time.
    pub file_id: String,
    /// Declared plaintext size.
    pub size_bytes: u64,
    pub kind: ObjectKind,
    pub created_ms: i64,
    pub modified_ms: i64,
}

/// One row of a listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub created_ms: i64,
    pub modified_ms: i64,
}

/// A directory node. Child directories and local files live in separate
/// maps keyed by segment name; subtrees are owned, no back-pointers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirNode {
    pub created_ms: i64,
    pub modified_ms: i64,
    #[serde(default)]
    pub sub_storage: HashMap<String, DirNode>,
    #[serde(default)]
    pub storage: HashMap<String, ObjectEntry>,
}

/// Split a logical path on `/`, suppressing empty segments and rejecting
/// `..` outright.
pub(crate) fn split_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == ".." {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        segments.push(segment);
    }
    Ok(segments)
}

impl DirNode {
    pub fn new(now_ms: i64) -> Self {
        Self {
            created_ms: now_ms,
            modified_ms: now_ms,
            sub_storage: HashMap::new(),
            storage: HashMap::new(),
        }
    }

    fn child_dir_mut(&mut self, name: &str, now_ms: i64) -> &mut DirNode {
        self.sub_storage
            .entry(name.to_string())
            .or_insert_with(|| DirNode::new(now_ms))
    }

    /// Insert an entry for `logical_path`, creating intermediate nodes.
    /// An occupied leaf fails `Duplicate` unless `overwrite` is set, in
    /// which case the entry keeps its `created_ms` and the same path
    /// yields the same `file_id` upstream, so the blob is replaced.
    pub fn store(
        &mut self,
        file_id: &str,
        logical_path: &str,
        size_bytes: u64,
        kind: ObjectKind,
        overwrite: bool,
        now_ms: i64,
    ) -> Result<ObjectEntry, StoreError> {
        let segments = split_segments(logical_path)?;
        let (leaf, dirs) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(logical_path.to_string()))?;

        let mut node = self;
        for dir in dirs {
            node = node.child_dir_mut(dir, now_ms);
        }

        let entry = match node.storage.get(*leaf) {
            Some(existing) if !overwrite => {
                return Err(StoreError::Duplicate(existing.path.clone()));
            }
            Some(existing) => ObjectEntry {
                path: logical_path.to_string(),
                file_id: file_id.to_string(),
                size_bytes,
                kind,
                created_ms: existing.created_ms,
                modified_ms: now_ms,
            },
            None => ObjectEntry {
                path: logical_path.to_string(),
                file_id: file_id.to_string(),
                size_bytes,
                kind,
                created_ms: now_ms,
                modified_ms: now_ms,
            },
        };

        node.storage.insert((*leaf).to_string(), entry.clone());
        node.modified_ms = now_ms;
        Ok(entry)
    }

    /// Resolve a file entry by its full logical path.
    pub fn get_file(&self, logical_path: &str) -> Result<&ObjectEntry, StoreError> {
        let segments = split_segments(logical_path)?;
        let (leaf, dirs) = segments
            .split_last()
            .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))?;

        let mut node = self;
        for dir in dirs {
            node = node
                .sub_storage
                .get(*dir)
                .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))?;
        }
        node.storage
            .get(*leaf)
            .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))
    }

    /// Resolve the subtree rooted at a directory path. `/` is the root.
    pub fn get_subtree(&self, logical_path: &str) -> Result<&DirNode, StoreError> {
        let segments = split_segments(logical_path)?;
        let mut node = self;
        for dir in segments {
            node = node
                .sub_storage
                .get(dir)
                .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))?;
        }
        Ok(node)
    }

    /// Remove the entry at `logical_path`, returning it so the caller can
    /// unlink the blob. Not a recursive directory delete.
    pub fn remove(&mut self, logical_path: &str) -> Result<ObjectEntry, StoreError> {
        let segments = split_segments(logical_path)?;
        let (leaf, dirs) = segments
            .split_last()
            .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))?;

        let mut node = self;
        for dir in dirs {
            node = node
                .sub_storage
                .get_mut(*dir)
                .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))?;
        }
        node.storage
            .remove(*leaf)
            .ok_or_else(|| StoreError::NotFound(logical_path.to_string()))
    }

    /// Breadth-first listing of the subtree at `logical_path`. With
    /// `recursive` unset only the direct children are returned. Entries
    /// within a node come out name-sorted so listings are stable.
    pub fn list(
        &self,
        logical_path: &str,
        recursive: bool,
    ) -> Result<Vec<ContentEntry>, StoreError> {
        let start = self.get_subtree(logical_path)?;

        let mut out = Vec::new();
        let mut queue: VecDeque<&DirNode> = VecDeque::new();
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            let mut names: Vec<&String> = node.storage.keys().collect();
            names.sort();
            for name in names {
                let entry = &node.storage[name];
                out.push(ContentEntry {
                    name: name.clone(),
                    path: entry.path.clone(),
                    size_bytes: entry.size_bytes,
                    created_ms: entry.created_ms,
                    modified_ms: entry.modified_ms,
                });
            }

            if recursive {
                let mut dirs: Vec<&String> = node.sub_storage.keys().collect();
                dirs.sort();
                for dir in dirs {
                    queue.push_back(&node.sub_storage[dir]);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_twice_without_overwrite_keeps_first() {
        let mut root = DirNode::new(0);
        root.store("id-a", "/x", 1, ObjectKind::File, false, 10).unwrap();
        let err = root.store("id-b", "/x", 2, ObjectKind::File, false, 20);
        assert!(matches!(err, Err(StoreError::Duplicate(_))));
        assert_eq!(root.get_file("/x").unwrap().file_id, "id-a");
    }

    #[test]
    fn overwrite_keeps_created_bumps_modified() {
        let mut root = DirNode::new(0);
        root.store("id-a", "/x", 1, ObjectKind::File, false, 10).unwrap();
        let entry = root.store("id-a", "/x", 2, ObjectKind::File, true, 20).unwrap();
        assert_eq!(entry.created_ms, 10);
        assert_eq!(entry.modified_ms, 20);
        assert_eq!(entry.size_bytes, 2);
    }

    #[test]
    fn dotdot_segment_is_invalid() {
        let mut root = DirNode::new(0);
        assert!(matches!(
            root.store("id", "/a/../b", 1, ObjectKind::File, false, 10),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(root.get_file("/../x"), Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn empty_segments_are_suppressed() {
        let mut root = DirNode::new(0);
        root.store("id", "//a///b//c", 1, ObjectKind::File, false, 10).unwrap();
        assert_eq!(root.get_file("/a/b/c").unwrap().file_id, "id");
    }

    #[test]
    fn list_non_recursive_is_direct_children_only() {
        let mut root = DirNode::new(0);
        root.store("1", "/top", 1, ObjectKind::File, false, 10).unwrap();
        root.store("2", "/dir/nested", 1, ObjectKind::File, false, 10).unwrap();

        let direct = root.list("/", false).unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].name, "top");

        let all = root.list("/", true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn remove_then_get_is_not_found() {
        let mut root = DirNode::new(0);
        root.store("id", "/a/b", 1, ObjectKind::File, false, 10).unwrap();
        let removed = root.remove("/a/b").unwrap();
        assert_eq!(removed.file_id, "id");
        assert!(matches!(root.get_file("/a/b"), Err(StoreError::NotFound(_))));
    }
}
