//! The per-user `FileTree`: a tagged tree of nodes mirroring the user's
//! on-disk directory, persisted opaquely by the backend (§3, §4.G).
//!
//! Order within a folder's `children` is insertion order and is part of
//! the observable contract — clients render it directly, so nothing here
//! may sort or otherwise reorder a `Vec<Node>`.

use serde_derive::{Deserialize, Serialize};

use crate::errors::TreeError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    File { name: String },
    Folder { name: String, children: Vec<Node> },
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File { name } => name,
            Node::Folder { name, .. } => name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Node::Folder { .. })
    }
}

/// The root of a user's visible filesystem. The root itself has no name
/// and is always a folder; `children` holds the top-level entries.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FileTree {
    pub children: Vec<Node>,
}

/// A path, `/`-separated, with the external-interface rules from §3/§4.G
/// already checked: no `..`, no leading `/`, no empty components.
pub struct ValidPath {
    components: Vec<String>,
}

impl ValidPath {
    pub fn parse(path: &str) -> Result<ValidPath, TreeError> {
        if path.is_empty() {
            return Err(TreeError::InvalidPath(path.to_string()));
        }
        if path.starts_with('/') {
            return Err(TreeError::InvalidPath(path.to_string()));
        }
        let mut components = Vec::new();
        for part in path.split('/') {
            if part.is_empty() || part == ".." {
                return Err(TreeError::InvalidPath(path.to_string()));
            }
            components.push(part.to_string());
        }
        Ok(ValidPath { components })
    }

    pub fn leaf(&self) -> &str {
        self.components.last().expect("non-empty by construction")
    }

    pub fn parent_components(&self) -> &[String] {
        &self.components[..self.components.len() - 1]
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn as_disk_relative(&self) -> String {
        self.components.join("/")
    }
}

impl FileTree {
    pub fn new() -> FileTree {
        FileTree::default()
    }

    fn find_folder_mut<'a>(
        children: &'a mut Vec<Node>,
        path: &[String],
    ) -> Result<&'a mut Vec<Node>, TreeError> {
        if path.is_empty() {
            return Ok(children);
        }
        let name = &path[0];
        for node in children.iter_mut() {
            if node.name() == name {
                return match node {
                    Node::Folder { children, .. } => FileTree::find_folder_mut(children, &path[1..]),
                    Node::File { .. } => Err(TreeError::InvalidPath(name.clone())),
                };
            }
        }
        Err(TreeError::NotFound(name.clone()))
    }

    fn find_folder<'a>(children: &'a [Node], path: &[String]) -> Result<&'a [Node], TreeError> {
        if path.is_empty() {
            return Ok(children);
        }
        let name = &path[0];
        for node in children.iter() {
            if node.name() == name {
                return match node {
                    Node::Folder { children, .. } => FileTree::find_folder(children, &path[1..]),
                    Node::File { .. } => Err(TreeError::InvalidPath(name.clone())),
                };
            }
        }
        Err(TreeError::NotFound(name.clone()))
    }

    /// Traverses the tree, matching `name` case-sensitively and requiring
    /// `type==folder` at every intermediate step (§4.G `find`).
    pub fn find(&self, path: &ValidPath) -> Result<&[Node], TreeError> {
        FileTree::find_folder(&self.children, path.components())
    }

    pub fn create_file(&mut self, path: &ValidPath) -> Result<(), TreeError> {
        let parent = FileTree::find_folder_mut(&mut self.children, path.parent_components())?;
        if parent.iter().any(|n| n.name() == path.leaf()) {
            return Err(TreeError::NameCollision(path.leaf().to_string()));
        }
        parent.push(Node::File { name: path.leaf().to_string() });
        Ok(())
    }

    pub fn create_dir(&mut self, path: &ValidPath) -> Result<(), TreeError> {
        let parent = FileTree::find_folder_mut(&mut self.children, path.parent_components())?;
        if parent.iter().any(|n| n.name() == path.leaf()) {
            return Err(TreeError::NameCollision(path.leaf().to_string()));
        }
        parent.push(Node::Folder { name: path.leaf().to_string(), children: Vec::new() });
        Ok(())
    }

    pub fn delete(&mut self, path: &ValidPath) -> Result<(), TreeError> {
        let parent = FileTree::find_folder_mut(&mut self.children, path.parent_components())?;
        let idx = parent
            .iter()
            .position(|n| n.name() == path.leaf())
            .ok_or_else(|| TreeError::NotFound(path.leaf().to_string()))?;
        parent.remove(idx);
        Ok(())
    }

    pub fn contains_file(&self, path: &ValidPath) -> bool {
        match FileTree::find_folder(&self.children, path.parent_components()) {
            Ok(siblings) => siblings
                .iter()
                .any(|n| n.name() == path.leaf() && !n.is_folder()),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotdot_and_leading_slash() {
        assert!(ValidPath::parse("../etc/passwd").is_err());
        assert!(ValidPath::parse("/etc/passwd").is_err());
        assert!(ValidPath::parse("a//b").is_err());
        assert!(ValidPath::parse("").is_err());
    }

    #[test]
    fn create_file_and_dir_preserve_insertion_order() {
        let mut tree = FileTree::new();
        tree.create_dir(&ValidPath::parse("a").unwrap()).unwrap();
        tree.create_file(&ValidPath::parse("a/b.py").unwrap()).unwrap();
        tree.create_file(&ValidPath::parse("a/aaa.py").unwrap()).unwrap();

        let a_children = tree.find(&ValidPath::parse("a").unwrap()).unwrap();
        let names: Vec<&str> = a_children.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["b.py", "aaa.py"]);
    }

    #[test]
    fn name_collision_rejected() {
        let mut tree = FileTree::new();
        tree.create_file(&ValidPath::parse("a.py").unwrap()).unwrap();
        let err = tree.create_file(&ValidPath::parse("a.py").unwrap()).unwrap_err();
        assert!(matches!(err, TreeError::NameCollision(_)));
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn delete_removes_leaf() {
        let mut tree = FileTree::new();
        tree.create_file(&ValidPath::parse("a.py").unwrap()).unwrap();
        tree.delete(&ValidPath::parse("a.py").unwrap()).unwrap();
        assert!(tree.children.is_empty());
    }

    #[test]
    fn find_through_file_component_fails() {
        let mut tree = FileTree::new();
        tree.create_file(&ValidPath::parse("a.py").unwrap()).unwrap();
        assert!(tree.find(&ValidPath::parse("a.py/b").unwrap()).is_err());
    }

    #[test]
    fn serializes_with_tagged_shape() {
        let mut tree = FileTree::new();
        tree.create_dir(&ValidPath::parse("a").unwrap()).unwrap();
        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"type\":\"folder\""));
    }
}
