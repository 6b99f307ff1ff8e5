//! Wildcard privilege trie for a single action type.
//!
//! The tree has a fixed shape:
//!
//! ```text
//! root (depth 0)
//!  └─ database (depth 1)
//!      └─ table (depth 2)
//!          └─ column (depth 3, leaf)
//! ```
//!
//! A node's wildcard flag grants everything below it, current and future.
//! Explicit children may coexist with the flag; they are redundant while the
//! flag is set but stay independently revocable. A column leaf grants by
//! existing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};
use crate::path::{PathItem, PrivilegePath, WILDCARD};

/// Depth of the unnamed root node.
pub const ROOT_DEPTH: u8 = 0;
/// Depth of column leaves. Nodes at this depth never have children.
pub const LEAF_DEPTH: u8 = 3;

/// One level of the privilege trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    content: String,
    has_wildcard: bool,
    children: BTreeMap<String, Node>,
    depth: u8,
}

impl Node {
    fn root() -> Self {
        Self::new(String::new(), ROOT_DEPTH)
    }

    fn new(content: String, depth: u8) -> Self {
        debug_assert!(depth <= LEAF_DEPTH, "node below column level");
        Self {
            content,
            has_wildcard: false,
            children: BTreeMap::new(),
            depth,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn has_wildcard(&self) -> bool {
        self.has_wildcard
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn is_leaf(&self) -> bool {
        self.depth == LEAF_DEPTH
    }

    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    pub fn child(&self, content: &str) -> Option<&Node> {
        self.children.get(content)
    }

    fn descend(&self, chain: &[&str]) -> Option<&Node> {
        chain
            .iter()
            .try_fold(self, |node, segment| node.children.get(*segment))
    }

    fn descend_mut(&mut self, chain: &[&str]) -> Option<&mut Node> {
        chain
            .iter()
            .try_fold(self, |node, segment| node.children.get_mut(*segment))
    }

    fn descend_or_create(&mut self, chain: &[&str]) -> &mut Node {
        chain.iter().fold(self, |node, segment| {
            let depth = node.depth + 1;
            node.children
                .entry((*segment).to_string())
                .or_insert_with(|| Node::new((*segment).to_string(), depth))
        })
    }

    /// Interior nodes with neither a wildcard nor children grant nothing.
    fn is_prunable(&self) -> bool {
        self.depth != ROOT_DEPTH
            && self.depth != LEAF_DEPTH
            && !self.has_wildcard
            && self.children.is_empty()
    }

    /// Removes empty interior descendants bottom-up.
    fn prune(&mut self) {
        for child in self.children.values_mut() {
            child.prune();
        }
        self.children.retain(|_, child| !child.is_prunable());
    }

    fn is_novel(&self, items: &[PathItem<'_>]) -> bool {
        items.iter().any(|item| match item {
            PathItem::Wildcard => !self.has_wildcard,
            PathItem::Column(column) => !self.children.contains_key(*column),
        })
    }
}

/// Grants for one action type, organised as a database → table → column
/// trie with wildcard flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeTree {
    root: Node,
}

impl Default for PrivilegeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivilegeTree {
    pub fn new() -> Self {
        Self { root: Node::root() }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Returns whether nothing is granted.
    pub fn is_empty(&self) -> bool {
        !self.root.has_wildcard && self.root.children.is_empty()
    }

    /// Grants `path`, creating missing intermediate nodes.
    ///
    /// A `*` segment sets the wildcard flag on its parent. Fails with
    /// [`AccessError::AlreadyGranted`] when the path adds no new node and no
    /// new wildcard; a column list where only some entries are new succeeds.
    pub fn grant(&mut self, path: &PrivilegePath) -> Result<()> {
        let (chain, items) = path.target();

        let novel = self
            .root
            .descend(&chain)
            .is_none_or(|node| node.is_novel(&items));
        if !novel {
            return Err(AccessError::AlreadyGranted(path.to_string()));
        }

        let node = self.root.descend_or_create(&chain);
        let child_depth = node.depth + 1;
        for item in items {
            match item {
                PathItem::Wildcard => node.has_wildcard = true,
                PathItem::Column(column) => {
                    node.children
                        .entry(column.to_string())
                        .or_insert_with(|| Node::new(column.to_string(), child_depth));
                }
            }
        }

        Ok(())
    }

    /// Revokes `path`, then prunes branches left without grants.
    ///
    /// Revoking a wildcard below the root also clears every explicit child of
    /// that node: revoking `db.*` drops all table grants in `db`, revoking
    /// `db.t.*` (or `db.t`) drops all column grants in `t`. Fails with
    /// [`AccessError::NoSuchGrant`] only when nothing was removed.
    pub fn revoke(&mut self, path: &PrivilegePath) -> Result<()> {
        let (chain, items) = path.target();
        let clears_children = !chain.is_empty();

        let Some(node) = self.root.descend_mut(&chain) else {
            return Err(AccessError::NoSuchGrant(path.to_string()));
        };

        let mut removed = false;
        for item in items {
            match item {
                PathItem::Wildcard => {
                    removed |= std::mem::take(&mut node.has_wildcard);
                    if clears_children && !node.children.is_empty() {
                        node.children.clear();
                        removed = true;
                    }
                }
                PathItem::Column(column) => {
                    removed |= node.children.remove(column).is_some();
                }
            }
        }

        if !removed {
            return Err(AccessError::NoSuchGrant(path.to_string()));
        }

        self.root.prune();
        Ok(())
    }

    /// Returns whether `path` is covered by this tree.
    ///
    /// True as soon as any node on the chain (root included) carries a
    /// wildcard. Otherwise every requested column must exist as a leaf. A
    /// missing intermediate node means "not granted", never an error.
    pub fn check(&self, path: &PrivilegePath) -> bool {
        let (chain, items) = path.target();

        let mut node = &self.root;
        if node.has_wildcard {
            return true;
        }
        for segment in chain {
            match node.children.get(segment) {
                Some(child) if child.has_wildcard => return true,
                Some(child) => node = child,
                None => return false,
            }
        }

        items.iter().all(|item| match item {
            PathItem::Wildcard => false,
            PathItem::Column(column) => node.children.contains_key(*column),
        })
    }

    /// Lists the grants held by this tree in canonical combined form.
    ///
    /// Wildcards are rendered as `*`, `db.*` and `db.t.*`; sibling column
    /// leaves are grouped into one `db.t.c1;c2` path. Granting the listed
    /// paths into an empty tree reproduces this tree.
    pub fn paths(&self) -> Vec<PrivilegePath> {
        let mut out = Vec::new();
        if self.root.has_wildcard {
            out.extend(PrivilegePath::database(WILDCARD));
        }
        for db in self.root.children.values() {
            if db.has_wildcard {
                out.extend(PrivilegePath::table(&db.content, WILDCARD));
            }
            for table in db.children.values() {
                if table.has_wildcard {
                    out.extend(PrivilegePath::columns(&db.content, &table.content, &[WILDCARD]));
                }
                let columns: Vec<&str> = table.children.keys().map(String::as_str).collect();
                if !columns.is_empty() {
                    out.extend(PrivilegePath::columns(&db.content, &table.content, &columns));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PrivilegePath {
        s.parse().unwrap()
    }

    #[test]
    fn database_wildcard_covers_any_table() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.*")).unwrap();

        assert!(tree.check(&p("db1.anyTable")));
        assert!(tree.check(&p("db1.anyTable.anyColumn")));
        assert!(tree.check(&p("db1")));
        assert!(!tree.check(&p("db2.t1")));
    }

    #[test]
    fn column_grants_are_exact() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1.col1;col2")).unwrap();

        assert!(tree.check(&p("db1.t1.col1")));
        assert!(tree.check(&p("db1.t1.col2")));
        assert!(tree.check(&p("db1.t1.col1;col2")));
        assert!(!tree.check(&p("db1.t1.col3")));
        assert!(!tree.check(&p("db1.t1.col1;col3")));
        assert!(!tree.check(&p("db1.t1")));
        assert!(!tree.check(&p("db1")));
    }

    #[test]
    fn root_wildcard_covers_everything() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("*")).unwrap();

        assert!(tree.check(&p("any")));
        assert!(tree.check(&p("any.thing")));
        assert!(tree.check(&p("any.thing.at;all")));
    }

    #[test]
    fn table_grant_is_table_wildcard() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1")).unwrap();

        assert!(tree.check(&p("db1.t1")));
        assert!(tree.check(&p("db1.t1.c9")));
        assert!(!tree.check(&p("db1.t2")));
        assert!(matches!(
            tree.grant(&p("db1.t1.*")),
            Err(AccessError::AlreadyGranted(_))
        ));
    }

    #[test]
    fn duplicate_grant_fails() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1.c1")).unwrap();

        assert_eq!(
            tree.grant(&p("db1.t1.c1")),
            Err(AccessError::AlreadyGranted("db1.t1.c1".to_string()))
        );
        // Partially new lists succeed.
        tree.grant(&p("db1.t1.c1;c2")).unwrap();
        assert!(tree.check(&p("db1.t1.c2")));
    }

    #[test]
    fn explicit_children_coexist_with_wildcard() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1.c1")).unwrap();
        tree.grant(&p("*")).unwrap();

        // The leaf is redundant under the root wildcard but still revocable.
        tree.revoke(&p("db1.t1.c1")).unwrap();
        assert!(tree.check(&p("db1.t1.c1")));

        tree.revoke(&p("*")).unwrap();
        assert!(!tree.check(&p("db1.t1.c1")));
        assert!(tree.is_empty());
    }

    #[test]
    fn revoke_missing_fails() {
        let mut tree = PrivilegeTree::new();
        assert_eq!(
            tree.revoke(&p("db1.t1")),
            Err(AccessError::NoSuchGrant("db1.t1".to_string()))
        );

        tree.grant(&p("db1.t1.c1")).unwrap();
        assert!(matches!(
            tree.revoke(&p("db1.t1.c2;c3")),
            Err(AccessError::NoSuchGrant(_))
        ));
        // Partial match succeeds.
        tree.revoke(&p("db1.t1.c1;c2")).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn table_wildcard_revoke_clears_columns() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1.c1;c2")).unwrap();
        tree.grant(&p("db1.t2.c1")).unwrap();

        tree.revoke(&p("db1.t1.*")).unwrap();
        assert!(!tree.check(&p("db1.t1.c1")));
        assert!(tree.check(&p("db1.t2.c1")));

        tree.revoke(&p("db1.*")).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn root_wildcard_revoke_keeps_children() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("*")).unwrap();
        tree.grant(&p("db1.t1")).unwrap();

        tree.revoke(&p("*")).unwrap();
        assert!(tree.check(&p("db1.t1")));
        assert!(!tree.check(&p("db2")));
    }

    #[test]
    fn revoke_prunes_empty_branches() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1.c1")).unwrap();
        tree.grant(&p("db1.t2.c1")).unwrap();

        tree.revoke(&p("db1.t1.c1")).unwrap();
        let db1 = tree.root().child("db1").unwrap();
        assert!(db1.child("t1").is_none());
        assert!(db1.child("t2").is_some());

        tree.revoke(&p("db1.t2.c1")).unwrap();
        assert!(tree.root().child("db1").is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn node_depths() {
        let mut tree = PrivilegeTree::new();
        tree.grant(&p("db1.t1.c1")).unwrap();

        let db = tree.root().child("db1").unwrap();
        let table = db.child("t1").unwrap();
        let column = table.child("c1").unwrap();
        assert_eq!(tree.root().depth(), ROOT_DEPTH);
        assert_eq!(db.depth(), 1);
        assert_eq!(table.depth(), 2);
        assert_eq!(column.depth(), LEAF_DEPTH);
        assert!(column.is_leaf());
        assert_eq!(column.children().count(), 0);
    }

    #[test]
    fn paths_rebuild_the_tree() {
        let mut tree = PrivilegeTree::new();
        for path in ["*", "db1.*", "db1.t1.c1;c2", "db2.t1", "db2.t2.x"] {
            tree.grant(&p(path)).unwrap();
        }

        let listed: Vec<String> = tree.paths().iter().map(ToString::to_string).collect();
        assert_eq!(
            listed,
            vec!["*", "db1.*", "db1.t1.c1;c2", "db2.t1.*", "db2.t2.x"]
        );

        let mut rebuilt = PrivilegeTree::new();
        for path in tree.paths() {
            rebuilt.grant(&path).unwrap();
        }
        assert_eq!(rebuilt, tree);
    }
}
