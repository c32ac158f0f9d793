use crate::model::Comment;
use std::collections::HashMap;

/// Arena of comments addressed by id, ordered into a thread on `build`
///
/// Parent/child links are lookups through the id index, never references.
#[derive(Debug, Default)]
pub struct CommentTreeBuilder {
    arena: Vec<Comment>,
    index: HashMap<String, usize>,
}

impl CommentTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a comment to the arena
    ///
    /// Returns `false` (and keeps the first copy) if the id is already present.
    pub fn insert(&mut self, comment: Comment) -> bool {
        if self.index.contains_key(&comment.id) {
            return false;
        }
        self.index.insert(comment.id.clone(), self.arena.len());
        self.arena.push(comment);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Emits the thread in pre-order with depths re-derived from the tree
    ///
    /// Top-level comments come first in insertion order, followed by orphans
    /// (declared parent absent), each immediately followed by its subtree.
    /// Orphans keep their `parent_id` but are placed at depth 0. Comments only
    /// reachable through a parent cycle are emitted last, also at depth 0.
    pub fn build(self) -> Vec<Comment> {
        let count = self.arena.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut roots = Vec::new();
        let mut orphans = Vec::new();

        for (pos, comment) in self.arena.iter().enumerate() {
            let parent = comment
                .parent_id
                .as_deref()
                .and_then(|id| self.index.get(id).copied());

            match (parent, &comment.parent_id) {
                (Some(parent), _) if parent != pos => children[parent].push(pos),
                (None, None) => roots.push(pos),
                _ => orphans.push(pos),
            }
        }

        let mut emitted = vec![false; count];
        let mut order = Vec::with_capacity(count);

        for root in roots.into_iter().chain(orphans).chain(0..count) {
            if !emitted[root] {
                emit_subtree(root, &children, &mut emitted, &mut order);
            }
        }

        let mut slots: Vec<Option<Comment>> = self.arena.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|(pos, depth)| {
                slots[pos].take().map(|mut comment| {
                    comment.depth = depth;
                    comment
                })
            })
            .collect()
    }
}

/// Iterative pre-order walk from `root`, recording `(position, depth)`
fn emit_subtree(
    root: usize,
    children: &[Vec<usize>],
    emitted: &mut [bool],
    order: &mut Vec<(usize, u32)>,
) {
    let mut stack = vec![(root, 0u32)];

    while let Some((pos, depth)) = stack.pop() {
        if emitted[pos] {
            continue;
        }
        emitted[pos] = true;
        order.push((pos, depth));

        // Reversed so the first child is popped first
        for &child in children[pos].iter().rev() {
            if !emitted[child] {
                stack.push((child, depth + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;
    use chrono::Utc;

    fn comment(id: &str, parent: Option<&str>) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: "post".to_string(),
            parent_id: parent.map(str::to_string),
            depth: 99,
            author: "author".to_string(),
            author_id: None,
            content: format!("comment {}", id),
            score: 0,
            created_at: Utc::now(),
            updated_at: None,
            platform: Platform::HackerNews,
        }
    }

    fn ids(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.id.as_str()).collect()
    }

    fn depths(comments: &[Comment]) -> Vec<u32> {
        comments.iter().map(|c| c.depth).collect()
    }

    #[test]
    fn test_preorder_from_breadth_first_input() {
        let mut builder = CommentTreeBuilder::new();
        // Breadth-first arrival order: A, B, then C (child of A)
        builder.insert(comment("A", None));
        builder.insert(comment("B", None));
        builder.insert(comment("C", Some("A")));

        let thread = builder.build();
        assert_eq!(ids(&thread), vec!["A", "C", "B"]);
        assert_eq!(depths(&thread), vec![0, 1, 0]);
    }

    #[test]
    fn test_children_follow_parent_before_siblings() {
        let mut builder = CommentTreeBuilder::new();
        for (id, parent) in [
            ("1", None),
            ("2", None),
            ("1a", Some("1")),
            ("1b", Some("1")),
            ("2a", Some("2")),
            ("1a-i", Some("1a")),
        ] {
            builder.insert(comment(id, parent));
        }

        let thread = builder.build();
        assert_eq!(ids(&thread), vec!["1", "1a", "1a-i", "1b", "2", "2a"]);
        assert_eq!(depths(&thread), vec![0, 1, 2, 1, 0, 1]);
    }

    #[test]
    fn test_orphans_appended_at_top_level() {
        let mut builder = CommentTreeBuilder::new();
        builder.insert(comment("orphan", Some("missing")));
        builder.insert(comment("A", None));
        builder.insert(comment("orphan-child", Some("orphan")));

        let thread = builder.build();
        assert_eq!(ids(&thread), vec!["A", "orphan", "orphan-child"]);
        assert_eq!(depths(&thread), vec![0, 0, 1]);
        assert_eq!(thread[1].parent_id.as_deref(), Some("missing"));
    }

    #[test]
    fn test_cycles_are_not_dropped() {
        let mut builder = CommentTreeBuilder::new();
        builder.insert(comment("x", Some("y")));
        builder.insert(comment("y", Some("x")));
        builder.insert(comment("self", Some("self")));

        let thread = builder.build();
        assert_eq!(thread.len(), 3);
        assert_eq!(ids(&thread), vec!["self", "x", "y"]);
    }

    #[test]
    fn test_duplicate_ids_ignored() {
        let mut builder = CommentTreeBuilder::new();
        assert!(builder.insert(comment("A", None)));
        assert!(!builder.insert(comment("A", None)));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_depth_matches_parent() {
        let mut builder = CommentTreeBuilder::new();
        let mut parent: Option<String> = None;
        for i in 0..20 {
            let id = format!("c{}", i);
            builder.insert(comment(&id, parent.as_deref()));
            parent = Some(if i % 3 == 0 { "c0".to_string() } else { id });
        }

        let thread = builder.build();
        let by_id: HashMap<&str, &Comment> =
            thread.iter().map(|c| (c.id.as_str(), c)).collect();

        for c in &thread {
            match c.parent_id.as_deref().and_then(|p| by_id.get(p)) {
                Some(parent) => assert_eq!(c.depth, parent.depth + 1),
                None => assert_eq!(c.depth, 0),
            }
        }
    }
}
