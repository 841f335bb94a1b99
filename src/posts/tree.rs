use std::collections::HashMap;

use uuid::Uuid;

use crate::posts::model::Comment;

/// Index over a flat slice of comments. The slice is the arena; parent links
/// are resolved by id lookup, so a malformed parent can never form a cycle
/// that the walk follows forever.
pub struct CommentTree<'a> {
    arena: &'a [Comment],
    by_id: HashMap<Uuid, usize>,
    children: HashMap<Uuid, Vec<usize>>,
    roots: Vec<usize>,
}

impl<'a> CommentTree<'a> {
    pub fn build(arena: &'a [Comment]) -> Self {
        let mut by_id = HashMap::with_capacity(arena.len());
        let mut children: HashMap<Uuid, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (idx, c) in arena.iter().enumerate() {
            by_id.insert(c.id, idx);
            match c.parent_id {
                Some(parent) => children.entry(parent).or_default().push(idx),
                None => roots.push(idx),
            }
        }
        Self {
            arena,
            by_id,
            children,
            roots,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&'a Comment> {
        self.by_id.get(&id).map(|&i| &self.arena[i])
    }

    pub fn roots(&self) -> impl Iterator<Item = &'a Comment> + '_ {
        self.roots.iter().map(|&i| &self.arena[i])
    }

    /// Direct replies, in arena order.
    pub fn replies(&self, id: Uuid) -> impl Iterator<Item = &'a Comment> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.arena[i])
    }

    pub fn has_replies(&self, id: Uuid) -> bool {
        self.children.get(&id).is_some_and(|c| !c.is_empty())
    }

    /// `id` and everything below it. Each arena slot is visited at most once.
    pub fn subtree(&self, id: Uuid) -> Vec<&'a Comment> {
        let Some(&start) = self.by_id.get(&id) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.arena.len()];
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            let c = &self.arena[idx];
            out.push(c);
            if let Some(kids) = self.children.get(&c.id) {
                stack.extend(kids.iter().rev());
            }
        }
        out
    }
}
