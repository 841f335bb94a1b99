use std::collections::{HashMap, HashSet};

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::posts::model::{Comment, CommentStats, Like, Post, PostStats};
use crate::posts::tree::CommentTree;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorView {
    pub id: Uuid,
    pub username: String,
    pub photo: Option<String>,
}

impl AuthorView {
    fn missing(id: Uuid) -> Self {
        Self {
            id,
            username: String::new(),
            photo: None,
        }
    }
}

pub type Authors = HashMap<Uuid, AuthorView>;

fn author(authors: &Authors, id: Uuid) -> AuthorView {
    authors
        .get(&id)
        .cloned()
        .unwrap_or_else(|| AuthorView::missing(id))
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub author: AuthorView,
    pub image: String,
    pub description: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub post_likes_count: i64,
    pub post_comments_count: i64,
    pub me_liked: bool,
}

impl PostView {
    /// `image_url` is the presigned URL of `post.image`.
    pub fn new(post: Post, image_url: String, stats: PostStats, authors: &Authors) -> Self {
        Self {
            id: post.id,
            author: author(authors, post.author_id),
            image: image_url,
            description: post.description,
            created_at: post.created_at,
            updated_at: post.updated_at,
            post_likes_count: stats.likes,
            post_comments_count: stats.comments,
            me_liked: stats.me_liked,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub author: AuthorView,
    pub post: Uuid,
    pub parent: Option<Uuid>,
    pub comment: String,
    pub created_at: OffsetDateTime,
    pub comment_likes_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub me_liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<CommentView>>,
}

/// Everything needed to turn comments into nested views.
pub struct CommentProjector<'a> {
    pub tree: &'a CommentTree<'a>,
    pub stats: &'a HashMap<Uuid, CommentStats>,
    pub authors: &'a Authors,
    pub anonymous: bool,
}

impl CommentProjector<'_> {
    pub fn project(&self, comment: &Comment) -> CommentView {
        let mut seen = HashSet::new();
        self.project_inner(comment, &mut seen)
    }

    fn project_inner(&self, c: &Comment, seen: &mut HashSet<Uuid>) -> CommentView {
        seen.insert(c.id);
        let stats = self.stats.get(&c.id).copied().unwrap_or_default();
        let mut replies = Vec::new();
        for r in self.tree.replies(c.id) {
            if !seen.contains(&r.id) {
                replies.push(self.project_inner(r, seen));
            }
        }
        CommentView {
            id: c.id,
            author: author(self.authors, c.author_id),
            post: c.post_id,
            parent: c.parent_id,
            comment: c.comment.clone(),
            created_at: c.created_at,
            comment_likes_count: stats.likes,
            me_liked: (!self.anonymous).then_some(stats.me_liked),
            replies: (!replies.is_empty()).then_some(replies),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LikeView {
    pub id: Uuid,
    pub author: AuthorView,
    pub created_at: OffsetDateTime,
}

impl LikeView {
    pub fn new(like: Like, authors: &Authors) -> Self {
        Self {
            id: like.id,
            author: author(authors, like.author_id),
            created_at: like.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: Uuid, post: Uuid, author: Uuid, parent: Option<Uuid>) -> Comment {
        Comment {
            id,
            author_id: author,
            post_id: post,
            parent_id: parent,
            comment: format!("comment {id}"),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn nested_projection_with_stats() {
        let post = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        let arena = vec![
            comment(c1, post, alice, None),
            comment(c2, post, alice, Some(c1)),
        ];
        let tree = CommentTree::build(&arena);
        let mut stats = HashMap::new();
        stats.insert(
            c2,
            CommentStats {
                likes: 3,
                me_liked: true,
            },
        );
        let mut authors = Authors::new();
        authors.insert(
            alice,
            AuthorView {
                id: alice,
                username: "alice".into(),
                photo: None,
            },
        );

        let projector = CommentProjector {
            tree: &tree,
            stats: &stats,
            authors: &authors,
            anonymous: false,
        };
        let views: Vec<CommentView> = tree.roots().map(|c| projector.project(c)).collect();
        assert_eq!(views.len(), 1);
        let top = &views[0];
        assert_eq!(top.id, c1);
        assert_eq!(top.author.username, "alice");
        assert_eq!(top.me_liked, Some(false));
        let replies = top.replies.as_ref().expect("c2 nested under c1");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, c2);
        assert_eq!(replies[0].comment_likes_count, 3);
        assert!(replies[0].replies.is_none());

        let json = serde_json::to_value(&replies[0]).unwrap();
        assert!(json.get("replies").is_none());
        assert_eq!(json["me_liked"], true);
    }

    #[test]
    fn anonymous_views_omit_me_liked() {
        let post = Uuid::new_v4();
        let c1 = Uuid::new_v4();
        let arena = vec![comment(c1, post, Uuid::new_v4(), None)];
        let tree = CommentTree::build(&arena);
        let stats = HashMap::new();
        let authors = Authors::new();
        let projector = CommentProjector {
            tree: &tree,
            stats: &stats,
            authors: &authors,
            anonymous: true,
        };
        let view = projector.project(&arena[0]);
        assert_eq!(view.me_liked, None);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("me_liked").is_none());
        assert_eq!(json["comment_likes_count"], 0);
    }
}
