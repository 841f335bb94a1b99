use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DESCRIPTION_MAX: usize = 2000;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub image: String, // object storage key
    pub description: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub image: String,
    pub description: String,
    pub created_at: OffsetDateTime,
}

/// A comment stores its parent's id, never a reference to it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub comment: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub comment: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikeTarget {
    Post(Uuid),
    Comment(Uuid),
}

impl LikeTarget {
    pub fn id(self) -> Uuid {
        match self {
            LikeTarget::Post(id) | LikeTarget::Comment(id) => id,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LikeTarget::Post(_) => "post",
            LikeTarget::Comment(_) => "comment",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Like {
    pub id: Uuid,
    pub author_id: Uuid,
    pub target_id: Uuid,
    pub created_at: OffsetDateTime,
}

/// What a like toggle did.
#[derive(Debug, Clone)]
pub enum LikeOutcome {
    Created(Like),
    Removed,
    /// A concurrent toggle inserted the row first; the unique constraint won.
    AlreadyLiked,
}

/// Aggregates shown next to a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostStats {
    pub likes: i64,
    pub comments: i64,
    pub me_liked: bool,
}

/// Aggregates shown next to a comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommentStats {
    pub likes: i64,
    pub me_liked: bool,
}
