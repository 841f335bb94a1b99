use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::posts::model::{
    Comment, CommentStats, Like, LikeOutcome, LikeTarget, NewComment, NewPost, Post, PostStats,
};
use crate::store::PgStore;

/// Posts, comments and likes. Deletes cascade to everything hanging off the row.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn insert_post(&self, post: NewPost) -> anyhow::Result<Post>;

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;

    /// Newest first, with the total row count.
    async fn list_posts(&self, limit: i64, offset: i64) -> anyhow::Result<(Vec<Post>, i64)>;

    /// `image: None` keeps the stored key.
    async fn update_post(
        &self,
        id: Uuid,
        description: &str,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Post>>;

    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn post_stats(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> anyhow::Result<HashMap<Uuid, PostStats>>;

    async fn insert_comment(&self, comment: NewComment) -> anyhow::Result<Comment>;

    async fn get_comment(&self, id: Uuid) -> anyhow::Result<Option<Comment>>;

    /// Every comment of the given posts, oldest first.
    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<Comment>>;

    /// Top-level comments across all posts, oldest first, with the total.
    async fn list_root_comments(
        &self,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Comment>, i64)>;

    async fn delete_comment(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn comment_stats(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> anyhow::Result<HashMap<Uuid, CommentStats>>;

    /// Remove the caller's like on `target` if present, otherwise create it.
    async fn toggle_like(
        &self,
        author_id: Uuid,
        target: LikeTarget,
        now: OffsetDateTime,
    ) -> anyhow::Result<LikeOutcome>;

    async fn list_likes(
        &self,
        target: LikeTarget,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Like>, i64)>;
}

const POST_COLUMNS: &str = "id, author_id, image, description, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, author_id, post_id, parent_id, comment, created_at";

/// Table and target column of a like kind.
fn like_table(target: LikeTarget) -> (&'static str, &'static str) {
    match target {
        LikeTarget::Post(_) => ("post_likes", "post_id"),
        LikeTarget::Comment(_) => ("comment_likes", "comment_id"),
    }
}

#[derive(FromRow)]
struct PostStatsRow {
    id: Uuid,
    likes: i64,
    comments: i64,
    me_liked: bool,
}

#[derive(FromRow)]
struct CommentStatsRow {
    id: Uuid,
    likes: i64,
    me_liked: bool,
}

#[async_trait]
impl ContentRepo for PgStore {
    async fn insert_post(&self, post: NewPost) -> anyhow::Result<Post> {
        let sql = format!(
            r#"
            INSERT INTO posts (id, author_id, image, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {POST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Post>(&sql)
            .bind(post.id)
            .bind(post.author_id)
            .bind(&post.image)
            .bind(&post.description)
            .bind(post.created_at)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> anyhow::Result<(Vec<Post>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT count(*) FROM posts")
            .fetch_one(&self.db)
            .await?;
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            ORDER BY created_at DESC, id
            LIMIT $1 OFFSET $2
            "#
        );
        let rows = sqlx::query_as::<_, Post>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok((rows, total))
    }

    async fn update_post(
        &self,
        id: Uuid,
        description: &str,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Post>> {
        let sql = format!(
            r#"
            UPDATE posts
            SET description = $2, image = COALESCE($3, image), updated_at = now()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(description)
            .bind(image)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn post_stats(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> anyhow::Result<HashMap<Uuid, PostStats>> {
        let rows = sqlx::query_as::<_, PostStatsRow>(
            r#"
            SELECT p.id,
                   (SELECT count(*) FROM post_likes l WHERE l.post_id = p.id) AS likes,
                   (SELECT count(*) FROM post_comments c WHERE c.post_id = p.id) AS comments,
                   EXISTS (
                       SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.author_id = $2
                   ) AS me_liked
            FROM posts p
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(viewer)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let stats = PostStats {
                    likes: r.likes,
                    comments: r.comments,
                    me_liked: r.me_liked,
                };
                (r.id, stats)
            })
            .collect())
    }

    async fn insert_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let sql = format!(
            r#"
            INSERT INTO post_comments (id, author_id, post_id, parent_id, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment.id)
            .bind(comment.author_id)
            .bind(comment.post_id)
            .bind(comment.parent_id)
            .bind(&comment.comment)
            .bind(comment.created_at)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    async fn get_comment(&self, id: Uuid) -> anyhow::Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM post_comments WHERE id = $1");
        let row = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM post_comments WHERE post_id = ANY($1) ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, Comment>(&sql)
            .bind(post_ids)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn list_root_comments(
        &self,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Comment>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT count(*) FROM post_comments WHERE parent_id IS NULL")
                .fetch_one(&self.db)
                .await?;
        let sql = format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM post_comments
            WHERE parent_id IS NULL
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
            "#
        );
        let rows = sqlx::query_as::<_, Comment>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok((rows, total))
    }

    async fn delete_comment(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM post_comments WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn comment_stats(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> anyhow::Result<HashMap<Uuid, CommentStats>> {
        let rows = sqlx::query_as::<_, CommentStatsRow>(
            r#"
            SELECT c.id,
                   (SELECT count(*) FROM comment_likes l WHERE l.comment_id = c.id) AS likes,
                   EXISTS (
                       SELECT 1 FROM comment_likes l WHERE l.comment_id = c.id AND l.author_id = $2
                   ) AS me_liked
            FROM post_comments c
            WHERE c.id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(viewer)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let stats = CommentStats {
                    likes: r.likes,
                    me_liked: r.me_liked,
                };
                (r.id, stats)
            })
            .collect())
    }

    async fn toggle_like(
        &self,
        author_id: Uuid,
        target: LikeTarget,
        now: OffsetDateTime,
    ) -> anyhow::Result<LikeOutcome> {
        let (table, column) = like_table(target);

        let existing: Option<Uuid> = sqlx::query_scalar(&format!(
            "SELECT id FROM {table} WHERE author_id = $1 AND {column} = $2"
        ))
        .bind(author_id)
        .bind(target.id())
        .fetch_optional(&self.db)
        .await?;
        if let Some(like_id) = existing {
            sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                .bind(like_id)
                .execute(&self.db)
                .await?;
            return Ok(LikeOutcome::Removed);
        }

        let inserted = sqlx::query_as::<_, Like>(&format!(
            r#"
            INSERT INTO {table} (id, author_id, {column}, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, author_id, {column} AS target_id, created_at
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(target.id())
        .bind(now)
        .fetch_one(&self.db)
        .await;
        match inserted {
            Ok(like) => Ok(LikeOutcome::Created(like)),
            Err(e) if is_unique_violation(&e) => Ok(LikeOutcome::AlreadyLiked),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_likes(
        &self,
        target: LikeTarget,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Like>, i64)> {
        let (table, column) = like_table(target);
        let total: i64 =
            sqlx::query_scalar(&format!("SELECT count(*) FROM {table} WHERE {column} = $1"))
                .bind(target.id())
                .fetch_one(&self.db)
                .await?;
        let rows = sqlx::query_as::<_, Like>(&format!(
            r#"
            SELECT id, author_id, {column} AS target_id, created_at
            FROM {table}
            WHERE {column} = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(target.id())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok((rows, total))
    }
}
