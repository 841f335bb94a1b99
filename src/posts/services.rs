use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::Actor;
use crate::error::{AppError, AppResult};
use crate::images::{self, Upload, POST_IMAGE_EXTENSIONS};
use crate::posts::dto::{Page, Pagination};
use crate::posts::model::{
    Comment, LikeOutcome, LikeTarget, NewComment, NewPost, Post, DESCRIPTION_MAX,
};
use crate::posts::tree::CommentTree;
use crate::posts::views::{AuthorView, Authors, CommentProjector, CommentView, LikeView, PostView};
use crate::state::AppState;

fn validate_description(description: &str) -> AppResult<()> {
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(AppError::BadRequest(format!(
            "Description must be at most {DESCRIPTION_MAX} characters long"
        )));
    }
    Ok(())
}

fn validate_comment(text: &str) -> AppResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    Ok(text)
}

async fn load_post(st: &AppState, id: Uuid) -> AppResult<Post> {
    st.content.get_post(id).await?.ok_or(AppError::NotFound("Post"))
}

async fn load_comment(st: &AppState, id: Uuid) -> AppResult<Comment> {
    st.content
        .get_comment(id)
        .await?
        .ok_or(AppError::NotFound("Comment"))
}

async fn load_authors(st: &AppState, ids: HashSet<Uuid>) -> AppResult<Authors> {
    let ids: Vec<Uuid> = ids.into_iter().collect();
    let users = st.users.find_many(&ids).await?;
    let mut authors = HashMap::with_capacity(users.len());
    for u in users {
        let photo = images::presign_opt(st.storage.as_ref(), u.photo.as_deref()).await?;
        authors.insert(
            u.id,
            AuthorView {
                id: u.id,
                username: u.username,
                photo,
            },
        );
    }
    Ok(authors)
}

async fn render_posts(
    st: &AppState,
    viewer: Option<&Actor>,
    posts: Vec<Post>,
) -> AppResult<Vec<PostView>> {
    let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
    let stats = st.content.post_stats(&ids, viewer.map(|a| a.id)).await?;
    let authors = load_authors(st, posts.iter().map(|p| p.author_id).collect()).await?;
    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        let url = images::presign(st.storage.as_ref(), &post.image).await?;
        let s = stats.get(&post.id).copied().unwrap_or_default();
        views.push(PostView::new(post, url, s, &authors));
    }
    Ok(views)
}

/// Project `roots` (each with its whole reply tree) out of `arena`, which
/// must hold every comment of the roots' posts.
async fn render_comments(
    st: &AppState,
    viewer: Option<&Actor>,
    arena: &[Comment],
    roots: &[Uuid],
) -> AppResult<Vec<CommentView>> {
    let tree = CommentTree::build(arena);
    let shown: Vec<&Comment> = roots.iter().flat_map(|&id| tree.subtree(id)).collect();
    let ids: Vec<Uuid> = shown.iter().map(|c| c.id).collect();
    let stats = st.content.comment_stats(&ids, viewer.map(|a| a.id)).await?;
    let authors = load_authors(st, shown.iter().map(|c| c.author_id).collect()).await?;
    let projector = CommentProjector {
        tree: &tree,
        stats: &stats,
        authors: &authors,
        anonymous: viewer.is_none(),
    };
    Ok(roots
        .iter()
        .filter_map(|&id| tree.get(id))
        .map(|c| projector.project(c))
        .collect())
}

pub async fn create_post(
    st: &AppState,
    actor: &Actor,
    description: &str,
    image: Upload,
    now: OffsetDateTime,
) -> AppResult<PostView> {
    actor.require_active()?;
    validate_description(description)?;
    let key = images::store_image(
        st.storage.as_ref(),
        "posts",
        actor.id,
        image,
        POST_IMAGE_EXTENSIONS,
    )
    .await?;
    let inserted = st
        .content
        .insert_post(NewPost {
            id: Uuid::new_v4(),
            author_id: actor.id,
            image: key.clone(),
            description: description.to_string(),
            created_at: now,
        })
        .await;
    let post = match inserted {
        Ok(post) => post,
        Err(e) => {
            images::discard_image(st.storage.as_ref(), &key).await;
            return Err(e.into());
        }
    };
    info!(post_id = %post.id, author_id = %actor.id, "post created");
    let mut views = render_posts(st, Some(actor), vec![post]).await?;
    views.pop().ok_or(AppError::NotFound("Post"))
}

pub async fn get_post(st: &AppState, viewer: Option<&Actor>, id: Uuid) -> AppResult<PostView> {
    let post = load_post(st, id).await?;
    let mut views = render_posts(st, viewer, vec![post]).await?;
    views.pop().ok_or(AppError::NotFound("Post"))
}

pub async fn list_posts(
    st: &AppState,
    viewer: Option<&Actor>,
    page: Pagination,
) -> AppResult<Page<PostView>> {
    let (limit, offset) = page.window();
    let (posts, total) = st.content.list_posts(limit, offset).await?;
    let results = render_posts(st, viewer, posts).await?;
    Ok(Page {
        total,
        limit,
        offset,
        results,
    })
}

/// Owner-only. `description: None` keeps the current text, `image: None` the current image.
pub async fn update_post(
    st: &AppState,
    actor: &Actor,
    id: Uuid,
    description: Option<&str>,
    image: Option<Upload>,
) -> AppResult<PostView> {
    actor.require_active()?;
    let post = load_post(st, id).await?;
    actor.require_owner(post.author_id)?;
    let description = description.unwrap_or(&post.description);
    validate_description(description)?;

    let new_key = match image {
        Some(upload) => Some(
            images::store_image(
                st.storage.as_ref(),
                "posts",
                actor.id,
                upload,
                POST_IMAGE_EXTENSIONS,
            )
            .await?,
        ),
        None => None,
    };
    let updated = match st
        .content
        .update_post(id, description, new_key.as_deref())
        .await
    {
        Ok(Some(updated)) => updated,
        failed => {
            if let Some(key) = new_key.as_deref() {
                images::discard_image(st.storage.as_ref(), key).await;
            }
            return Err(match failed {
                Err(e) => e.into(),
                _ => AppError::NotFound("Post"),
            });
        }
    };
    if new_key.is_some() {
        if let Err(e) = st.storage.delete_object(&post.image).await {
            warn!(error = %e, key = %post.image, "failed to delete replaced post image");
        }
    }
    let mut views = render_posts(st, Some(actor), vec![updated]).await?;
    views.pop().ok_or(AppError::NotFound("Post"))
}

/// Owner-only; comments and likes go with the post.
pub async fn delete_post(st: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    actor.require_active()?;
    let post = load_post(st, id).await?;
    actor.require_owner(post.author_id)?;
    if !st.content.delete_post(id).await? {
        return Err(AppError::NotFound("Post"));
    }
    if let Err(e) = st.storage.delete_object(&post.image).await {
        warn!(error = %e, key = %post.image, "failed to delete post image");
    }
    info!(post_id = %id, "post deleted");
    Ok(())
}

/// The post's comment forest: top-level comments with nested replies.
pub async fn post_comments(
    st: &AppState,
    viewer: Option<&Actor>,
    post_id: Uuid,
) -> AppResult<Vec<CommentView>> {
    load_post(st, post_id).await?;
    let arena = st.content.comments_for_posts(&[post_id]).await?;
    let roots: Vec<Uuid> = arena
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| c.id)
        .collect();
    render_comments(st, viewer, &arena, &roots).await
}

pub async fn create_comment(
    st: &AppState,
    actor: &Actor,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    text: &str,
    now: OffsetDateTime,
) -> AppResult<CommentView> {
    actor.require_active()?;
    let text = validate_comment(text)?;
    load_post(st, post_id).await?;
    if let Some(parent_id) = parent_id {
        let parent = load_comment(st, parent_id).await?;
        if parent.post_id != post_id {
            return Err(AppError::BadRequest(
                "The parent comment belongs to another post".into(),
            ));
        }
    }
    let comment = st
        .content
        .insert_comment(NewComment {
            id: Uuid::new_v4(),
            author_id: actor.id,
            post_id,
            parent_id,
            comment: text.to_string(),
            created_at: now,
        })
        .await?;
    info!(comment_id = %comment.id, post_id = %post_id, "comment created");
    let id = comment.id;
    let arena = vec![comment];
    let mut views = render_comments(st, Some(actor), &arena, &[id]).await?;
    views.pop().ok_or(AppError::NotFound("Comment"))
}

/// Top-level comments of every post, paginated, each with its reply tree.
pub async fn list_comments(
    st: &AppState,
    viewer: Option<&Actor>,
    page: Pagination,
) -> AppResult<Page<CommentView>> {
    let (limit, offset) = page.window();
    let (roots, total) = st.content.list_root_comments(limit, offset).await?;
    let mut post_ids: Vec<Uuid> = roots.iter().map(|c| c.post_id).collect();
    post_ids.sort_unstable();
    post_ids.dedup();
    let arena = st.content.comments_for_posts(&post_ids).await?;
    let root_ids: Vec<Uuid> = roots.iter().map(|c| c.id).collect();
    let results = render_comments(st, viewer, &arena, &root_ids).await?;
    Ok(Page {
        total,
        limit,
        offset,
        results,
    })
}

/// One comment with its replies.
pub async fn get_comment(st: &AppState, viewer: Option<&Actor>, id: Uuid) -> AppResult<CommentView> {
    let comment = load_comment(st, id).await?;
    let arena = st.content.comments_for_posts(&[comment.post_id]).await?;
    let mut views = render_comments(st, viewer, &arena, &[id]).await?;
    views.pop().ok_or(AppError::NotFound("Comment"))
}

/// Owner-only; replies and likes go with the comment.
pub async fn delete_comment(st: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    actor.require_active()?;
    let comment = load_comment(st, id).await?;
    actor.require_owner(comment.author_id)?;
    if !st.content.delete_comment(id).await? {
        return Err(AppError::NotFound("Comment"));
    }
    info!(comment_id = %id, "comment deleted");
    Ok(())
}

/// Like the target, or take the like back. Returns whether the target is now liked.
pub async fn toggle_like(
    st: &AppState,
    actor: &Actor,
    target: LikeTarget,
    now: OffsetDateTime,
) -> AppResult<bool> {
    actor.require_active()?;
    match target {
        LikeTarget::Post(id) => {
            load_post(st, id).await?;
        }
        LikeTarget::Comment(id) => {
            load_comment(st, id).await?;
        }
    }
    match st.content.toggle_like(actor.id, target, now).await? {
        LikeOutcome::Created(like) => {
            info!(like_id = %like.id, target = target.label(), target_id = %target.id(), "liked");
            Ok(true)
        }
        LikeOutcome::Removed => {
            info!(target = target.label(), target_id = %target.id(), "like removed");
            Ok(false)
        }
        LikeOutcome::AlreadyLiked => {
            warn!(target = target.label(), target_id = %target.id(), "concurrent like lost the race");
            Err(AppError::AlreadyLiked(target.label()))
        }
    }
}

pub async fn list_likes(
    st: &AppState,
    target: LikeTarget,
    page: Pagination,
) -> AppResult<Page<LikeView>> {
    match target {
        LikeTarget::Post(id) => {
            load_post(st, id).await?;
        }
        LikeTarget::Comment(id) => {
            load_comment(st, id).await?;
        }
    }
    let (limit, offset) = page.window();
    let (likes, total) = st.content.list_likes(target, limit, offset).await?;
    let authors = load_authors(st, likes.iter().map(|l| l.author_id).collect()).await?;
    let results = likes
        .into_iter()
        .map(|l| LikeView::new(l, &authors))
        .collect();
    Ok(Page {
        total,
        limit,
        offset,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::users::AuthStatus;
    use bytes::Bytes;

    fn png() -> Upload {
        Upload {
            file_name: Some("pic.png".into()),
            content_type: Some("image/png".into()),
            body: Bytes::from_static(b"\x89PNG"),
        }
    }

    fn actor_for(mem: &MemoryStore, username: &str) -> Actor {
        let user = mem.seed_user(username, AuthStatus::Done);
        Actor {
            id: user.id,
            status: user.auth_status,
        }
    }

    async fn a_post(st: &AppState, author: &Actor) -> PostView {
        create_post(st, author, "sunset", png(), OffsetDateTime::now_utc())
            .await
            .expect("create post")
    }

    #[tokio::test]
    async fn create_and_read_post() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let post = a_post(&st, &alice).await;
        assert_eq!(post.author.username, "alice_1");
        assert!(post.image.starts_with("memory://posts/"));
        assert_eq!(post.post_likes_count, 0);

        let anon = get_post(&st, None, post.id).await.expect("get");
        assert_eq!(anon.description, "sunset");
        assert!(!anon.me_liked);

        let page = list_posts(&st, None, Pagination::default()).await.expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.results.len(), 1);
    }

    #[tokio::test]
    async fn unfinished_registration_cannot_post() {
        let (st, mem) = AppState::fake();
        let user = mem.seed_user("newbie_1", AuthStatus::CodeVerified);
        let actor = Actor {
            id: user.id,
            status: user.auth_status,
        };
        let err = create_post(&st, &actor, "x", png(), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn only_the_owner_updates_or_deletes() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let bob = actor_for(&mem, "bob_12");
        let post = a_post(&st, &alice).await;

        let err = update_post(&st, &bob, post.id, Some("mine now"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
        let err = delete_post(&st, &bob, post.id).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        let updated = update_post(&st, &alice, post.id, Some("dawn"), None)
            .await
            .expect("update");
        assert_eq!(updated.description, "dawn");
        let too_long = "x".repeat(DESCRIPTION_MAX + 1);
        assert!(update_post(&st, &alice, post.id, Some(&too_long), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn replacing_the_image_drops_the_old_object() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let post = a_post(&st, &alice).await;
        let old_key = mem.post(post.id).expect("post").image;

        update_post(&st, &alice, post.id, None, Some(png()))
            .await
            .expect("update");
        let stored = mem.post(post.id).expect("post");
        assert_ne!(stored.image, old_key);
        assert_eq!(stored.description, "sunset");
    }

    #[tokio::test]
    async fn toggle_like_creates_then_removes() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let bob = actor_for(&mem, "bob_12");
        let post = a_post(&st, &alice).await;
        let now = OffsetDateTime::now_utc();
        let target = LikeTarget::Post(post.id);

        assert!(toggle_like(&st, &bob, target, now).await.expect("like"));
        let seen = get_post(&st, Some(&bob), post.id).await.expect("get");
        assert_eq!(seen.post_likes_count, 1);
        assert!(seen.me_liked);
        let by_alice = get_post(&st, Some(&alice), post.id).await.expect("get");
        assert!(!by_alice.me_liked);

        let likes = list_likes(&st, target, Pagination::default())
            .await
            .expect("likes");
        assert_eq!(likes.total, 1);
        assert_eq!(likes.results[0].author.username, "bob_12");

        assert!(!toggle_like(&st, &bob, target, now).await.expect("unlike"));
        assert_eq!(mem.like_count(target), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_never_store_two_likes() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let bob = actor_for(&mem, "bob_12");
        let post = a_post(&st, &alice).await;
        let target = LikeTarget::Post(post.id);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let st = st.clone();
            handles.push(tokio::spawn(async move {
                toggle_like(&st, &bob, target, OffsetDateTime::now_utc()).await
            }));
        }
        for h in handles {
            match h.await.expect("join") {
                Ok(_) | Err(AppError::AlreadyLiked(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(mem.like_count(target) <= 1);
    }

    #[tokio::test]
    async fn like_on_missing_target_is_not_found() {
        let (st, mem) = AppState::fake();
        let bob = actor_for(&mem, "bob_12");
        let err = toggle_like(
            &st,
            &bob,
            LikeTarget::Comment(Uuid::new_v4()),
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound("Comment")));
    }

    #[tokio::test]
    async fn replies_nest_under_their_parent() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let bob = actor_for(&mem, "bob_12");
        let post = a_post(&st, &alice).await;
        let now = OffsetDateTime::now_utc();

        let c1 = create_comment(&st, &bob, post.id, None, "first", now)
            .await
            .expect("c1");
        let c2 = create_comment(&st, &alice, post.id, Some(c1.id), "reply", now)
            .await
            .expect("c2");
        assert_eq!(c2.parent, Some(c1.id));

        let forest = post_comments(&st, None, post.id).await.expect("comments");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, c1.id);
        let replies = forest[0].replies.as_ref().expect("replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, c2.id);
        assert_eq!(forest[0].me_liked, None);

        let page = list_comments(&st, Some(&bob), Pagination::default())
            .await
            .expect("all comments");
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0].id, c1.id);
        assert_eq!(page.results[0].me_liked, Some(false));

        let single = get_comment(&st, None, c1.id).await.expect("get comment");
        assert_eq!(single.replies.as_ref().map(Vec::len), Some(1));

        let counted = get_post(&st, None, post.id).await.expect("post");
        assert_eq!(counted.post_comments_count, 2);
    }

    #[tokio::test]
    async fn parent_must_belong_to_the_same_post() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let p1 = a_post(&st, &alice).await;
        let p2 = a_post(&st, &alice).await;
        let now = OffsetDateTime::now_utc();
        let c1 = create_comment(&st, &alice, p1.id, None, "on p1", now)
            .await
            .expect("c1");

        let err = create_comment(&st, &alice, p2.id, Some(c1.id), "cross", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = create_comment(&st, &alice, p1.id, None, "   ", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn deleting_a_post_leaves_no_orphans() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let bob = actor_for(&mem, "bob_12");
        let post = a_post(&st, &alice).await;
        let now = OffsetDateTime::now_utc();
        let c1 = create_comment(&st, &bob, post.id, None, "nice", now)
            .await
            .expect("c1");
        let c2 = create_comment(&st, &alice, post.id, Some(c1.id), "thanks", now)
            .await
            .expect("c2");
        toggle_like(&st, &bob, LikeTarget::Post(post.id), now)
            .await
            .expect("like post");
        toggle_like(&st, &alice, LikeTarget::Comment(c2.id), now)
            .await
            .expect("like comment");

        delete_post(&st, &alice, post.id).await.expect("delete");
        assert!(mem.post(post.id).is_none());
        assert_eq!(mem.comments_of_post(post.id), 0);
        assert_eq!(mem.like_count(LikeTarget::Post(post.id)), 0);
        assert_eq!(mem.like_count(LikeTarget::Comment(c2.id)), 0);
        assert!(matches!(
            get_post(&st, None, post.id).await,
            Err(AppError::NotFound("Post"))
        ));
    }

    #[tokio::test]
    async fn deleting_a_comment_takes_its_replies() {
        let (st, mem) = AppState::fake();
        let alice = actor_for(&mem, "alice_1");
        let bob = actor_for(&mem, "bob_12");
        let post = a_post(&st, &alice).await;
        let now = OffsetDateTime::now_utc();
        let c1 = create_comment(&st, &bob, post.id, None, "nice", now)
            .await
            .expect("c1");
        let c2 = create_comment(&st, &alice, post.id, Some(c1.id), "thanks", now)
            .await
            .expect("c2");
        toggle_like(&st, &bob, LikeTarget::Comment(c2.id), now)
            .await
            .expect("like");

        let err = delete_comment(&st, &alice, c1.id).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
        delete_comment(&st, &bob, c1.id).await.expect("delete");
        assert_eq!(mem.comments_of_post(post.id), 0);
        assert_eq!(mem.like_count(LikeTarget::Comment(c2.id)), 0);
    }

    #[tokio::test]
    async fn failed_post_insert_discards_the_image() {
        let (mut st, _mem) = AppState::fake();
        let storage = std::sync::Arc::new(crate::storage::MemoryStorage::default());
        st.storage = storage.clone();
        let ghost = Actor {
            id: Uuid::new_v4(),
            status: AuthStatus::Done,
        };

        let err = create_post(&st, &ghost, "orphan", png(), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(storage.is_empty());
    }
}
