use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::posts::{
    Comment, CommentStats, ContentRepo, Like, LikeOutcome, LikeTarget, NewComment, NewPost, Post,
    PostStats,
};
use crate::tokens::TokenBlacklist;
use crate::users::{AuthStatus, Identifier, NewUser, ProfileUpdate, StatusAdvance, User, UserRepo};
use crate::verification::{CodeRepo, NewCode, VerificationCode};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    codes: Vec<VerificationCode>,
    blacklist: HashMap<Uuid, (Uuid, OffsetDateTime)>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    post_likes: Vec<Like>,
    comment_likes: Vec<Like>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| {
            u.email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email))
        })
    }

    fn phone_taken(&self, phone: &str) -> bool {
        self.users
            .values()
            .any(|u| u.phone_number.as_deref() == Some(phone))
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn likes(&self, target: LikeTarget) -> &Vec<Like> {
        match target {
            LikeTarget::Post(_) => &self.post_likes,
            LikeTarget::Comment(_) => &self.comment_likes,
        }
    }

    fn likes_mut(&mut self, target: LikeTarget) -> &mut Vec<Like> {
        match target {
            LikeTarget::Post(_) => &mut self.post_likes,
            LikeTarget::Comment(_) => &mut self.comment_likes,
        }
    }

    /// Drop the given comments and every reply below them, with their likes.
    fn remove_comment_trees(&mut self, roots: &[Uuid]) {
        let mut doomed: HashSet<Uuid> = roots.iter().copied().collect();
        loop {
            let before = doomed.len();
            for c in &self.comments {
                if c.parent_id.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(c.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        self.comments.retain(|c| !doomed.contains(&c.id));
        self.comment_likes.retain(|l| !doomed.contains(&l.target_id));
    }
}

fn apply(advance: Option<StatusAdvance>, user: &mut User) {
    if let Some(a) = advance {
        if user.auth_status == a.from {
            user.auth_status = a.to;
        }
    }
}

fn page<T: Clone>(rows: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    let skip = usize::try_from(offset).unwrap_or(0);
    let take = usize::try_from(limit).unwrap_or(0);
    rows.skip(skip).take(take).collect()
}

/// In-process store with the same uniqueness and cascade rules as the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let t = self.lock()?;
        Ok(ids.iter().filter_map(|id| t.users.get(id).cloned()).collect())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let t = self.lock()?;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_identifier(&self, identifier: &Identifier) -> anyhow::Result<Option<User>> {
        let t = self.lock()?;
        let found = t.users.values().find(|u| match identifier {
            Identifier::Email(e) => u
                .email
                .as_deref()
                .is_some_and(|x| x.eq_ignore_ascii_case(e)),
            Identifier::Phone(p) => u.phone_number.as_deref() == Some(p.as_str()),
        });
        Ok(found.cloned())
    }

    async fn register(&self, user: NewUser, code: &NewCode) -> anyhow::Result<Option<User>> {
        let mut t = self.lock()?;
        let (email, phone) = match &user.identifier {
            Identifier::Email(e) => (Some(e.clone()), None),
            Identifier::Phone(p) => (None, Some(p.clone())),
        };
        let clash = email.as_deref().is_some_and(|e| t.email_taken(e))
            || phone.as_deref().is_some_and(|p| t.phone_taken(p))
            || t.username_taken(&user.username, None);
        if clash {
            return Ok(None);
        }
        let created = User {
            id: user.id,
            username: user.username,
            first_name: None,
            last_name: None,
            email,
            phone_number: phone,
            password_hash: None,
            auth_type: user.identifier.channel(),
            auth_status: AuthStatus::New,
            photo: None,
            last_login: None,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        t.users.insert(created.id, created.clone());
        t.codes.push(VerificationCode {
            id: code.id,
            user_id: created.id,
            code: code.code.clone(),
            channel: code.channel,
            expires_at: code.expires_at,
            is_confirmed: false,
            confirmed_at: None,
            created_at: code.created_at,
        });
        Ok(Some(created))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<Option<User>> {
        let mut t = self.lock()?;
        if t.username_taken(&update.username, Some(id)) {
            return Ok(None);
        }
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        user.first_name = Some(update.first_name);
        user.last_name = Some(update.last_name);
        user.username = update.username;
        user.password_hash = Some(update.password_hash);
        apply(advance, user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_photo(
        &self,
        id: Uuid,
        photo_key: &str,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<User> {
        let mut t = self.lock()?;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        user.photo = Some(photo_key.to_string());
        apply(advance, user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        let mut t = self.lock()?;
        if let Some(user) = t.users.get_mut(&id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> anyhow::Result<()> {
        let mut t = self.lock()?;
        if let Some(user) = t.users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CodeRepo for MemoryStore {
    async fn issue(
        &self,
        user_id: Uuid,
        code: &NewCode,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut t = self.lock()?;
        if t.codes
            .iter()
            .any(|c| c.user_id == user_id && c.is_pending(now))
        {
            return Ok(false);
        }
        t.codes.push(VerificationCode {
            id: code.id,
            user_id,
            code: code.code.clone(),
            channel: code.channel,
            expires_at: code.expires_at,
            is_confirmed: false,
            confirmed_at: None,
            created_at: code.created_at,
        });
        Ok(true)
    }

    async fn confirm(
        &self,
        user_id: Uuid,
        code: &str,
        now: OffsetDateTime,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<u64> {
        let mut t = self.lock()?;
        let mut confirmed = 0;
        for c in t
            .codes
            .iter_mut()
            .filter(|c| c.user_id == user_id && c.code == code && c.is_pending(now))
        {
            c.is_confirmed = true;
            c.confirmed_at = Some(now);
            confirmed += 1;
        }
        if confirmed > 0 {
            if let Some(user) = t.users.get_mut(&user_id) {
                apply(advance, user);
            }
        }
        Ok(confirmed)
    }

    async fn confirmed_since(&self, user_id: Uuid, since: OffsetDateTime) -> anyhow::Result<bool> {
        let t = self.lock()?;
        Ok(t.codes.iter().any(|c| {
            c.user_id == user_id && c.is_confirmed && c.confirmed_at.is_some_and(|at| at >= since)
        }))
    }
}

#[async_trait]
impl TokenBlacklist for MemoryStore {
    async fn revoke(
        &self,
        jti: Uuid,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut t = self.lock()?;
        if t.blacklist.contains_key(&jti) {
            return Ok(false);
        }
        t.blacklist.insert(jti, (user_id, expires_at));
        Ok(true)
    }

    async fn is_revoked(&self, jti: Uuid) -> anyhow::Result<bool> {
        Ok(self.lock()?.blacklist.contains_key(&jti))
    }
}

#[async_trait]
impl ContentRepo for MemoryStore {
    async fn insert_post(&self, post: NewPost) -> anyhow::Result<Post> {
        let mut t = self.lock()?;
        if !t.users.contains_key(&post.author_id) {
            anyhow::bail!("author {} does not exist", post.author_id);
        }
        let row = Post {
            id: post.id,
            author_id: post.author_id,
            image: post.image,
            description: post.description,
            created_at: post.created_at,
            updated_at: post.created_at,
        };
        t.posts.push(row.clone());
        Ok(row)
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        Ok(self.lock()?.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> anyhow::Result<(Vec<Post>, i64)> {
        let t = self.lock()?;
        let total = t.posts.len() as i64;
        Ok((page(t.posts.iter().rev().cloned(), limit, offset), total))
    }

    async fn update_post(
        &self,
        id: Uuid,
        description: &str,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Post>> {
        let mut t = self.lock()?;
        let Some(post) = t.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        post.description = description.to_string();
        if let Some(image) = image {
            post.image = image.to_string();
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.lock()?;
        let before = t.posts.len();
        t.posts.retain(|p| p.id != id);
        if t.posts.len() == before {
            return Ok(false);
        }
        let roots: Vec<Uuid> = t
            .comments
            .iter()
            .filter(|c| c.post_id == id)
            .map(|c| c.id)
            .collect();
        t.remove_comment_trees(&roots);
        t.post_likes.retain(|l| l.target_id != id);
        Ok(true)
    }

    async fn post_stats(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> anyhow::Result<HashMap<Uuid, PostStats>> {
        let t = self.lock()?;
        let mut out = HashMap::new();
        for &id in ids {
            if !t.posts.iter().any(|p| p.id == id) {
                continue;
            }
            let likes = t.post_likes.iter().filter(|l| l.target_id == id);
            let stats = PostStats {
                likes: likes.clone().count() as i64,
                comments: t.comments.iter().filter(|c| c.post_id == id).count() as i64,
                me_liked: likes.clone().any(|l| Some(l.author_id) == viewer),
            };
            out.insert(id, stats);
        }
        Ok(out)
    }

    async fn insert_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let mut t = self.lock()?;
        if !t.posts.iter().any(|p| p.id == comment.post_id) {
            anyhow::bail!("post {} does not exist", comment.post_id);
        }
        if let Some(parent) = comment.parent_id {
            if !t
                .comments
                .iter()
                .any(|c| c.id == parent && c.post_id == comment.post_id)
            {
                anyhow::bail!("parent comment {parent} does not exist on this post");
            }
        }
        let row = Comment {
            id: comment.id,
            author_id: comment.author_id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            comment: comment.comment,
            created_at: comment.created_at,
        };
        t.comments.push(row.clone());
        Ok(row)
    }

    async fn get_comment(&self, id: Uuid) -> anyhow::Result<Option<Comment>> {
        Ok(self.lock()?.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<Comment>> {
        let t = self.lock()?;
        Ok(t.comments
            .iter()
            .filter(|c| post_ids.contains(&c.post_id))
            .cloned()
            .collect())
    }

    async fn list_root_comments(
        &self,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Comment>, i64)> {
        let t = self.lock()?;
        let roots = t.comments.iter().filter(|c| c.parent_id.is_none());
        let total = roots.clone().count() as i64;
        Ok((page(roots.cloned(), limit, offset), total))
    }

    async fn delete_comment(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.lock()?;
        if !t.comments.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        t.remove_comment_trees(&[id]);
        Ok(true)
    }

    async fn comment_stats(
        &self,
        ids: &[Uuid],
        viewer: Option<Uuid>,
    ) -> anyhow::Result<HashMap<Uuid, CommentStats>> {
        let t = self.lock()?;
        let mut out = HashMap::new();
        for &id in ids {
            let likes = t.comment_likes.iter().filter(|l| l.target_id == id);
            let stats = CommentStats {
                likes: likes.clone().count() as i64,
                me_liked: likes.clone().any(|l| Some(l.author_id) == viewer),
            };
            out.insert(id, stats);
        }
        Ok(out)
    }

    async fn toggle_like(
        &self,
        author_id: Uuid,
        target: LikeTarget,
        now: OffsetDateTime,
    ) -> anyhow::Result<LikeOutcome> {
        let same = |l: &Like| l.author_id == author_id && l.target_id == target.id();

        // Check and write take the lock separately, like the SELECT and the
        // INSERT of the Postgres path; the insert re-checks as the constraint does.
        let existing = self.lock()?.likes(target).iter().find(|&l| same(l)).map(|l| l.id);
        if let Some(like_id) = existing {
            self.lock()?.likes_mut(target).retain(|l| l.id != like_id);
            return Ok(LikeOutcome::Removed);
        }

        let mut t = self.lock()?;
        if t.likes(target).iter().any(same) {
            return Ok(LikeOutcome::AlreadyLiked);
        }
        let like = Like {
            id: Uuid::new_v4(),
            author_id,
            target_id: target.id(),
            created_at: now,
        };
        t.likes_mut(target).push(like.clone());
        Ok(LikeOutcome::Created(like))
    }

    async fn list_likes(
        &self,
        target: LikeTarget,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Like>, i64)> {
        let t = self.lock()?;
        let rows = t
            .likes(target)
            .iter()
            .rev()
            .filter(|l| l.target_id == target.id());
        let total = rows.clone().count() as i64;
        Ok((page(rows.cloned(), limit, offset), total))
    }
}

/// Inspection and seeding for tests.
#[cfg(test)]
impl MemoryStore {
    pub fn user(&self, id: Uuid) -> Option<User> {
        self.tables.lock().expect("lock").users.get(&id).cloned()
    }

    pub fn codes_of(&self, user_id: Uuid) -> Vec<VerificationCode> {
        self.tables
            .lock()
            .expect("lock")
            .codes
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn latest_code(&self, user_id: Uuid) -> Option<VerificationCode> {
        self.codes_of(user_id).pop()
    }

    /// Insert an email account named `username` directly at `status`.
    pub fn seed_user(&self, username: &str, status: AuthStatus) -> User {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            first_name: None,
            last_name: None,
            email: Some(format!("{username}@example.com")),
            phone_number: None,
            password_hash: None,
            auth_type: crate::users::AuthType::Email,
            auth_status: status,
            photo: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .expect("lock")
            .users
            .insert(user.id, user.clone());
        user
    }

    pub fn post(&self, id: Uuid) -> Option<Post> {
        let t = self.tables.lock().expect("lock");
        t.posts.iter().find(|p| p.id == id).cloned()
    }

    pub fn comments_of_post(&self, post_id: Uuid) -> usize {
        let t = self.tables.lock().expect("lock");
        t.comments.iter().filter(|c| c.post_id == post_id).count()
    }

    pub fn like_count(&self, target: LikeTarget) -> usize {
        let t = self.tables.lock().expect("lock");
        t.likes(target)
            .iter()
            .filter(|l| l.target_id == target.id())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodeConfig;
    use crate::users::AuthType;

    fn new_user(identifier: Identifier, username: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username: username.into(),
            identifier,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn code() -> NewCode {
        NewCode::fresh(AuthType::Email, &CodeConfig::default(), OffsetDateTime::now_utc())
    }

    #[tokio::test]
    async fn identifiers_and_usernames_are_unique() {
        let store = MemoryStore::new();
        let first = store
            .register(new_user(Identifier::Email("a@example.com".into()), "user_aaaa"), &code())
            .await
            .unwrap();
        assert!(first.is_some());

        let same_email = store
            .register(new_user(Identifier::Email("A@Example.com".into()), "user_bbbb"), &code())
            .await
            .unwrap();
        assert!(same_email.is_none());

        let same_name = store
            .register(new_user(Identifier::Phone("+15555550100".into()), "user_aaaa"), &code())
            .await
            .unwrap();
        assert!(same_name.is_none());
    }

    #[tokio::test]
    async fn revoke_is_idempotent_but_reports_repeats() {
        let store = MemoryStore::new();
        let jti = Uuid::new_v4();
        let exp = OffsetDateTime::now_utc();
        assert!(store.revoke(jti, Uuid::new_v4(), exp).await.unwrap());
        assert!(!store.revoke(jti, Uuid::new_v4(), exp).await.unwrap());
        assert!(store.is_revoked(jti).await.unwrap());
    }

    #[tokio::test]
    async fn replies_must_stay_on_the_parent_post() {
        let store = MemoryStore::new();
        let author = store.seed_user("alice_1", AuthStatus::Done);
        let now = OffsetDateTime::now_utc();
        let mut posts = Vec::new();
        for _ in 0..2 {
            let post = store
                .insert_post(NewPost {
                    id: Uuid::new_v4(),
                    author_id: author.id,
                    image: "posts/x.png".into(),
                    description: String::new(),
                    created_at: now,
                })
                .await
                .unwrap();
            posts.push(post.id);
        }
        let root = store
            .insert_comment(NewComment {
                id: Uuid::new_v4(),
                author_id: author.id,
                post_id: posts[0],
                parent_id: None,
                comment: "root".into(),
                created_at: now,
            })
            .await
            .unwrap();

        let cross = store
            .insert_comment(NewComment {
                id: Uuid::new_v4(),
                author_id: author.id,
                post_id: posts[1],
                parent_id: Some(root.id),
                comment: "elsewhere".into(),
                created_at: now,
            })
            .await;
        assert!(cross.is_err());
        assert_eq!(store.comments_of_post(posts[1]), 0);
    }

    #[tokio::test]
    async fn comment_delete_cascades_down_the_thread() {
        let store = MemoryStore::new();
        let author = store.seed_user("alice_1", AuthStatus::Done);
        let now = OffsetDateTime::now_utc();
        let post = store
            .insert_post(NewPost {
                id: Uuid::new_v4(),
                author_id: author.id,
                image: "posts/x.png".into(),
                description: String::new(),
                created_at: now,
            })
            .await
            .unwrap();
        let mut parent = None;
        let mut ids = Vec::new();
        for _ in 0..3 {
            let c = store
                .insert_comment(NewComment {
                    id: Uuid::new_v4(),
                    author_id: author.id,
                    post_id: post.id,
                    parent_id: parent,
                    comment: "deeper".into(),
                    created_at: now,
                })
                .await
                .unwrap();
            parent = Some(c.id);
            ids.push(c.id);
        }
        store
            .toggle_like(author.id, LikeTarget::Comment(ids[2]), now)
            .await
            .unwrap();

        assert!(store.delete_comment(ids[0]).await.unwrap());
        assert_eq!(store.comments_of_post(post.id), 0);
        assert_eq!(store.like_count(LikeTarget::Comment(ids[2])), 0);
        assert!(!store.delete_comment(ids[0]).await.unwrap());
    }

    #[tokio::test]
    async fn insert_comment_requires_existing_rows() {
        let store = MemoryStore::new();
        let err = store
            .insert_comment(NewComment {
                id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                post_id: Uuid::new_v4(),
                parent_id: None,
                comment: "orphan".into(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await;
        assert!(err.is_err());
    }
}
