//! Content graph: posts, threaded comments and likes.

mod dto;
pub mod handlers;
mod model;
mod repo;
pub mod services;
mod tree;
mod views;

pub use dto::{Page, Pagination};
pub use model::{
    Comment, CommentStats, Like, LikeOutcome, LikeTarget, NewComment, NewPost, Post, PostStats,
};
pub use repo::ContentRepo;
pub use views::{CommentView, LikeView, PostView};
