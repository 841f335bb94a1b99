use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Clamped `(limit, offset)`.
    pub fn window(self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_LIMIT), self.offset.max(0))
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<T>,
}

/// Body of both comment-creating routes. `post` is only read by
/// `POST /posts/comments`; the nested route takes it from the path.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub post: Option<Uuid>,
    #[serde(default)]
    pub parent: Option<Uuid>,
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct LikeToggleResponse {
    pub success: bool,
    pub message: &'static str,
    pub liked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.window(), (20, 0));
        let p = Pagination {
            limit: 1000,
            offset: -5,
        };
        assert_eq!(p.window(), (100, 0));
        let p = Pagination {
            limit: 0,
            offset: 40,
        };
        assert_eq!(p.window(), (1, 40));
    }
}
