pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod images;
pub mod notify;
pub mod posts;
pub mod state;
pub mod storage;
pub mod store;
pub mod tokens;
pub mod users;
pub mod verification;
