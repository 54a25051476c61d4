pub mod callbacks;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod library;
pub mod quota;
pub mod reconcile;
pub mod store;
