//! Application services: rebuilds, revalidation and change watching.

pub mod error;
pub mod fetch;
pub mod origin;
pub mod rebuild;
pub mod render;
pub mod revalidate;
pub mod subscriptions;
pub mod watcher;
