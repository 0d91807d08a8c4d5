//! Watches starred and organization repositories on GitHub and emails one
//! notification per repository that published a release or tag within the
//! freshness window.

pub mod aggregator;
pub mod clone;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod github;
pub mod model;
pub mod pool;
pub mod render;
pub mod resolver;
pub mod scan;
pub mod tags;
pub mod window;
