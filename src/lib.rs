//! Project hierarchy, visibility and activity feed core of a project tracker.
//!
//! A request builds its services on top of one store:
//!
//! ```no_run
//! use trellis::activity::ActivityFeed;
//! use trellis::authz::MembershipAuthorizer;
//! use trellis::db::Database;
//! use trellis::models::{ActivityQuery, ActivityScope, Actor};
//! use trellis::tree::ProjectTree;
//! use trellis::visibility::Visibility;
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = Database::open_memory()?;
//! db.migrate()?;
//!
//! let tree = ProjectTree::new(&db);
//! let authz = MembershipAuthorizer::new(&tree);
//! let visibility = Visibility::new(&tree, &authz);
//!
//! let feed = ActivityFeed::new(&visibility)
//!     .collect(&Actor::anonymous(), &ActivityQuery::new(ActivityScope::Global))?;
//! assert!(feed.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod authz;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod models;
pub mod news;
pub mod roadmap;
pub mod statuses;
pub mod store;
pub mod tree;
pub mod visibility;

pub use error::{Error, Result};
