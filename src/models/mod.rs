//! Domain models for Trellis.
//!
//! # Core Concepts
//!
//! ## Hierarchy
//!
//! - [`Project`]: Node of a forest of projects. Projects are public or private,
//!   active or archived, and ordered among their siblings by `position`.
//! - [`Version`]: Release milestone of a project, planned on the roadmap.
//!
//! ## Activity sources
//!
//! - [`Issue`] and its [`Journal`] entries (edits, status transitions).
//! - [`News`] with its append-only [`Comment`]s.
//! - [`Attachment`]: File metadata attached to a project or a version.
//!
//! ## People
//!
//! - [`User`] and [`Membership`]: who belongs to which project with which [`Role`].
//! - [`Actor`]: The user a query runs on behalf of. Always passed explicitly.
//!
//! [`ActivityEvent`] is derived on demand from the sources above and never stored.

mod activity;
mod attachment;
mod issue;
mod news;
mod project;
mod user;
mod version;

pub use activity::*;
pub use attachment::*;
pub use issue::*;
pub use news::*;
pub use project::*;
pub use user::*;
pub use version::*;
