//! vidsplit-common: shared identifiers and path utilities.
//!
//! - **Typed IDs**: [`JobId`] wraps a UUID so job identifiers cannot be mixed
//!   up with arbitrary strings or other UUIDs.
//! - **Path utilities**: extension checks, filename sanitising and
//!   job-scoped directory helpers used by the upload and download layers.
//!
//! # Examples
//!
//! ```
//! use vidsplit_common::JobId;
//! use vidsplit_common::paths::{has_allowed_extension, sanitize_filename};
//! use std::path::Path;
//!
//! let id = JobId::new();
//! assert!(!id.to_string().is_empty());
//!
//! let allowed = ["mp4", "mkv"];
//! assert!(has_allowed_extension(Path::new("clip.MKV"), &allowed));
//! assert_eq!(sanitize_filename("../my clip.mp4").as_deref(), Some("my_clip.mp4"));
//! ```

pub mod ids;
pub mod paths;

pub use ids::JobId;
