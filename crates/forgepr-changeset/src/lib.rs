//! # forgepr-changeset
//!
//! The provider-agnostic data model for forgepr.
//!
//! A [`ChangeSet`] is what a caller wants a branch to look like: an ordered
//! map of paths to [`ChangeRequest`]s (literal content, a resolver over the
//! current file, or a deletion). The [`compiler`] turns a changeset plus the
//! files currently on the branch into a list of [`Action`]s that every
//! provider's commit transaction knows how to apply.
//!
//! ## Key components
//!
//! - [`Branch`], [`Commit`], [`FileEntry`] — repository state as providers report it
//! - [`ChangeSet`] / [`ChangeRequest`] / [`FileState`] — caller intent
//! - [`Action`] / [`ActionKind`] — normalized create/update/delete instructions
//! - [`compile`] — the pure merge of intent against current state
//! - [`PullRequest`] — the review request a reconcile ends with
//! - [`scope`] — scope-path join/strip helpers shared by reads and writes

pub mod action;
pub mod changeset;
pub mod commit;
pub mod compiler;
pub mod error;
pub mod pull_request;
pub mod scope;

pub use action::{Action, ActionKind};
pub use changeset::{ChangeRequest, ChangeSet, FileState};
pub use commit::{Author, Branch, Commit, FileEntry};
pub use compiler::compile;
pub use error::ChangeSetError;
pub use pull_request::PullRequest;
