//! # forgepr-submit
//!
//! Turns a [`ChangeSet`](forgepr_changeset::ChangeSet) into a committed
//! branch and an open pull request on GitHub, GitLab or Bitbucket.
//!
//! A reconcile runs five stages in order, each against the remote state the
//! previous one left behind:
//!
//! 1. [`branch::prepare`] — make sure the source branch exists (optionally reset)
//! 2. [`tree::list`] — read the baseline files the changeset touches
//! 3. [`forgepr_changeset::compile`] — merge intent with the baseline into actions
//! 4. [`GitProvider::commit`] — apply all actions as one commit
//! 5. [`pull_request::create_or_update`] — open the PR, or update the open one
//!
//! [`Reconciler`] drives all five; the stage functions are public for callers
//! that need only part of the flow.
//!
//! ## Key components
//!
//! - [`GitProvider`] — async capability interface, one impl per hosting service
//! - [`providers::connect`] — builds an authenticated provider from [`ProviderConfig`]
//! - [`providers::MemoryProvider`] — in-process provider for tests and dry runs
//! - [`ForgeConfig`] — `.forgepr.toml` loading
//! - [`SubmitError`] — every failure with branch/path context and upstream status

pub mod branch;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod providers;
pub mod pull_request;
pub mod reconcile;
pub mod repo_url;
pub mod tree;

pub use config::{ForgeConfig, ProviderConfig, ProviderKind, ReconcileConfig, CONFIG_FILE_NAME};
pub use error::{Result, SubmitError, UpstreamError};
pub use provider::{EntryKind, GitProvider, NewPullRequest, PullRequestCreation, TreeEntry};
pub use providers::connect;
pub use reconcile::{ReconcileOutcome, ReconcilePlan, ReconcileRequest, Reconciler};
pub use tree::ReadOptions;
