// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ff-adapters: collaborator seams for Fleet Fetch
//!
//! The engine core treats the FTP client, dial-up driver, relational
//! store, SMTP sender, and share-credential plumbing as collaborators.
//! This crate holds their trait definitions plus fake implementations
//! with call recording and failure injection for the test suites, and
//! the in-memory/logging defaults the daemon falls back to.

pub mod auth;
pub mod dialup;
pub mod mailer;
pub mod remote;
mod remote_fake;
pub mod status;

pub use auth::{AuthError, FakeShareAuth, NoopShareAuth, ShareAuth};
pub use dialup::{DialEvent, DialEventKind, DialUpError, DialUpPort, FakeDialUp};
pub use mailer::{FakeMailer, LogMailer, MailError, Mailer, SentMail};
pub use remote::{RemoteConnector, RemoteEntry, RemoteError, RemoteSession};
pub use remote_fake::{FakeRemote, RemoteCall};
pub use status::{MemoryStatusStore, StatusStore, StoreError};
