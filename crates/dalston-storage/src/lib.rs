// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dalston-storage: the Postgres data-access layer for `jobs` and `tasks`,
//! the only two tables the orchestration core reads or writes (§6).
//!
//! Query bodies use runtime `sqlx::query`/`query_as` rather than the
//! compile-time-checked `query!` macros; there is no live database in this
//! workspace's build environment to validate queries against.

#[cfg(any(test, feature = "test-support"))]
mod fake;
mod jobs;
mod rows;
mod tasks;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeJobStore, FakeTaskStore};
pub use jobs::{JobStore, PgJobStore};
pub use rows::{JobRow, TaskRow};
pub use tasks::{PgTaskStore, TaskStore};

/// Embedded schema migrations, applied via `MIGRATOR.run(&pool)` at binary
/// startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
