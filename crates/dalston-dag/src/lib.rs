// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dalston-dag: the model catalog and task-DAG builder (§4.4). Pure,
//! synchronous logic — no broker or database access — so the scheduler
//! can unit test pipeline shapes without standing up Redis or Postgres.

pub mod builder;
pub mod catalog;
pub mod pipeline;

pub use builder::{build_task_dag, DagError, DagInputs, DefaultEngines, SpeakerDetection, SpeakerHints, TimestampGranularity};
pub use catalog::{CatalogEntry, ModelCatalog};
pub use pipeline::{PipelineShape, TaskSpec};
