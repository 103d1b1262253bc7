// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Flow definitions, execution and inversion
//!
//! A flow moves files matching a source pattern to a target pattern,
//! editing their structured content on the way. Flows are declared in
//! platform definition files and run in either direction: install
//! (package → workspace) or save (workspace → package).

mod context;
mod definition;
mod executor;
pub mod fields;
mod inverter;
pub mod merge;
mod operations;
pub mod paths;
mod store;
mod validation;

pub use context::{Direction, FlowContext};
pub use definition::{
    Condition, FilterPredicate, Flow, FlowTarget, FlowTo, MapFn, MergeStrategy, Operation, Pattern, PipeStep,
    ReplaceSpec, SwitchPattern, TargetSpec, TransformStep,
};
pub use executor::{ChangeKind, FileOutcome, FlowExecutor, FlowReport, FlowStatus, PlannedWrite};
pub use inverter::{FlowInverter, InversionNote, InvertedFlow};
pub use operations::{apply_operations, apply_steps, replace_text};
pub use store::{DiskStore, FileStore, MemoryStore};
pub use validation::{FlowValidator, ValidationResult};
