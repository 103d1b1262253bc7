// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Utility modules
//!
//! Terminal output helpers for the opkg CLI.

pub mod colors;
pub mod spinner;

pub use colors::*;
pub use spinner::*;
