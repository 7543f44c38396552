// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Warden Core
//!
//! Risk-aware command gateway for a single administrator: policy
//! classification, a hard denylist, LLM-backed command analysis with an
//! audit trail, and scheduled filesystem snapshots with retention.
//!
//! # Architecture
//!
//! - **Layer:** Core System

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
