// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value objects, aggregates and repository contracts. Nothing in here
//! performs I/O except configuration loading.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod audit;
pub mod clock;
pub mod command;
pub mod config;
pub mod events;
pub mod llm;
pub mod path_sanitizer;
pub mod policy;
pub mod repository;
pub mod risk;
pub mod snapshot;
pub mod storage;
