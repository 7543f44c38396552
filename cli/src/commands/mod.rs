// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Warden CLI

pub mod audit;
pub mod classify;
pub mod config;
pub mod daemon;
pub mod exec;
pub mod snapshot;

pub use self::audit::AuditCommand;
pub use self::classify::ClassifyCommand;
pub use self::config::ConfigCommand;
pub use self::exec::ExecCommand;
pub use self::snapshot::SnapshotCommand;
