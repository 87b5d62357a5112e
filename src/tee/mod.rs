// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trusted execution: per-task challenges, task descriptions, stage
//! configuration and session generation.

pub mod challenge;
pub mod session;
pub mod task;
pub mod workflow;

pub use challenge::{TeeChallenge, TeeChallengeService};
pub use session::{SessionGenerationError, TeeSessionGenerationError, TeeSessionService};
pub use workflow::{TeeProvider, TeeWorkflowConfiguration};
