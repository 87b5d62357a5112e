// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization: signed challenges for secret writes and the worker
//! authorization check guarding key release.

pub mod challenge;
pub mod service;

pub use service::AuthorizationService;
