// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-chain boundary.
//!
//! The service never talks to a node itself. Ownership of apps, datasets and
//! workerpools, and the facts about a task the authorization gate needs, are
//! supplied through [`ChainDirectory`] as already-validated values.

pub mod signing;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use alloy::primitives::{Address, B256};

pub use signing::{
    generate_credentials, parse_address, parse_b256, recover_personal_signer, EthereumCredentials,
};

/// Facts about an on-chain task relevant to key release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTask {
    pub chain_task_id: B256,
    /// Owner of the workerpool the task's deal was matched with.
    pub workerpool_owner: Address,
}

/// Read-only view of on-chain registries.
pub trait ChainDirectory: Send + Sync {
    /// Owner of an app, dataset or workerpool contract.
    fn owner_of(&self, object_address: &Address) -> Option<Address>;

    /// Task by chain task id.
    fn get_task(&self, chain_task_id: &B256) -> Option<ChainTask>;
}

/// Directory backed by process memory, fed by the embedding service.
#[derive(Debug, Default)]
pub struct InMemoryChainDirectory {
    owners: RwLock<HashMap<Address, Address>>,
    tasks: RwLock<HashMap<B256, ChainTask>>,
}

impl InMemoryChainDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // Map entries are written whole, so a poisoned lock still guards
    // consistent data.

    pub fn register_owner(&self, object_address: Address, owner: Address) {
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object_address, owner);
    }

    pub fn register_task(&self, task: ChainTask) {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.chain_task_id, task);
    }
}

impl ChainDirectory for InMemoryChainDirectory {
    fn owner_of(&self, object_address: &Address) -> Option<Address> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(object_address)
            .copied()
    }

    fn get_task(&self, chain_task_id: &B256) -> Option<ChainTask> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_task_id)
            .cloned()
    }
}
