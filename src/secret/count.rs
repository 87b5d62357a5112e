// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Write-once cap on the number of compute secrets per (app, role).

use std::sync::Arc;

use crate::error::{SmsError, SmsResult};
use crate::storage::SmsDatabase;

use super::SecretOwnerRole;

pub struct TeeTaskComputeSecretCountService {
    db: Arc<SmsDatabase>,
}

impl TeeTaskComputeSecretCountService {
    pub fn new(db: Arc<SmsDatabase>) -> Self {
        Self { db }
    }

    fn counter_key(app_address: &str, role: SecretOwnerRole) -> String {
        format!("{}|{}", app_address.to_lowercase(), role.as_str())
    }

    /// Set the cap for `(app_address, role)`.
    ///
    /// Fails with a validation error on a negative count and with a conflict
    /// when a cap was already set. The check and the write form one atomic
    /// step, so of two concurrent callers exactly one succeeds.
    pub fn set_max_app_compute_secret_count(
        &self,
        app_address: &str,
        role: SecretOwnerRole,
        count: i64,
    ) -> SmsResult<()> {
        let count = u64::try_from(count)
            .map_err(|_| SmsError::validation("secret count should be positive"))?;

        let key = Self::counter_key(app_address, role);
        if !self.db.insert_counter_if_absent(&key, count)? {
            return Err(SmsError::conflict(format!(
                "secret count already set for app {} and role {role}",
                app_address.to_lowercase()
            )));
        }
        tracing::info!(
            app_address = %app_address.to_lowercase(),
            role = %role,
            count,
            "Set compute secret count"
        );
        Ok(())
    }

    pub fn get_max_app_compute_secret_count(
        &self,
        app_address: &str,
        role: SecretOwnerRole,
    ) -> SmsResult<Option<u64>> {
        Ok(self.db.get_counter(&Self::counter_key(app_address, role))?)
    }

    pub fn is_max_app_compute_secret_count_present(
        &self,
        app_address: &str,
        role: SecretOwnerRole,
    ) -> SmsResult<bool> {
        Ok(self.get_max_app_compute_secret_count(app_address, role)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{random_address, test_storage};

    #[test]
    fn set_then_read() {
        let storage = test_storage();
        let service = TeeTaskComputeSecretCountService::new(storage.db.clone());
        let app = random_address();

        assert!(!service
            .is_max_app_compute_secret_count_present(&app, SecretOwnerRole::Requester)
            .unwrap());
        service
            .set_max_app_compute_secret_count(&app, SecretOwnerRole::Requester, 10)
            .unwrap();
        assert_eq!(
            service
                .get_max_app_compute_secret_count(&app.to_uppercase(), SecretOwnerRole::Requester)
                .unwrap(),
            Some(10)
        );
        assert!(!service
            .is_max_app_compute_secret_count_present(&app, SecretOwnerRole::ApplicationDeveloper)
            .unwrap());
    }

    #[test]
    fn zero_is_a_valid_cap() {
        let storage = test_storage();
        let service = TeeTaskComputeSecretCountService::new(storage.db.clone());
        let app = random_address();

        service
            .set_max_app_compute_secret_count(&app, SecretOwnerRole::Requester, 0)
            .unwrap();
        assert_eq!(
            service
                .get_max_app_compute_secret_count(&app, SecretOwnerRole::Requester)
                .unwrap(),
            Some(0)
        );
    }

    #[test]
    fn negative_count_is_rejected() {
        let storage = test_storage();
        let service = TeeTaskComputeSecretCountService::new(storage.db.clone());
        let app = random_address();

        let err = service
            .set_max_app_compute_secret_count(&app, SecretOwnerRole::Requester, -1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!service
            .is_max_app_compute_secret_count_present(&app, SecretOwnerRole::Requester)
            .unwrap());
    }

    #[test]
    fn second_set_conflicts_and_keeps_first() {
        let storage = test_storage();
        let service = TeeTaskComputeSecretCountService::new(storage.db.clone());
        let app = random_address();

        service
            .set_max_app_compute_secret_count(&app, SecretOwnerRole::Requester, 3)
            .unwrap();
        let err = service
            .set_max_app_compute_secret_count(&app, SecretOwnerRole::Requester, 5)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            service
                .get_max_app_compute_secret_count(&app, SecretOwnerRole::Requester)
                .unwrap(),
            Some(3)
        );
    }

    #[test]
    fn concurrent_sets_admit_exactly_one() {
        let storage = test_storage();
        let service = TeeTaskComputeSecretCountService::new(storage.db.clone());
        let app = random_address();

        let outcomes: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=8)
                .map(|count| {
                    let service = &service;
                    let app = app.as_str();
                    scope.spawn(move || {
                        service
                            .set_max_app_compute_secret_count(app, SecretOwnerRole::Requester, count)
                            .is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    }
}
