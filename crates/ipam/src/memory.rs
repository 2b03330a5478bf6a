/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use model::Prefix;
use network::IpPrefix;

use crate::storage::Storage;
use crate::{IpamError, IpamResult};

/// Process-local [`Storage`] backend. Implements the same contract as the
/// database backend, including the version fence, so it can stand in for it
/// in tests and in embedders that do not want an external store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tenants: RwLock<HashMap<String, HashMap<IpPrefix, Prefix>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix> {
        let mut tenants = self.tenants.write().expect("prefix map lock poisoned");
        let prefixes = tenants.entry(tenant.to_string()).or_default();
        if let Some(existing) = prefixes.get(&prefix.cidr) {
            return Ok(existing.clone());
        }
        let mut prefix = prefix;
        prefix.version = 0;
        prefixes.insert(prefix.cidr, prefix.clone());
        Ok(prefix)
    }

    async fn read_prefix(&self, cidr: &IpPrefix, tenant: &str) -> IpamResult<Prefix> {
        let tenants = self.tenants.read().expect("prefix map lock poisoned");
        tenants
            .get(tenant)
            .and_then(|prefixes| prefixes.get(cidr))
            .cloned()
            .ok_or_else(|| IpamError::NotFound(format!("unable to find prefix for cidr:{cidr}")))
    }

    async fn read_all_prefixes(&self, tenant: &str) -> IpamResult<Vec<Prefix>> {
        let tenants = self.tenants.read().expect("prefix map lock poisoned");
        Ok(tenants
            .get(tenant)
            .map(|prefixes| prefixes.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix> {
        let mut tenants = self.tenants.write().expect("prefix map lock poisoned");
        let stored = tenants
            .get_mut(tenant)
            .and_then(|prefixes| prefixes.get_mut(&prefix.cidr))
            .ok_or_else(|| {
                IpamError::OptimisticLock(format!(
                    "update of prefix {} did not match any record",
                    prefix.cidr
                ))
            })?;
        if stored.version != prefix.version {
            return Err(IpamError::OptimisticLock(format!(
                "update of prefix {} expected version {} but found {}",
                prefix.cidr, prefix.version, stored.version
            )));
        }
        let mut updated = prefix;
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix> {
        let mut tenants = self.tenants.write().expect("prefix map lock poisoned");
        if let Some(prefixes) = tenants.get_mut(tenant) {
            prefixes.remove(&prefix.cidr);
        }
        Ok(prefix)
    }
}
