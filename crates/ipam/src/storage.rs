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
use async_trait::async_trait;
use model::Prefix;
use network::IpPrefix;

use crate::IpamResult;

/// Persistence contract the allocator runs against. All operations are
/// scoped to one tenant and each is atomic on a single record; the allocator
/// never asks for cross-record transactions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a new prefix with version 0. Creating a CIDR that already
    /// exists for the tenant returns the stored record unchanged.
    async fn create_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix>;

    /// Read one prefix, [`IpamError::NotFound`] when absent.
    async fn read_prefix(&self, cidr: &IpPrefix, tenant: &str) -> IpamResult<Prefix>;

    async fn read_all_prefixes(&self, tenant: &str) -> IpamResult<Vec<Prefix>>;

    /// Version-fenced compare-and-swap. The version check and the write must
    /// be one atomic step: when no record matches `(cidr, tenant, version)`
    /// the backend reports [`IpamError::OptimisticLock`], otherwise it
    /// persists the payload with the version bumped by one and returns the
    /// stored record.
    async fn update_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix>;

    /// Remove a prefix. Deleting an absent record is not an error.
    async fn delete_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix>;
}
