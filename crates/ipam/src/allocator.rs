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
use std::net::IpAddr;
use std::sync::Arc;

use model::{Ip, Prefix};
use network::{IdentifyAddressFamily, IpPrefix, next_address};

use crate::retry::retry_on_optimistic_lock;
use crate::storage::Storage;
use crate::{IpamError, IpamResult};

/// Upper bound on the child pool a single parent may be carved into. The
/// pool is enumerated eagerly, so a wide IPv6 parent with a long child
/// length would otherwise materialize billions of map entries.
const MAX_CHILD_POOL_BITS: u8 = 16;

/// The allocation engine. Stateless and cheap to clone; all shared state
/// lives in the backing [`Storage`]. Every mutating operation reads fresh
/// state, mutates its own copy and persists with a version-checked update,
/// retrying the whole attempt on a conflict.
#[derive(Clone)]
pub struct Ipam {
    storage: Arc<dyn Storage>,
}

impl Ipam {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create and persist a top-level prefix. Creating a CIDR that already
    /// exists for the tenant returns the stored record unchanged. Overlap
    /// against existing roots is not checked here; callers that care run
    /// [`prefixes_overlapping`] first.
    pub async fn new_prefix(&self, cidr: &str, tenant: &str) -> IpamResult<Prefix> {
        let cidr: IpPrefix = cidr.parse()?;
        self.storage.create_prefix(Prefix::new(cidr), tenant).await
    }

    /// Delete a prefix that holds no allocated addresses beyond the two
    /// auto-reserved ones. Children are not cascaded; release them first.
    pub async fn delete_prefix(&self, cidr: &str, tenant: &str) -> IpamResult<Prefix> {
        let cidr: IpPrefix = cidr.parse()?;
        let prefix = self.storage.read_prefix(&cidr, tenant).await?;
        if prefix.has_user_ips() {
            return Err(IpamError::InvalidArgument(format!(
                "prefix {cidr} has ips, delete prefix not possible"
            )));
        }
        self.storage.delete_prefix(prefix, tenant).await
    }

    pub async fn prefix_from(&self, cidr: &str, tenant: &str) -> IpamResult<Prefix> {
        let cidr: IpPrefix = cidr.parse()?;
        self.storage.read_prefix(&cidr, tenant).await
    }

    pub async fn read_all_prefixes(&self, tenant: &str) -> IpamResult<Vec<Prefix>> {
        self.storage.read_all_prefixes(tenant).await
    }

    /// Carve a child prefix of `length` bits out of `parent_cidr` and
    /// persist it as its own record. All children of a parent share one
    /// length, fixed by the first acquire.
    pub async fn acquire_child_prefix(
        &self,
        parent_cidr: &str,
        length: u8,
        tenant: &str,
    ) -> IpamResult<Prefix> {
        let parent: IpPrefix = parent_cidr.parse()?;
        retry_on_optimistic_lock(|| self.acquire_child_prefix_internal(parent, length, tenant))
            .await
    }

    async fn acquire_child_prefix_internal(
        &self,
        parent_cidr: IpPrefix,
        length: u8,
        tenant: &str,
    ) -> IpamResult<Prefix> {
        let mut parent = self.storage.read_prefix(&parent_cidr, tenant).await?;
        if parent.has_user_ips() {
            return Err(IpamError::InvalidArgument(format!(
                "prefix {} has ips, acquire child prefix not possible",
                parent.cidr
            )));
        }

        match parent.child_prefix_length {
            // First acquire fixes the child length and carves the whole
            // pool upfront.
            None => {
                let count = parent.cidr.child_count(length)?;
                if count > 1u128 << u32::from(MAX_CHILD_POOL_BITS) {
                    return Err(IpamError::InvalidArgument(format!(
                        "child length /{length} would carve {count} subnets out of {}, pools beyond 2^{MAX_CHILD_POOL_BITS} children are refused",
                        parent.cidr
                    )));
                }
                for index in 0..count {
                    let child = parent.cidr.subnet_at(index, length)?;
                    parent.available_child_prefixes.insert(child, true);
                }
                parent.child_prefix_length = Some(length);
                tracing::debug!(parent = %parent.cidr, length, count, "initialized child prefix pool");
            }
            Some(existing) if existing != length => {
                return Err(IpamError::InvalidArgument(format!(
                    "given length:{length} is not equal to existing child prefix length:{existing}"
                )));
            }
            Some(_) => {}
        }

        // Any free child will do; selection order is an implementation
        // detail callers must not rely on.
        let Some(child_cidr) = parent
            .available_child_prefixes
            .iter()
            .find_map(|(cidr, available)| available.then_some(*cidr))
        else {
            return Err(IpamError::NoChildPrefixAvailable(format!(
                "no more child prefixes contained in prefix pool {}",
                parent.cidr
            )));
        };

        parent.available_child_prefixes.insert(child_cidr, false);
        let parent = self.storage.update_prefix(parent, tenant).await?;

        // The parent is committed at this point. A failure below leaves the
        // pool marking the child as used without a child record; the error
        // is surfaced for the caller to reconcile.
        let mut child = match self
            .storage
            .create_prefix(Prefix::new(child_cidr), tenant)
            .await
        {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(
                    parent = %parent.cidr,
                    child = %child_cidr,
                    "child record was not persisted after the parent pool update: {err}"
                );
                return Err(err);
            }
        };
        child.parent_cidr = Some(parent.cidr);
        self.storage.update_prefix(child, tenant).await
    }

    /// Hand a child prefix back to its parent's pool and delete its record.
    pub async fn release_child_prefix(&self, child: &Prefix, tenant: &str) -> IpamResult<()> {
        retry_on_optimistic_lock(|| self.release_child_prefix_internal(child, tenant)).await
    }

    async fn release_child_prefix_internal(&self, child: &Prefix, tenant: &str) -> IpamResult<()> {
        let parent_cidr = child.parent_cidr.ok_or_else(|| {
            IpamError::NotFound(format!("prefix {} is no child prefix", child.cidr))
        })?;
        let mut parent = match self.storage.read_prefix(&parent_cidr, tenant).await {
            Ok(parent) => parent,
            Err(IpamError::NotFound(_)) => {
                return Err(IpamError::NotFound(format!(
                    "prefix {} is no child prefix",
                    child.cidr
                )));
            }
            Err(err) => return Err(err),
        };
        if child.has_user_ips() {
            return Err(IpamError::InvalidArgument(format!(
                "prefix {} has ips, deletion not possible",
                child.cidr
            )));
        }

        parent.available_child_prefixes.insert(child.cidr, true);
        // The public delete re-checks against the fresh record.
        self.delete_prefix(&child.cidr.to_string(), tenant).await?;
        self.storage.update_prefix(parent, tenant).await?;
        Ok(())
    }

    /// Allocate the next free address of a leaf prefix.
    pub async fn acquire_ip(&self, prefix_cidr: &str, tenant: &str) -> IpamResult<Ip> {
        let cidr: IpPrefix = prefix_cidr.parse()?;
        retry_on_optimistic_lock(|| self.acquire_ip_internal(cidr, None, tenant)).await
    }

    /// Allocate one specific address of a leaf prefix.
    pub async fn acquire_specific_ip(
        &self,
        prefix_cidr: &str,
        ip: IpAddr,
        tenant: &str,
    ) -> IpamResult<Ip> {
        let cidr: IpPrefix = prefix_cidr.parse()?;
        retry_on_optimistic_lock(|| self.acquire_ip_internal(cidr, Some(ip), tenant)).await
    }

    async fn acquire_ip_internal(
        &self,
        prefix_cidr: IpPrefix,
        specific: Option<IpAddr>,
        tenant: &str,
    ) -> IpamResult<Ip> {
        let mut prefix = self.storage.read_prefix(&prefix_cidr, tenant).await?;
        if prefix.child_prefix_length.is_some() {
            return Err(IpamError::InvalidArgument(format!(
                "prefix {} has childprefixes, acquire ip not possible",
                prefix.cidr
            )));
        }
        if let Some(specific) = specific {
            if !specific.same_address_family(&prefix.cidr)
                || !prefix.cidr.contains_address(specific)
            {
                return Err(IpamError::InvalidArgument(format!(
                    "given ip:{specific} is not in {prefix_cidr}"
                )));
            }
        }

        // Walk the prefix from its network address. The two auto-reserved
        // addresses are members of the IP set and get skipped like any other
        // allocation.
        let mut requested_in_use = false;
        let mut candidate = Some(prefix.cidr.network_address());
        while let Some(ip) = candidate
            && prefix.cidr.contains_address(ip)
        {
            if prefix.ips.contains(&ip) {
                if specific == Some(ip) {
                    requested_in_use = true;
                }
                candidate = next_address(ip);
                continue;
            }
            if specific.is_none() || specific == Some(ip) {
                prefix.ips.insert(ip);
                let parent_prefix = prefix.cidr;
                self.storage.update_prefix(prefix, tenant).await?;
                return Ok(Ip { ip, parent_prefix });
            }
            candidate = next_address(ip);
        }

        match specific {
            Some(ip) if requested_in_use => Err(IpamError::IpInUse(format!(
                "requested ip:{ip} is already acquired in prefix:{prefix_cidr}"
            ))),
            _ => Err(IpamError::NoIpAvailable(format!(
                "no more ips in prefix:{prefix_cidr} left"
            ))),
        }
    }

    /// Release an address previously returned by an acquire operation and
    /// report the parent prefix's fresh state.
    pub async fn release_ip(&self, ip: &Ip, tenant: &str) -> IpamResult<Prefix> {
        self.release_ip_from_prefix(&ip.parent_prefix.to_string(), ip.ip, tenant)
            .await?;
        self.storage.read_prefix(&ip.parent_prefix, tenant).await
    }

    /// Release one allocated address of a prefix. The network and broadcast
    /// addresses stay reserved and cannot be released.
    pub async fn release_ip_from_prefix(
        &self,
        prefix_cidr: &str,
        ip: IpAddr,
        tenant: &str,
    ) -> IpamResult<()> {
        let cidr: IpPrefix = prefix_cidr.parse()?;
        retry_on_optimistic_lock(|| self.release_ip_internal(cidr, ip, tenant)).await
    }

    async fn release_ip_internal(
        &self,
        prefix_cidr: IpPrefix,
        ip: IpAddr,
        tenant: &str,
    ) -> IpamResult<()> {
        let mut prefix = self.storage.read_prefix(&prefix_cidr, tenant).await?;
        if ip == prefix.cidr.network_address() || ip == prefix.cidr.broadcast_address() {
            return Err(IpamError::InvalidArgument(format!(
                "ip:{ip} is the reserved network or broadcast address of {prefix_cidr}"
            )));
        }
        if !prefix.ips.remove(&ip) {
            return Err(IpamError::NotFound(format!(
                "unable to release ip:{ip} because it is not allocated in prefix:{prefix_cidr}"
            )));
        }
        self.storage.update_prefix(prefix, tenant).await?;
        Ok(())
    }

    /// Every address a host can get in `cidr`. The prefix is created if
    /// needed and drained completely, so it has no free addresses afterwards.
    pub async fn all_host_addresses(&self, cidr: &str, tenant: &str) -> IpamResult<Vec<IpAddr>> {
        let prefix = self.new_prefix(cidr, tenant).await?;
        let cidr = prefix.cidr.to_string();
        let mut addresses = Vec::new();
        loop {
            match self.acquire_ip(&cidr, tenant).await {
                Ok(ip) => addresses.push(ip.ip),
                Err(IpamError::NoIpAvailable(_)) => return Ok(addresses),
                Err(err) => return Err(err),
            }
        }
    }
}

/// Check a batch of new CIDRs against existing ones. The first overlapping
/// pair is reported as the error.
pub fn prefixes_overlapping<E, N>(existing: &[E], new: &[N]) -> IpamResult<()>
where
    E: AsRef<str>,
    N: AsRef<str>,
{
    for existing_cidr in existing {
        let existing_prefix: IpPrefix = existing_cidr.as_ref().parse()?;
        for new_cidr in new {
            let new_prefix: IpPrefix = new_cidr.as_ref().parse()?;
            if existing_prefix.overlaps(&new_prefix) {
                return Err(IpamError::InvalidArgument(format!(
                    "{new_prefix} overlaps {existing_prefix}"
                )));
            }
        }
    }
    Ok(())
}
