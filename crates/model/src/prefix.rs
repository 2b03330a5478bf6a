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
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use network::IpPrefix;
use serde::{Deserialize, Serialize};

/// One tracked prefix of a tenant. This is the record that storage backends
/// persist; all fields round-trip through serde, which is what allows the
/// payload to be stored as an opaque self-describing document.
///
/// A prefix is either a parent of child prefixes (`child_prefix_length` set,
/// the pool carved out in `available_child_prefixes`) or a leaf that hands
/// out single addresses from `ips`. The two modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefix {
    /// Canonical CIDR, the primary key within a tenant.
    pub cidr: IpPrefix,
    /// Back-reference to the parent for child prefixes. Navigational only,
    /// it is never followed transactionally.
    pub parent_cidr: Option<IpPrefix>,
    /// The single child length this prefix is carved into, once the first
    /// child was requested.
    pub child_prefix_length: Option<u8>,
    /// The fixed tiling of this prefix at `child_prefix_length`. `true`
    /// means the child CIDR is free, `false` means it is acquired.
    pub available_child_prefixes: BTreeMap<IpPrefix, bool>,
    /// Addresses allocated inside this prefix. The network and broadcast
    /// addresses are inserted at construction and are never released.
    pub ips: BTreeSet<IpAddr>,
    /// Optimistic-concurrency counter, bumped by every successful update.
    pub version: u64,
}

impl Prefix {
    /// A fresh root prefix with the network and broadcast addresses
    /// reserved. For a /32 or /128 the two coincide and the set holds a
    /// single entry.
    pub fn new(cidr: IpPrefix) -> Self {
        let mut ips = BTreeSet::new();
        ips.insert(cidr.network_address());
        ips.insert(cidr.broadcast_address());
        Self {
            cidr,
            parent_cidr: None,
            child_prefix_length: None,
            available_child_prefixes: BTreeMap::new(),
            ips,
            version: 0,
        }
    }

    /// Whether any address beyond the two auto-reserved ones is allocated.
    pub fn has_user_ips(&self) -> bool {
        self.ips.len() > 2
    }

    pub fn usage(&self) -> Usage {
        Usage {
            available_ips: u64::try_from(self.cidr.address_count()).unwrap_or(u64::MAX),
            acquired_ips: self.ips.len() as u64,
            available_prefixes: self.available_child_prefixes.len() as u64,
            acquired_prefixes: self
                .available_child_prefixes
                .values()
                .filter(|available| !**available)
                .count() as u64,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cidr)
    }
}

/// A single allocated address, handed out by an acquire operation. Not
/// persisted on its own; its truth is the membership in the parent prefix's
/// IP set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ip {
    pub ip: IpAddr,
    pub parent_prefix: IpPrefix,
}

/// Address and child-pool accounting of one prefix, derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub available_ips: u64,
    pub acquired_ips: u64,
    pub available_prefixes: u64,
    pub acquired_prefixes: u64,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ip:{}/{}", self.acquired_ips, self.available_ips)?;
        if self.available_prefixes > 0 {
            write!(
                f,
                " prefix:{}/{}",
                self.acquired_prefixes, self.available_prefixes
            )?;
        }
        Ok(())
    }
}
