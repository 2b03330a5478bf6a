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

/// The address family a prefix or address belongs to. Prefixes never span
/// families, so family plus prefix length fully determines how many host
/// bits a block has, and an allocation request that mixes families can be
/// rejected before any storage round-trip.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IpAddressFamily {
    Ipv4,
    Ipv6,
}

impl IpAddressFamily {
    /// Total address bits of the family. This is the `family_bits` input of
    /// the subnet arithmetic: a child at length `l` sits `family_bits - l`
    /// host bits above the parent's base address.
    pub fn bits(&self) -> u8 {
        match self {
            IpAddressFamily::Ipv4 => 32,
            IpAddressFamily::Ipv6 => 128,
        }
    }
}

pub trait IdentifyAddressFamily {
    /// Return the address family for this value.
    fn address_family(&self) -> IpAddressFamily;

    /// Whether `self` and `other` belong to the same family. Used to pair
    /// an address with the prefix it is requested from or released into.
    fn same_address_family<O>(&self, other: &O) -> bool
    where
        O: IdentifyAddressFamily,
    {
        self.address_family() == other.address_family()
    }
}

impl IdentifyAddressFamily for IpAddr {
    fn address_family(&self) -> IpAddressFamily {
        match self {
            IpAddr::V4(_) => IpAddressFamily::Ipv4,
            IpAddr::V6(_) => IpAddressFamily::Ipv6,
        }
    }
}
