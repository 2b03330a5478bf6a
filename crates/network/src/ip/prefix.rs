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
use std::cmp::Ordering;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{AddrParseError, PrefixLenError};
// These are part of our public API because of the conversion traits.
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use super::address_family::{IdentifyAddressFamily, IpAddressFamily};

//
// Type definitions
//

/// This is a type that represents an IP prefix, which matches 0 or more leading
/// address bits with the remainder being unspecified or "don't-care". This
/// type uses the ipnet network types internally, but is stricter on what can be
/// parsed and stored. Here, we require that all bits after the prefix are set
/// to zero, so that there's no way to confuse this with a network interface
/// address (which has the same general representation but has a different
/// usage).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IpPrefix {
    V4(Ipv4Prefix),
    V6(Ipv6Prefix),
}

impl IdentifyAddressFamily for IpPrefix {
    fn address_family(&self) -> IpAddressFamily {
        match self {
            IpPrefix::V4(_) => IpAddressFamily::Ipv4,
            IpPrefix::V6(_) => IpAddressFamily::Ipv6,
        }
    }
}

impl IpPrefix {
    /// The number of leading address bits fixed by this prefix.
    pub fn prefix_length(&self) -> u8 {
        use IpPrefix::*;
        match self {
            V4(prefix) => prefix.prefix_length(),
            V6(prefix) => prefix.prefix_length(),
        }
    }

    /// Total bits of the address family, 32 or 128.
    pub fn family_bits(&self) -> u8 {
        self.address_family().bits()
    }

    /// The first address of the block (all host bits zero). Because the
    /// representation is canonical this is the stored address itself.
    pub fn network_address(&self) -> IpAddr {
        use IpPrefix::*;
        match self {
            V4(prefix) => IpAddr::V4(prefix.network_address()),
            V6(prefix) => IpAddr::V6(prefix.network_address()),
        }
    }

    /// The last address of the block (all host bits set). For IPv6 the same
    /// bitwise definition applies even though the protocol has no broadcast.
    pub fn broadcast_address(&self) -> IpAddr {
        use IpPrefix::*;
        match self {
            V4(prefix) => IpAddr::V4(prefix.broadcast_address()),
            V6(prefix) => IpAddr::V6(prefix.broadcast_address()),
        }
    }

    /// Whether the given address falls inside this prefix. An address of the
    /// other family is never contained.
    pub fn contains_address(&self, addr: IpAddr) -> bool {
        use IpPrefix::*;
        match (self, addr) {
            (V4(prefix), IpAddr::V4(v4)) => prefix.contains_address(v4),
            (V6(prefix), IpAddr::V6(v6)) => prefix.contains_address(v6),
            _ => false,
        }
    }

    /// Two prefixes overlap iff either contains the other's network address.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains_address(other.network_address())
            || other.contains_address(self.network_address())
    }

    /// The address space of this prefix as an address count, saturating at
    /// `u128::MAX` for an IPv6 /0.
    pub fn address_count(&self) -> u128 {
        let host_bits = u32::from(self.family_bits() - self.prefix_length());
        1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
    }

    /// How many child prefixes of `length` tile this prefix, saturating at
    /// `u128::MAX`. Errors if `length` does not describe a strictly smaller
    /// subnet of this prefix.
    pub fn child_count(&self, length: u8) -> Result<u128, PrefixError> {
        let ones = self.prefix_length();
        if length <= ones || length > self.family_bits() {
            return Err(PrefixError::BadChildLength {
                parent: ones,
                child: length,
            });
        }
        Ok(1u128
            .checked_shl(u32::from(length - ones))
            .unwrap_or(u128::MAX))
    }

    /// The `index`-th child subnet of bit-length `length`: the base address
    /// incremented by `index << (family_bits - length)`. Errors if `length`
    /// is not strictly longer than this prefix or `index` does not fit in
    /// the resulting pool.
    pub fn subnet_at(&self, index: u128, length: u8) -> Result<Self, PrefixError> {
        use IpPrefix::*;
        match self {
            V4(prefix) => prefix.subnet_at(index, length).map(V4),
            V6(prefix) => prefix.subnet_at(index, length).map(V6),
        }
    }
}

/// A representation of an IPv4 prefix. The bits after the end of the length of
/// the prefix are guaranteed to be zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Ipv4Prefix {
    prefix: Ipv4Net,
}

impl Ipv4Prefix {
    pub fn prefix_length(&self) -> u8 {
        self.prefix.prefix_len()
    }

    pub fn network_address(&self) -> Ipv4Addr {
        self.prefix.addr()
    }

    pub fn broadcast_address(&self) -> Ipv4Addr {
        self.prefix.broadcast()
    }

    pub fn contains_address(&self, addr: Ipv4Addr) -> bool {
        self.prefix.contains(&addr)
    }

    pub fn subnet_at(&self, index: u128, length: u8) -> Result<Self, PrefixError> {
        let ones = self.prefix.prefix_len();
        if length <= ones || length > 32 {
            return Err(PrefixError::BadChildLength {
                parent: ones,
                child: length,
            });
        }
        let pool_size = 1u128 << u32::from(length - ones);
        if index >= pool_size {
            return Err(PrefixError::SubnetIndexOutOfRange { index, length });
        }
        // The host bits of the base address are zero, so adding the shifted
        // index can never carry out of the parent's block.
        let addr_bits = self.prefix.addr().to_bits() + ((index as u32) << (32 - length));
        let subnet = Ipv4Net::new_assert(Ipv4Addr::from_bits(addr_bits), length);
        Ok(Self { prefix: subnet })
    }
}

/// A representation of an IPv6 prefix. The bits after the end of the length of
/// the prefix are guaranteed to be zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Ipv6Prefix {
    prefix: Ipv6Net,
}

impl Ipv6Prefix {
    pub fn prefix_length(&self) -> u8 {
        self.prefix.prefix_len()
    }

    pub fn network_address(&self) -> Ipv6Addr {
        self.prefix.addr()
    }

    /// The all-ones address of the block. IPv6 has no broadcast semantics,
    /// this is purely the bitwise last address.
    pub fn broadcast_address(&self) -> Ipv6Addr {
        self.prefix.broadcast()
    }

    pub fn contains_address(&self, addr: Ipv6Addr) -> bool {
        self.prefix.contains(&addr)
    }

    pub fn subnet_at(&self, index: u128, length: u8) -> Result<Self, PrefixError> {
        let ones = self.prefix.prefix_len();
        if length <= ones || length > 128 {
            return Err(PrefixError::BadChildLength {
                parent: ones,
                child: length,
            });
        }
        if let Some(pool_size) = 1u128.checked_shl(u32::from(length - ones))
            && index >= pool_size
        {
            return Err(PrefixError::SubnetIndexOutOfRange { index, length });
        }
        let offset = index
            .checked_shl(u32::from(128 - length))
            .ok_or(PrefixError::SubnetIndexOutOfRange { index, length })?;
        let addr_bits = self.prefix.addr().to_bits() + offset;
        let subnet = Ipv6Net::new_assert(Ipv6Addr::from_bits(addr_bits), length);
        Ok(Self { prefix: subnet })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    #[error(
        "Prefix not in canonical representation (address bits after prefix must be set to zero)"
    )]
    NonCanonicalRepresentation,

    #[error("Parse error: {0}")]
    ParseError(#[from] AddrParseError),

    #[error("Prefix length error: {0}")]
    BadPrefixLength(#[from] PrefixLenError),

    #[error("child prefix length {child} must be longer than parent prefix length {parent}")]
    BadChildLength { parent: u8, child: u8 },

    #[error("subnet index {index} does not fit in a pool of /{length} children")]
    SubnetIndexOutOfRange { index: u128, length: u8 },
}

//
// Functions
//

/// The next address after `ip`, or None when the address space of the family
/// is exhausted. Used to walk a prefix address by address.
pub fn next_address(ip: IpAddr) -> Option<IpAddr> {
    match ip {
        IpAddr::V4(v4) => v4
            .to_bits()
            .checked_add(1)
            .map(|bits| IpAddr::V4(Ipv4Addr::from_bits(bits))),
        IpAddr::V6(v6) => v6
            .to_bits()
            .checked_add(1)
            .map(|bits| IpAddr::V6(Ipv6Addr::from_bits(bits))),
    }
}

// Other stdlib trait implementations

impl Ord for IpPrefix {
    fn cmp(&self, other: &Self) -> Ordering {
        use IpPrefix::*;
        match (self, other) {
            (V4(_), V6(_)) => Ordering::Less,
            (V6(_), V4(_)) => Ordering::Greater,
            (V4(p1), V4(p2)) => p1.cmp(p2),
            (V6(p1), V6(p2)) => p1.cmp(p2),
        }
    }
}

impl PartialOrd for IpPrefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for IpPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpPrefix::V4(ipv4_prefix) => ipv4_prefix.fmt(f),
            IpPrefix::V6(ipv6_prefix) => ipv6_prefix.fmt(f),
        }
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.prefix.fmt(f)
    }
}

impl Display for Ipv6Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.prefix.fmt(f)
    }
}

impl FromStr for IpPrefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpNet::from_str(s)
            .map_err(PrefixError::from)
            .and_then(IpPrefix::try_from)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4Net::from_str(s)
            .map_err(PrefixError::from)
            .and_then(Ipv4Prefix::try_from)
    }
}

impl FromStr for Ipv6Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv6Net::from_str(s)
            .map_err(PrefixError::from)
            .and_then(Ipv6Prefix::try_from)
    }
}

impl TryFrom<IpNet> for IpPrefix {
    type Error = PrefixError;

    fn try_from(value: IpNet) -> Result<Self, Self::Error> {
        match value {
            IpNet::V4(ipv4_net) => Ipv4Prefix::try_from(ipv4_net).map(Self::V4),
            IpNet::V6(ipv6_net) => Ipv6Prefix::try_from(ipv6_net).map(Self::V6),
        }
    }
}

impl TryFrom<Ipv4Net> for Ipv4Prefix {
    type Error = PrefixError;

    fn try_from(value: Ipv4Net) -> Result<Self, Self::Error> {
        let is_canonical_representation = value.addr() == value.network();
        is_canonical_representation
            .then_some(Self { prefix: value })
            .ok_or(PrefixError::NonCanonicalRepresentation)
    }
}

impl TryFrom<Ipv6Net> for Ipv6Prefix {
    type Error = PrefixError;

    fn try_from(value: Ipv6Net) -> Result<Self, Self::Error> {
        let is_canonical_representation = value.addr() == value.network();
        is_canonical_representation
            .then_some(Self { prefix: value })
            .ok_or(PrefixError::NonCanonicalRepresentation)
    }
}

impl From<IpPrefix> for IpNet {
    fn from(value: IpPrefix) -> Self {
        match value {
            IpPrefix::V4(v4) => IpNet::V4(v4.into()),
            IpPrefix::V6(v6) => IpNet::V6(v6.into()),
        }
    }
}

impl From<Ipv4Prefix> for Ipv4Net {
    fn from(value: Ipv4Prefix) -> Self {
        value.prefix
    }
}

impl From<Ipv6Prefix> for Ipv6Net {
    fn from(value: Ipv6Prefix) -> Self {
        value.prefix
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for IpPrefix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for IpPrefix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//
// Implementations of foreign traits on our types
//

#[cfg(feature = "ipnetwork")]
impl From<Ipv4Prefix> for ipnetwork::Ipv4Network {
    fn from(value: Ipv4Prefix) -> Self {
        let prefix = value.prefix;
        let addr = prefix.addr();
        let length = prefix.prefix_len();
        // If Ipv4Network::new() doesn't accept what we got out of
        // ipnet::Ipv4Net, something has gone very wrong and we should just
        // panic.
        Self::new(addr, length).expect(
        "Ipv4Network::new() returned an unexpected Err (this shouldn't happen, please file a bug)"
    )
    }
}

#[cfg(feature = "ipnetwork")]
impl From<Ipv6Prefix> for ipnetwork::Ipv6Network {
    fn from(value: Ipv6Prefix) -> Self {
        let prefix = value.prefix;
        let addr = prefix.addr();
        let length = prefix.prefix_len();
        // If Ipv6Network::new() doesn't accept what we got out of
        // ipnet::Ipv6Net, something has gone very wrong and we should just
        // panic.
        Self::new(addr, length).expect(
        "Ipv6Network::new() returned an unexpected Err (this shouldn't happen, please file a bug)"
    )
    }
}

#[cfg(feature = "ipnetwork")]
impl From<IpPrefix> for ipnetwork::IpNetwork {
    fn from(value: IpPrefix) -> Self {
        match value {
            IpPrefix::V4(v4) => ipnetwork::IpNetwork::V4(v4.into()),
            IpPrefix::V6(v6) => ipnetwork::IpNetwork::V6(v6.into()),
        }
    }
}

#[cfg(feature = "ipnetwork")]
impl TryFrom<ipnetwork::IpNetwork> for IpPrefix {
    type Error = PrefixError;

    fn try_from(value: ipnetwork::IpNetwork) -> Result<Self, Self::Error> {
        let addr = value.ip();
        let prefix_length = value.prefix();
        IpNet::new(addr, prefix_length)
            .map_err(PrefixError::from)
            .and_then(Self::try_from)
    }
}
