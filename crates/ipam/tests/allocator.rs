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
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use ipam::{Ipam, IpamError, MemoryStorage, prefixes_overlapping};

const TENANT: &str = "tenant-a";

fn ipam() -> Ipam {
    Ipam::new(Arc::new(MemoryStorage::new()))
}

fn addr(s: &str) -> IpAddr {
    IpAddr::from_str(s).unwrap()
}

#[tokio::test]
async fn test_new_prefix_reserves_network_and_broadcast() {
    let ipam = ipam();
    let prefix = ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let usage = prefix.usage();
    assert_eq!(usage.available_ips, 256);
    assert_eq!(usage.acquired_ips, 2);
    assert!(prefix.ips.contains(&addr("10.0.0.0")));
    assert!(prefix.ips.contains(&addr("10.0.0.255")));
    assert_eq!(prefix.version, 0);
    assert!(prefix.parent_cidr.is_none());
}

#[tokio::test]
async fn test_new_prefix_rejects_bad_cidrs() {
    let ipam = ipam();
    ipam.new_prefix("not-a-cidr", TENANT).await.unwrap_err();
    ipam.new_prefix("10.0.0.0/33", TENANT).await.unwrap_err();
    // Host bits after the prefix must be zero.
    ipam.new_prefix("10.0.0.1/24", TENANT).await.unwrap_err();
}

#[tokio::test]
async fn test_new_prefix_is_idempotent() {
    let ipam = ipam();
    let first = ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();
    let second = ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();
    assert_eq!(first, second);

    // After a mutation the create returns the live record, version included.
    ipam.acquire_ip("10.0.0.0/24", TENANT).await.unwrap();
    let third = ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();
    assert_eq!(third.version, 1);
    assert_eq!(third.usage().acquired_ips, 3);
}

#[tokio::test]
async fn test_tenants_do_not_see_each_other() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();
    let missing = ipam.prefix_from("10.0.0.0/24", "tenant-b").await.unwrap_err();
    assert!(matches!(missing, IpamError::NotFound(_)));

    ipam.new_prefix("10.0.0.0/24", "tenant-b").await.unwrap();
    assert_eq!(ipam.read_all_prefixes("tenant-b").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_acquire_ip_walks_up_from_the_network_address() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let first = ipam.acquire_ip("10.0.0.0/24", TENANT).await.unwrap();
    assert_eq!(first.ip, addr("10.0.0.1"));
    assert_eq!(first.parent_prefix.to_string(), "10.0.0.0/24");

    let second = ipam.acquire_ip("10.0.0.0/24", TENANT).await.unwrap();
    assert_eq!(second.ip, addr("10.0.0.2"));

    let prefix = ipam.prefix_from("10.0.0.0/24", TENANT).await.unwrap();
    assert_eq!(prefix.usage().acquired_ips, 4);
}

#[tokio::test]
async fn test_acquire_specific_ip() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let acquired = ipam
        .acquire_specific_ip("10.0.0.0/24", addr("10.0.0.1"), TENANT)
        .await
        .unwrap();
    assert_eq!(acquired.ip, addr("10.0.0.1"));

    let in_use = ipam
        .acquire_specific_ip("10.0.0.0/24", addr("10.0.0.1"), TENANT)
        .await
        .unwrap_err();
    assert!(matches!(in_use, IpamError::IpInUse(_)));

    let outside = ipam
        .acquire_specific_ip("10.0.0.0/24", addr("10.1.0.1"), TENANT)
        .await
        .unwrap_err();
    assert!(matches!(outside, IpamError::InvalidArgument(_)));

    let wrong_family = ipam
        .acquire_specific_ip("10.0.0.0/24", addr("2001:db8::1"), TENANT)
        .await
        .unwrap_err();
    assert!(matches!(wrong_family, IpamError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_acquire_ip_exhaustion() {
    let ipam = ipam();
    ipam.new_prefix("192.168.0.0/30", TENANT).await.unwrap();

    // Two allocatable addresses between network and broadcast.
    ipam.acquire_ip("192.168.0.0/30", TENANT).await.unwrap();
    ipam.acquire_ip("192.168.0.0/30", TENANT).await.unwrap();
    let exhausted = ipam.acquire_ip("192.168.0.0/30", TENANT).await.unwrap_err();
    assert!(matches!(exhausted, IpamError::NoIpAvailable(_)));

    // Exhaustion is stable, a second attempt reports the same.
    let again = ipam.acquire_ip("192.168.0.0/30", TENANT).await.unwrap_err();
    assert!(matches!(again, IpamError::NoIpAvailable(_)));
}

#[tokio::test]
async fn test_tiny_prefixes_have_no_allocatable_addresses() {
    let ipam = ipam();

    ipam.new_prefix("10.0.0.0/31", TENANT).await.unwrap();
    let err = ipam.acquire_ip("10.0.0.0/31", TENANT).await.unwrap_err();
    assert!(matches!(err, IpamError::NoIpAvailable(_)));

    ipam.new_prefix("10.0.0.4/32", TENANT).await.unwrap();
    let err = ipam.acquire_ip("10.0.0.4/32", TENANT).await.unwrap_err();
    assert!(matches!(err, IpamError::NoIpAvailable(_)));
}

#[tokio::test]
async fn test_release_restores_the_prior_state() {
    let ipam = ipam();
    let before = ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let acquired = ipam.acquire_ip("10.0.0.0/24", TENANT).await.unwrap();
    let released = ipam.release_ip(&acquired, TENANT).await.unwrap();
    assert_eq!(released.ips, before.ips);

    let unknown = ipam
        .release_ip_from_prefix("10.0.0.0/24", addr("10.0.0.42"), TENANT)
        .await
        .unwrap_err();
    assert!(matches!(unknown, IpamError::NotFound(_)));

    let missing_prefix = ipam
        .release_ip_from_prefix("172.16.0.0/24", addr("172.16.0.1"), TENANT)
        .await
        .unwrap_err();
    assert!(matches!(missing_prefix, IpamError::NotFound(_)));
}

#[tokio::test]
async fn test_reserved_addresses_cannot_be_released() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    for reserved in ["10.0.0.0", "10.0.0.255"] {
        let err = ipam
            .release_ip_from_prefix("10.0.0.0/24", addr(reserved), TENANT)
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::InvalidArgument(_)));
    }
}

#[tokio::test]
async fn test_delete_prefix() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let acquired = ipam.acquire_ip("10.0.0.0/24", TENANT).await.unwrap();
    let occupied = ipam.delete_prefix("10.0.0.0/24", TENANT).await.unwrap_err();
    assert!(matches!(occupied, IpamError::InvalidArgument(_)));

    ipam.release_ip(&acquired, TENANT).await.unwrap();
    ipam.delete_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let gone = ipam.delete_prefix("10.0.0.0/24", TENANT).await.unwrap_err();
    assert!(matches!(gone, IpamError::NotFound(_)));
}

#[tokio::test]
async fn test_child_prefixes_tile_the_parent() {
    let ipam = ipam();
    ipam.new_prefix("192.168.0.0/20", TENANT).await.unwrap();

    let mut children = BTreeSet::new();
    for _ in 0..4 {
        let child = ipam
            .acquire_child_prefix("192.168.0.0/20", 22, TENANT)
            .await
            .unwrap();
        assert_eq!(child.cidr.prefix_length(), 22);
        assert_eq!(
            child.parent_cidr.map(|cidr| cidr.to_string()),
            Some("192.168.0.0/20".to_string())
        );
        children.insert(child.cidr);
    }
    // Four distinct /22s cover the /20 completely.
    assert_eq!(children.len(), 4);

    let exhausted = ipam
        .acquire_child_prefix("192.168.0.0/20", 22, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(exhausted, IpamError::NoChildPrefixAvailable(_)));

    let parent = ipam.prefix_from("192.168.0.0/20", TENANT).await.unwrap();
    let usage = parent.usage();
    assert_eq!(usage.available_prefixes, 4);
    assert_eq!(usage.acquired_prefixes, 4);
    // A parent of children never holds user addresses.
    assert_eq!(parent.ips.len(), 2);

    // Every marked child has its own record pointing back at the parent.
    for child in &children {
        let record = ipam.prefix_from(&child.to_string(), TENANT).await.unwrap();
        assert_eq!(record.parent_cidr, Some(parent.cidr));
    }
}

#[tokio::test]
async fn test_child_length_is_fixed_by_the_first_acquire() {
    let ipam = ipam();
    ipam.new_prefix("192.168.0.0/20", TENANT).await.unwrap();
    ipam.acquire_child_prefix("192.168.0.0/20", 22, TENANT)
        .await
        .unwrap();

    let mismatch = ipam
        .acquire_child_prefix("192.168.0.0/20", 24, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(mismatch, IpamError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_child_length_must_be_longer_than_the_parent() {
    let ipam = ipam();
    ipam.new_prefix("192.168.0.0/20", TENANT).await.unwrap();

    let same = ipam
        .acquire_child_prefix("192.168.0.0/20", 20, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(same, IpamError::Prefix(_)));

    let shorter = ipam
        .acquire_child_prefix("192.168.0.0/20", 16, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(shorter, IpamError::Prefix(_)));
}

#[tokio::test]
async fn test_oversized_child_pools_are_refused() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/8", TENANT).await.unwrap();

    // A /26 pool under a /8 would hold 2^18 children.
    let err = ipam
        .acquire_child_prefix("10.0.0.0/8", 26, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_child_and_ip_modes_are_mutually_exclusive() {
    let ipam = ipam();

    ipam.new_prefix("10.1.0.0/24", TENANT).await.unwrap();
    ipam.acquire_ip("10.1.0.0/24", TENANT).await.unwrap();
    let has_ips = ipam
        .acquire_child_prefix("10.1.0.0/24", 26, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(has_ips, IpamError::InvalidArgument(_)));

    ipam.new_prefix("10.2.0.0/24", TENANT).await.unwrap();
    ipam.acquire_child_prefix("10.2.0.0/24", 26, TENANT)
        .await
        .unwrap();
    let has_children = ipam.acquire_ip("10.2.0.0/24", TENANT).await.unwrap_err();
    assert!(matches!(has_children, IpamError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_release_child_prefix_round_trip() {
    let ipam = ipam();
    let before = ipam.new_prefix("192.168.0.0/20", TENANT).await.unwrap();

    let child = ipam
        .acquire_child_prefix("192.168.0.0/20", 22, TENANT)
        .await
        .unwrap();
    ipam.release_child_prefix(&child, TENANT).await.unwrap();

    // The child record is gone and the parent pool is all-free again.
    let missing = ipam
        .prefix_from(&child.cidr.to_string(), TENANT)
        .await
        .unwrap_err();
    assert!(matches!(missing, IpamError::NotFound(_)));

    let parent = ipam.prefix_from("192.168.0.0/20", TENANT).await.unwrap();
    assert_eq!(parent.usage().acquired_prefixes, 0);
    assert_eq!(parent.ips, before.ips);
}

#[tokio::test]
async fn test_release_child_prefix_guards() {
    let ipam = ipam();
    ipam.new_prefix("192.168.0.0/20", TENANT).await.unwrap();
    let child = ipam
        .acquire_child_prefix("192.168.0.0/20", 22, TENANT)
        .await
        .unwrap();

    // A root is no child.
    let root = ipam.prefix_from("192.168.0.0/20", TENANT).await.unwrap();
    let not_a_child = ipam.release_child_prefix(&root, TENANT).await.unwrap_err();
    assert!(matches!(not_a_child, IpamError::NotFound(_)));

    // A child with live addresses cannot be handed back.
    ipam.acquire_ip(&child.cidr.to_string(), TENANT)
        .await
        .unwrap();
    let fresh_child = ipam.prefix_from(&child.cidr.to_string(), TENANT).await.unwrap();
    let occupied = ipam
        .release_child_prefix(&fresh_child, TENANT)
        .await
        .unwrap_err();
    assert!(matches!(occupied, IpamError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_prefixes_overlapping() {
    prefixes_overlapping(&["10.0.0.0/24"], &["10.1.0.0/24", "192.168.0.0/16"]).unwrap();

    let err = prefixes_overlapping(&["10.0.0.0/8"], &["10.1.0.0/24"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid argument: 10.1.0.0/24 overlaps 10.0.0.0/8"
    );

    prefixes_overlapping(&["10.0.0.0/8"], &["bad"]).unwrap_err();
}

#[tokio::test]
async fn test_all_host_addresses_drains_the_prefix() {
    let ipam = ipam();
    let addresses = ipam
        .all_host_addresses("192.168.0.0/30", TENANT)
        .await
        .unwrap();
    assert_eq!(addresses, vec![addr("192.168.0.1"), addr("192.168.0.2")]);

    let exhausted = ipam.acquire_ip("192.168.0.0/30", TENANT).await.unwrap_err();
    assert!(matches!(exhausted, IpamError::NoIpAvailable(_)));
}

#[tokio::test]
async fn test_ipv6_prefixes_work_the_same_way() {
    let ipam = ipam();
    ipam.new_prefix("2001:db8:0:1::/64", TENANT).await.unwrap();

    let first = ipam.acquire_ip("2001:db8:0:1::/64", TENANT).await.unwrap();
    assert_eq!(first.ip, addr("2001:db8:0:1::1"));

    let child = ipam
        .acquire_child_prefix("2001:db8::/48", 56, TENANT)
        .await
        .unwrap_err();
    // The /48 parent was never created for this tenant.
    assert!(matches!(child, IpamError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_acquires_hand_out_distinct_addresses() {
    let ipam = ipam();
    ipam.new_prefix("10.0.0.0/24", TENANT).await.unwrap();

    let mut workers = Vec::new();
    for _ in 0..2 {
        let ipam = ipam.clone();
        workers.push(tokio::spawn(async move {
            let mut acquired = Vec::new();
            for _ in 0..5 {
                acquired.push(ipam.acquire_ip("10.0.0.0/24", TENANT).await.unwrap().ip);
            }
            acquired
        }));
    }

    let mut all = BTreeSet::new();
    let mut total = 0;
    for worker in workers {
        for ip in worker.await.unwrap() {
            all.insert(ip);
            total += 1;
        }
    }
    assert_eq!(total, 10);
    // No address was handed out twice.
    assert_eq!(all.len(), 10);

    let prefix = ipam.prefix_from("10.0.0.0/24", TENANT).await.unwrap();
    assert_eq!(prefix.usage().acquired_ips, 2 + 10);
}
