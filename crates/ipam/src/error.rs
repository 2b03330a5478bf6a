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
use network::PrefixError;

pub type IpamResult<T> = Result<T, IpamError>;

/// Every error the allocation engine and its storage backends produce.
/// Optimistic-lock conflicts are handled internally by the retry wrapper and
/// only surface once its attempts are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum IpamError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no ip available: {0}")]
    NoIpAvailable(String),

    #[error("no child prefix available: {0}")]
    NoChildPrefixAvailable(String),

    #[error("ip in use: {0}")]
    IpInUse(String),

    #[error("optimistic lock conflict: {0}")]
    OptimisticLock(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Prefix(#[from] PrefixError),

    /// Opaque backend failure, surfaced to the caller unmodified.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IpamError {
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Storage(err.into())
    }

    /// Whether a retry-wrapped unit of work should run again.
    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, Self::OptimisticLock(_))
    }
}
