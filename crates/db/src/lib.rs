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
pub mod migrations;
pub mod postgres;

pub use migrations::migrate;
pub use postgres::PgStorage;

use ipam::IpamError;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The version fence of an update matched no row. Mapped onto the
    /// engine's optimistic-lock kind so the retry wrapper picks it up.
    #[error("optimistic lock error: {0}")]
    OptimisticLock(String),

    #[error("database query error: `{query}`: {source}")]
    Query { query: String, source: sqlx::Error },

    #[error("unable to serialize prefix payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl DatabaseError {
    pub fn query(query: &str, source: sqlx::Error) -> Self {
        Self::Query {
            query: query.to_string(),
            source,
        }
    }
}

impl From<DatabaseError> for IpamError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::OptimisticLock(message) => IpamError::OptimisticLock(message),
            other => IpamError::storage(other),
        }
    }
}
