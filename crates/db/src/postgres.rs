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
use ipam::storage::Storage;
use ipam::{IpamError, IpamResult};
use ipnetwork::IpNetwork;
use model::Prefix;
use network::IpPrefix;
use sqlx::PgPool;

use crate::DatabaseError;

/// Postgres-backed prefix store. The record is persisted as a
/// self-describing jsonb payload; only the cidr and tenant are real
/// columns, the version fence reads the payload.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn read(&self, cidr: &IpPrefix, tenant: &str) -> Result<Option<Prefix>, DatabaseError> {
        let query = "SELECT prefix FROM prefixes WHERE cidr=$1::cidr AND tenant_id=$2";
        let payload: Option<serde_json::Value> = sqlx::query_scalar(query)
            .bind(IpNetwork::from(*cidr))
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;
        payload
            .map(|payload| serde_json::from_value(payload).map_err(DatabaseError::from))
            .transpose()
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn create_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix> {
        let mut prefix = prefix;
        prefix.version = 0;
        let payload = serde_json::to_value(&prefix).map_err(DatabaseError::from)?;

        let query = "INSERT INTO prefixes (cidr, tenant_id, prefix)
            VALUES ($1::cidr, $2, $3::jsonb)
            ON CONFLICT (cidr, tenant_id) DO NOTHING";
        let result = sqlx::query(query)
            .bind(IpNetwork::from(prefix.cidr))
            .bind(tenant)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;
        if result.rows_affected() > 0 {
            return Ok(prefix);
        }

        // Lost against an existing record, creation is idempotent.
        match self.read(&prefix.cidr, tenant).await? {
            Some(existing) => Ok(existing),
            None => Err(IpamError::NotFound(format!(
                "prefix {} vanished while creating it",
                prefix.cidr
            ))),
        }
    }

    async fn read_prefix(&self, cidr: &IpPrefix, tenant: &str) -> IpamResult<Prefix> {
        self.read(cidr, tenant)
            .await?
            .ok_or_else(|| IpamError::NotFound(format!("unable to find prefix for cidr:{cidr}")))
    }

    async fn read_all_prefixes(&self, tenant: &str) -> IpamResult<Vec<Prefix>> {
        let query = "SELECT prefix FROM prefixes WHERE tenant_id=$1";
        let payloads: Vec<serde_json::Value> = sqlx::query_scalar(query)
            .bind(tenant)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::query(query, e))
            .map_err(IpamError::from)?;

        payloads
            .into_iter()
            .map(|payload| {
                serde_json::from_value(payload)
                    .map_err(DatabaseError::from)
                    .map_err(IpamError::from)
            })
            .collect()
    }

    async fn update_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix> {
        let old_version = prefix.version;
        let mut updated = prefix;
        updated.version += 1;
        let payload = serde_json::to_value(&updated).map_err(DatabaseError::from)?;
        let cidr = IpNetwork::from(updated.cidr);

        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| IpamError::from(DatabaseError::query("BEGIN", e)))?;

        // Lock the row behind the version fence; zero rows means a
        // concurrent writer got there first.
        let query = "SELECT prefix FROM prefixes
            WHERE cidr=$1::cidr AND tenant_id=$2 AND (prefix->>'version')::bigint=$3
            FOR UPDATE";
        let locked: Option<serde_json::Value> = sqlx::query_scalar(query)
            .bind(cidr)
            .bind(tenant)
            .bind(old_version as i64)
            .fetch_optional(&mut *txn)
            .await
            .map_err(|e| IpamError::from(DatabaseError::query(query, e)))?;
        if locked.is_none() {
            return Err(DatabaseError::OptimisticLock(format!(
                "select for update of prefix {} at version {old_version} did not match any row",
                updated.cidr
            ))
            .into());
        }

        let query = "UPDATE prefixes SET prefix=$1::jsonb
            WHERE cidr=$2::cidr AND tenant_id=$3 AND (prefix->>'version')::bigint=$4";
        let result = sqlx::query(query)
            .bind(payload)
            .bind(cidr)
            .bind(tenant)
            .bind(old_version as i64)
            .execute(&mut *txn)
            .await
            .map_err(|e| IpamError::from(DatabaseError::query(query, e)))?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::OptimisticLock(format!(
                "update of prefix {} at version {old_version} did not match any row",
                updated.cidr
            ))
            .into());
        }

        txn.commit()
            .await
            .map_err(|e| IpamError::from(DatabaseError::query("COMMIT", e)))?;
        Ok(updated)
    }

    async fn delete_prefix(&self, prefix: Prefix, tenant: &str) -> IpamResult<Prefix> {
        let query = "DELETE FROM prefixes WHERE cidr=$1::cidr AND tenant_id=$2";
        sqlx::query(query)
            .bind(IpNetwork::from(prefix.cidr))
            .bind(tenant)
            .execute(&self.pool)
            .await
            .map_err(|e| IpamError::from(DatabaseError::query(query, e)))?;
        Ok(prefix)
    }
}
