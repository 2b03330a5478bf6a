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
use sqlx::PgPool;

/// The prefixes schema, embedded at compile time. Keep this the only
/// `sqlx::migrate!` invocation in the workspace so the migration set is not
/// duplicated into every binary that links the crate.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Bring the prefixes table up to date. Embedders run this once against
/// their pool before handing it to [`PgStorage`](crate::PgStorage);
/// re-running against an up-to-date database is a no-op.
#[tracing::instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
