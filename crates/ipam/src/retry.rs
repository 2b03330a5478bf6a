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
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::IpamResult;

const MAX_ATTEMPTS: u32 = 10;
const MEAN_DELAY: Duration = Duration::from_millis(100);

/// Re-run `op` while it fails with an optimistic-lock conflict, up to ten
/// attempts with a jittered delay in between. Exhaustion surfaces the error
/// of the last attempt; every other error returns immediately. This is the
/// only place the engine sleeps.
pub async fn retry_on_optimistic_lock<T, F, Fut>(mut op: F) -> IpamResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = IpamResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_optimistic_lock() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, "optimistic lock conflict, retrying");
                tokio::time::sleep(jitter(MEAN_DELAY)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Vary `mean` by a uniform factor in [0.5, 1.5), so concurrent writers that
/// collided once do not collide again in lockstep.
fn jitter(mean: Duration) -> Duration {
    const SPREAD: f64 = 0.5;
    let unit: f64 = rand::rng().random();
    mean.mul_f64(1.0 + SPREAD * (2.0 * unit - 1.0))
}
