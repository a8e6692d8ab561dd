// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Redis Connection
//!
//! Wraps a reconnecting `redis::aio::ConnectionManager` in a thin
//! `RedisConnection` newtype that is injected into every Redis backend, along
//! with the operation timeout and key prefix they share.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::future::Future;
use std::time::Duration;

use crate::domain::repository::RedisConfig;

#[derive(Clone)]
pub struct RedisConnection {
    client: redis::Client,
    manager: ConnectionManager,
    timeout: Duration,
    key_prefix: String,
}

impl RedisConnection {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .with_context(|| format!("Invalid Redis URL '{}'", config.url))?;

        let manager = tokio::time::timeout(config.operation_timeout, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out connecting to Redis at {}", config.url))?
            .with_context(|| format!("Failed to connect to Redis at {}", config.url))?;

        Ok(Self {
            client,
            manager,
            timeout: config.operation_timeout,
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    /// A cheap clone of the shared multiplexed connection.
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Run one round-trip under the operation timeout. The outer error is the
    /// elapsed bound.
    pub async fn bounded<T>(
        &self,
        call: impl Future<Output = RedisResult<T>>,
    ) -> Result<RedisResult<T>, Duration> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| self.timeout)
    }
}
