use crate::upstream::cache::EmbeddingCache;
use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self { connection })
    }

    pub async fn set_with_expiry<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry_secs: u64,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let mut connection = self.connection.clone();
        connection.set_ex::<_, _, ()>(key, json, expiry_secs).await?;
        Ok(())
    }

    pub async fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        let mut connection = self.connection.clone();
        let result: Option<String> = connection.get(key).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EmbeddingCache for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>> {
        self.get_json(key).await
    }

    async fn put(&self, key: &str, vector: &[f32], ttl: Duration) -> Result<()> {
        // SETEX rejects a zero expiry.
        let secs = ttl.as_secs().max(1);
        self.set_with_expiry(key, vector, secs).await
    }
}
