use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use anyhow::Result;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Channel carrying one JSON `BatchProgress` message per destination started.
pub const PROGRESS_CHANNEL: &str = "trip:batch:progress";

/// Finished batch runs are cached for a day.
pub const RUN_TTL_SECS: u64 = 24 * 60 * 60;

pub fn batch_key(run_id: Uuid) -> String {
    format!("trip:batch:{run_id}")
}

#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_tokio_connection_manager().await?;
        Ok(Self { connection })
    }

    pub async fn publish<T: Serialize>(&mut self, channel: &str, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.connection.publish::<_, _, ()>(channel, json).await?;
        Ok(())
    }

    pub async fn set_with_expiry<T: Serialize>(
        &mut self,
        key: &str,
        value: &T,
        expiry_secs: u64,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.connection.set_ex::<_, _, ()>(key, json, expiry_secs).await?;
        Ok(())
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&mut self, key: &str) -> Result<Option<T>> {
        let result: Option<String> = self.connection.get(key).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
