//! Redis-backed implementation of the store seam.
//!
//! Shared commands (SET/GET/RPUSH/PUBLISH) multiplex one connection behind a
//! mutex; each worker gets its own connection for BLPOP so a blocked pop
//! holds no shared lock.

use std::sync::Mutex;
use std::time::Duration;

use crate::store::{EngineStore, QueueConsumer, StoreError};

pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<redis::Connection>,
}

impl RedisStore {
    pub fn new(host: &str, port: u16, password: &str) -> Result<Self, StoreError> {
        let url = if password.is_empty() {
            format!("redis://{}:{}/", host, port)
        } else {
            format!("redis://:{}@{}:{}/", password, host, port)
        };
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        Ok(Self { client, conn: Mutex::new(conn) })
    }
}

impl EngineStore for RedisStore {
    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let _: String = redis::cmd("PING").query(&mut conn)?;
        Ok(())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        redis::cmd("SET").arg(key).arg(value).query::<()>(&mut conn)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let value: Option<String> = redis::cmd("GET").arg(key).query(&mut conn)?;
        Ok(value)
    }

    fn rpush(&self, queue: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        redis::cmd("RPUSH").arg(queue).arg(value).query::<()>(&mut conn)?;
        Ok(())
    }

    fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        redis::cmd("PUBLISH").arg(channel).arg(message).query::<()>(&mut conn)?;
        Ok(())
    }

    fn queue_consumer(&self) -> Result<Box<dyn QueueConsumer>, StoreError> {
        let conn = self.client.get_connection()?;
        Ok(Box::new(RedisQueueConsumer { conn }))
    }
}

struct RedisQueueConsumer {
    conn: redis::Connection,
}

impl QueueConsumer for RedisQueueConsumer {
    fn pop(&mut self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        // BLPOP returns (key, value) or nil on timeout.
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(timeout.as_secs().max(1))
            .query(&mut self.conn)?;
        Ok(reply.map(|(_, value)| value))
    }
}
