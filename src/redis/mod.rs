pub mod redis_client;

pub use redis_client::{RedisClient, RedisStatusPublisher, STATUS_KEY, StatusPublisher};
