pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod models;
pub mod rates;
pub mod redis;
pub mod storage;
pub mod timeutil;
