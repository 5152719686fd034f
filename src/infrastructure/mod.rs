pub mod config;
pub mod credential_store;
pub mod day_store;
pub mod error;
pub mod storage;
pub mod text_client;
