pub mod auth;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod service;
pub mod storage;
pub mod utils;
