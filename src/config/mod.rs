// src/config/mod.rs
pub mod worker;

pub use worker::WorkerConfig;
