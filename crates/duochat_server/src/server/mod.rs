#![forbid(unsafe_code)]

pub mod adapter_manager;
pub mod connection;
pub mod health;

#[cfg(test)]
mod adapter_manager_tests;
