// Library exports for testing and modular access

pub mod api;
pub mod bot;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;

#[cfg(test)]
pub mod testing;
