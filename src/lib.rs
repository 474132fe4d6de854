pub mod api;
pub mod calendar;
pub mod catalog;
pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod salon;
pub mod wal;

#[cfg(test)]
mod testkit;
