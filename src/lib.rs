//! meteocache library
//!
//! A weather client core for Open-Meteo: a SQLite forecast cache and the
//! synchronization repository that decides when to serve it and when to
//! refetch. Exposed as a library for the binary and integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod sync;
