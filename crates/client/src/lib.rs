//! Client code for gold-offline.
//!
//! This crate provides the network fetch pipeline and the offline caching
//! proxy that sits between controlled pages and the network.

pub mod fetch;
pub mod worker;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Fetcher};
pub use worker::{
    ActivateReport, ControlMessage, InstallReport, LiveEndpoints, OfflineCacheProxy, WorkerConfig, WorkerState,
};
