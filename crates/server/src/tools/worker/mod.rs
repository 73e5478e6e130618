//! Worker lifecycle tools.

pub mod activate;
pub mod fetch;
pub mod install;
pub mod message;

pub use activate::activate_impl;
pub use fetch::{WorkerFetchParams, fetch_impl};
pub use install::install_impl;
pub use message::{WorkerMessageParams, message_impl};
