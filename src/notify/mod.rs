//! Password-expiry notifications: periodic scan plus a bounded worker pool.

mod store;
mod worker;

pub use store::{NotifyStore, PgNotifyStore};
pub use worker::{PassExpiryWorker, RunOutcome};
