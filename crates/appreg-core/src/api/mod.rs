//! Platform REST API.

mod account;
mod apps;
mod client;

pub use account::{Organization, User};
pub use apps::{
    BuildParams, FinishParams, FinishResponse, KeystoreParams, RegisterAppParams,
    RegisterSshKeyParams,
};
pub use client::{ApiError, Client, RetryPolicy};
