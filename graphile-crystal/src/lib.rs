//! Plan-based, batched execution of GraphQL field resolution.
//!
//! Resolvers of a [`spec::Schema`] are wrapped with [`spec::Schema::crystallize`]
//! so that every field bound to a plan resolves through the operation's
//! [`crystal::Aether`]: parents reaching the same plan are batched and the plan
//! runs once per batch.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod configuration;
pub mod crystal;
pub mod error;
pub mod execution;
pub mod graphql;
pub mod json_ext;
pub mod resolver;
pub mod spec;
pub mod telemetry;

pub use configuration::Configuration;
pub use crystal::AetherCache;
pub use error::CrystalError;
pub use execution::execute;
pub use execution::ExecutionRequest;
pub use graphql::Response;
