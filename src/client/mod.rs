//! Inference endpoint client module.

mod llm_client;
mod rate_limiter;

#[cfg(test)]
pub(crate) mod testing;

pub use llm_client::*;
pub use rate_limiter::*;
