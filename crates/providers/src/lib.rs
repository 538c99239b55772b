//! LLM provider implementations for Conclave.
//!
//! All providers implement the `conclave_core::Provider` trait.
//! The router resolves agent model parameters to a provider.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config, build_with_env};
