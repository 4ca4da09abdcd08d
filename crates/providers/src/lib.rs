//! Provider gateways for Forgeline.
//!
//! All gateways implement the `forgeline_core::ProviderGateway` trait.
//! The router maps provider ids to gateways; the fallback chain decides
//! which provider and budget each attempt uses.

pub mod fallback;
pub mod openai_compat;
pub mod router;

pub use fallback::{
    AttemptKind, ChainFailure, ChainSuccess, ErrorClass, FallbackChain, Strategy,
    classify_provider_error,
};
pub use openai_compat::{OpenAiCompatGateway, classify_http_failure};
pub use router::{GatewayRouter, build_chain, build_from_config};
