//! LLM provider implementations for Attaché.
//!
//! The production backend is Anthropic's Messages API. Anything that
//! implements `attache_core::Provider` can drive a session — tests use
//! scripted mocks instead of a network client.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
