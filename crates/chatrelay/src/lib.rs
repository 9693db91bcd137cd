//! Chatrelay - streaming relay between chat clients and an LLM completion API
//!
//! The relay accepts a conversation over HTTP, prepends a fixed system
//! instruction, calls an OpenAI-compatible upstream and streams the reply
//! fragments back as they arrive. The document store and credential
//! provider modules hold the shared pieces the chat client builds on.

pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod prompts;
pub mod relay;
pub mod store;
pub mod testing;
pub mod upstream;

pub use error::ChatRelayError;
