//! Message types for the supported chat protocols.
//!
//! The OpenAI Chat Completions format is the interchange format: every
//! inbound protocol converts into it and every outbound protocol is
//! reconstructed from it.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod responses;
