//! LLM access for Wilson: the client contract, concrete local providers,
//! and the reference-counted model lifecycle manager.
//!
//! Agents never talk to a provider directly — they acquire a
//! [`ModelLease`] for a [`Purpose`] from the [`ModelManager`], which owns
//! instance lifetimes (idle unload, keep-alive pinning, chat fallback).

pub mod client;
pub mod manager;
pub mod providers;
pub mod purpose;
pub mod types;

pub use client::LlmClient;
pub use manager::{ModelLease, ModelManager};
pub use providers::{build_client, OllamaClient, OpenAiClient};
pub use purpose::Purpose;
pub use types::{ChatMessage, ChatRole, GenerateRequest, GenerateResponse};
