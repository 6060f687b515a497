//! Fuzz Driver LLM Transports
//!
//! Implementations of [`fuzz_driver_core::TextGenerator`]:
//! - [`openai`]: OpenAI-compatible chat-completions over HTTP
//! - [`command`]: a local command fed the prompt on stdin

pub mod command;
pub mod openai;

pub use command::CommandGenerator;
pub use openai::OpenAiClient;
