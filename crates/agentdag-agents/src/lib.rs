//! Built-in work units and the helpers they share.
//!
//! `with_builtins` returns an `AgentRegistry` holding every built-in kind:
//! the crypto mocks, `template`/`static` text agents, the OpenWeather and
//! Google Places lookups, and the `openAICall` chat agent.

pub mod builtin;
pub mod http;
pub mod registry;
pub mod template;

pub use registry::{register_builtins, with_builtins};
