//! # RaybanAI
//!
//! A backend relay for vision analysis. An image reference comes in (remote
//! URL, local file path, or inline base64), a prompt is resolved for the
//! request's category, the pair is forwarded to a vision-capable
//! chat-completions API, and the textual analysis goes back to the caller.
//! Every successful analysis is fanned out to a set of best-effort
//! persistence sinks.
//!
//! ```text
//! ┌─────────┐   ┌───────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │ Request │──▶│ Dedup │──▶│  Prompt  │──▶│ Vision API │──▶│ Fan-out  │
//! │  (HTTP) │   │ gate  │   │ resolver │   │  (remote)  │   │  sinks   │
//! └─────────┘   └───────┘   └──────────┘   └────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Static TOML settings and runtime configuration |
//! | [`models`] | Core data types |
//! | [`dedup`] | Duplicate-request gate with a self-expiring table |
//! | [`prompts`] | Prompt template storage and resolution |
//! | [`store`] | Document-store abstraction (SQLite, in-memory) |
//! | [`vision`] | Outbound vision-model call |
//! | [`history`] | Persistence fan-out |
//! | [`analyze`] | Per-request orchestration |
//! | [`server`] | HTTP API |
//! | [`error`] | Request-level error taxonomy |

pub mod analyze;
pub mod config;
pub mod dedup;
pub mod error;
pub mod history;
pub mod models;
pub mod prompts;
pub mod server;
pub mod store;
pub mod vision;
