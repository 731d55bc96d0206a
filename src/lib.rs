//! # Onboard Harness
//!
//! A retrieval-augmented onboarding assistant for developer knowledge bases.
//!
//! Onboard Harness loads a folder of Markdown documents, splits them into
//! overlapping chunks, embeds them into an in-memory vector index, and lets
//! a chat model answer questions by calling a `retrieve_context` tool over
//! that index.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Loader    │──▶│   Chunker   │──▶│ Vector index │
//! │ knowledge/  │   │ size+overlap│   │  (lazy, RAM) │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ retrieve_context
//!                                            ▼
//!                  ┌──────────┐       ┌──────────────┐
//!                  │   CLI    │◀─────▶│ Conversation │◀──▶ chat model
//!                  │(onboard) │       │     loop     │
//!                  └──────────┘       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! onboard sources                     # list loaded documents
//! onboard index                       # build the vector index
//! onboard search "how do I run tests"
//! onboard ask "How do I set up my environment?"
//! onboard chat                        # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Knowledge base discovery |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retrieval`] | Lazy vector index and top-k search |
//! | [`tools`] | Tool trait, registry and `retrieve_context` |
//! | [`llm`] | Chat completion service |
//! | [`trim`] | History trimming to a token budget |
//! | [`conversation`] | Per-thread conversation loop |
//! | [`app`] | Wiring from config to a running agent |

pub mod app;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod loader;
pub mod models;
pub mod retrieval;
pub mod search;
pub mod sources;
pub mod tools;
pub mod trim;
