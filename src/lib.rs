//! # Docent
//!
//! Grounded question answering over a corpus of PDFs, with page-level
//! citations.
//!
//! The pipeline itself lives in the `docent-core` crate and works only
//! against traits. This crate supplies the adapters (OpenAI-compatible
//! models, a REST search service, S3 or local storage, PDF extraction),
//! the HTTP API and the `docent` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌──────────────┐
//! │   Storage    │──▶│ Extract+Chunk+Embed│──▶│ Search index │
//! │   S3 / FS    │   │   (IngestRunner)   │   │ REST / memory│
//! └──────────────┘   └───────────────────┘   └──────┬───────┘
//!                                                    │
//!        question ──▶ rewrite ─▶ embed ─▶ search ◀───┘
//!                                  │
//!                                gate ─▶ generate ─▶ cite
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`app`] | Composition root |
//! | [`openai`] | Embedding and chat clients |
//! | [`search_rest`] | Azure AI Search compatible backend |
//! | [`storage_s3`] | S3 document store with presigned links |
//! | [`storage_fs`] | Local document store with signed links |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`server`] | HTTP API |

pub mod app;
pub mod config;
pub mod extract;
pub mod logging;
pub mod openai;
pub mod search_rest;
pub mod server;
pub mod storage_fs;
pub mod storage_s3;
