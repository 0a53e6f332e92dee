//! # Docent Core
//!
//! Pipeline logic for Docent, a grounded question-answering service over a
//! private PDF corpus: chunking, the evidence gate, citations, query
//! rewriting, search orchestration, ingestion and the answer pipeline.
//!
//! Every external system (document storage, PDF extraction, embedding and
//! chat models, the search engine) is reached through a trait defined here.
//! The `docent` app crate provides the HTTP and filesystem implementations;
//! this crate has no network or filesystem dependencies.

pub mod chunk;
pub mod citation;
pub mod embedding;
pub mod gate;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod rewrite;
pub mod search;
pub mod storage;
