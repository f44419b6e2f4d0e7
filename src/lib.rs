//! Retrieval-augmented document backend: ingestion (notes, file uploads,
//! website crawls), per-user vector storage, and grounded question answering
//! over an HTTP JSON surface.

pub mod core;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod server;
pub mod state;
pub mod store;
