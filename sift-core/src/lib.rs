//! Sift core library: paper ingestion, relevance triage, summarization, and store.
//!
//! The main entry point is [`pipeline::SiftPipeline`], which runs the
//! triage → summarize → persist pipeline over a [`store::PaperStore`].
//! Candidates enter the store through [`ingest::ingest`].

pub mod config;
pub mod error;
pub mod feed;
mod http;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod summarize;
pub mod triage;
pub mod types;
