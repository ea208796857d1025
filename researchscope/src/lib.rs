// Library interface for researchscope modules
// This allows tests and the binaries to import modules

pub mod aggregator;
pub mod cache;
pub mod enrichment;
pub mod error;
pub mod fetcher;
pub mod index;
pub mod llm;
pub mod memory;
pub mod models;
pub mod scraping;
pub mod search;
pub mod synthesis;
pub mod text;
pub mod topics;

#[cfg(test)]
mod testing;
