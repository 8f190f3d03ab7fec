pub mod apps;
pub mod chunking;
pub mod client;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod faces;
pub mod generation;
pub mod index;
pub mod rag;
pub mod retrieval;
pub mod session;
pub mod signing;
