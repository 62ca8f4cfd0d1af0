pub mod api;
pub mod config;
pub mod data_models;
pub mod db;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod pipeline;
pub mod search_source;
pub mod summarizer;
