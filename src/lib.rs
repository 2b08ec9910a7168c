// lib.rs
pub mod alignment_record;
pub mod analyses;
pub mod bam;
pub mod cigar;
pub mod commands;
pub mod config;
pub mod coverage;
pub mod error;
pub mod faidx;
pub mod mapping;
pub mod progress;
pub mod reconstruct;
pub mod request;
pub mod source;
pub mod store;
pub mod threads;

pub use error::{Error, Result};
