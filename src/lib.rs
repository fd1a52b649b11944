//
// lib.rs
// Dicom-Deid-rs
//
// Exposes the crate's modules and re-exports the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Extraction, linkage and their storage boundaries; the CLI sits on top.
pub mod anonymize;
pub mod batch;
pub mod cli;
pub mod codes;
pub mod config;
pub mod dicom_access;
pub mod dicomdir;
pub mod error;
pub mod extract;
pub mod identity;
pub mod image;
pub mod link_table;
pub mod models;
pub mod pipeline;
pub mod plane;
pub mod storage;

pub use cli::{run as run_cli, Cli, Commands};
pub use error::{DeidError, Result};
