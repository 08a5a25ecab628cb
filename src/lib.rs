// ABOUTME: Library module for seminars-export
// ABOUTME: Exports the masking, sanitizing, and dumping pipeline for the binary and tests

pub mod commands;
pub mod config;
pub mod export;
pub mod filters;
pub mod masking;
pub mod postgres;
pub mod source;
pub mod sqlite;
pub mod utils;
