//! # class-index
//!
//! Indexes the classes inside a local Maven repository and answers ranked
//! searches over class names, packages and member signatures.
//!
//! ## Architecture
//!
//! - **descriptor**: JVM type and method descriptor decoding
//! - **classfile**: structural class-file parsing (names, methods, fields)
//! - **store**: LMDB-backed index with per-archive replacement and cascading deletes
//! - **scanner**: incremental repository walk driven by jar modification times
//! - **search**: candidate gathering, scoring and class lookups
//! - **config**: flag, environment and default resolution
//! - **model**: result types shared by the store, engine and CLI

pub mod classfile;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod model;
pub mod scanner;
pub mod search;
pub mod store;

#[cfg(test)]
mod testing;
