//! AWS S3 bucket provider
//!
//! Provisions the bucket behind an `s3` remote state backend: creation with
//! encryption and public access blocking, versioning, and bucket tags.

pub mod client;
pub mod config;

pub use client::S3Provider;
pub use config::{S3, S3_ONLY_KEYS, S3Backend, S3Provisioning};
