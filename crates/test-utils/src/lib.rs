//! Synthetic fixtures for crate test suites: `.om` files built with
//! [`om_format::writer::OmFileBuilder`] and a `wiremock`-backed object
//! store that serves manifest JSON, S3-style bucket listings, and `.om`
//! byte ranges without a real network.

pub mod manifest;
pub mod object_store;
pub mod om;
