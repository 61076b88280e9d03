//! bincache-lib: binary caching for native project builds
//!
//! This crate provides the pieces a cache run is made of:
//! - `graph`: build units, precompiled artifacts and the edges between them
//! - `metadata`: architecture, linking and UUID probing of precompiled binaries
//! - `hash`: content fingerprints of build units
//! - `storage`: local and remote cache backends, and the chain combining them
//! - `mapper`: graph transformations run around hashing and building
//! - `cache`: the warming run that hashes, diffs, builds and stores

pub mod cache;
pub mod config;
pub mod consts;
pub mod graph;
pub mod hash;
pub mod mapper;
pub mod metadata;
pub mod platform;
pub mod project;
pub mod storage;
