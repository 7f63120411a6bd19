//! # Master Testing Utils
//!
//! Shared testing utilities for the master dispatch core.
//! This crate provides transport and reply-handler doubles, test data builders
//! and registry setup helpers that can be used across the workspace.
//!
//! ## Features
//!
//! - **Mock Transports**: recording and failing slave transports
//! - **Mock Reply Handlers**: capture routed replies per role
//! - **Test Data Builders**: tasks and wire-format reports
//! - **Registry Helpers**: registries with a manual clock and pre-connected slaves
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! master-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! Then use the helpers in your tests:
//!
//! ```rust
//! use master_testing_utils::mocks::*;
//! use master_testing_utils::helpers::TestRegistry;
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
