//! Test harness for assembly constraint solving.
//!
//! Provides programmatic tools for scripting assemblies, solving them
//! through the real entry point, verifying the result independently and
//! generating diagnostic output.
//!
//! # Key Components
//!
//! - [`AssemblyBuilder`]: Fluent API for building and solving assemblies
//! - [`oracle`]: Verification functions returning pass/fail verdicts
//! - [`report`]: Structured text assembly descriptions
//! - [`helpers`]: Part builders, JSON fixtures, tracing setup
//! - [`assertions`]: Rich assertion helpers with diagnostics

pub mod assertions;
pub mod helpers;
pub mod oracle;
pub mod report;
pub mod workflow;

pub use helpers::{init_tracing, HarnessError};
pub use oracle::OracleVerdict;
pub use report::AssemblyReport;
pub use workflow::AssemblyBuilder;
