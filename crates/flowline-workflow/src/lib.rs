//! Flowline Workflow
//!
//! This crate provides the "locked" workflow representation for flowline.
//! A locked workflow is a validated form of a workflow definition that is
//! ready for evaluation.
//!
//! Key differences from `flowline-config`:
//! - Edges reference existing nodes and are de-duplicated
//! - The graph is acyclic, and a topological order is precomputed
//! - Every transform's required upstream edges exist
//! - Combine field lists are well formed

mod error;
mod graph;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use workflow::Workflow;
