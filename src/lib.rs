//! # Auto-Engineer
//!
//! An automated, sandboxed code-improvement pipeline.
//!
//! Auto-Engineer retrieves relevant context documents, generates a candidate
//! patch for a target file, validates the project in an isolated sandbox,
//! checkpoints the working tree under git, conditionally applies and commits
//! the patch, and records outcome metrics.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐
//! │ Retrieval │──▶│ Suggest  │──▶│ Sandbox  │──▶│ Checkpoint │
//! │  (index)  │   │ (chain)  │   │ (verify) │   │  + apply   │
//! └───────────┘   └──────────┘   └──────────┘   └─────┬──────┘
//!                                                     ▼
//!                                               ┌──────────┐
//!                                               │ Metrics  │
//!                                               └──────────┘
//! ```
//!
//! A patch that fails sandbox validation is never committed; a patch whose
//! write fails after checkpointing is rolled back to the checkpoint.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Document corpus storage |
//! | [`index`] | Deterministic embeddings and retrieval |
//! | [`suggest`] | Patch suggestion strategies |
//! | [`sandbox`] | Isolated, timeout-bounded command execution |
//! | [`git_ops`] | Version-control checkpointing |
//! | [`metrics`] | Append-only run and patch records |
//! | [`cycle`] | The improvement-cycle orchestrator |
//! | [`analyze`] | Whole-project heuristic analysis |

pub mod analyze;
pub mod config;
pub mod cycle;
pub mod git_ops;
pub mod index;
pub mod metrics;
pub mod models;
pub mod sandbox;
pub mod store;
pub mod suggest;
