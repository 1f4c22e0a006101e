//! Adaptive, safety-guarded form discovery.
//!
//! Leaf-first: `guardrail` and `normalize` are pure; `scan` reads raw HTML;
//! `probe` and `walker` drive a page; `prerequisites` iterates a provider's
//! gates; `orchestrator` sequences the whole run.

pub mod guardrail;
pub mod heuristics;
pub mod normalize;
pub mod orchestrator;
pub mod prerequisites;
pub mod probe;
pub mod scan;
pub mod types;
pub mod walker;
