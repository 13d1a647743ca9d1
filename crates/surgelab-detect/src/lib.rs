//! # Surgelab Detect
//!
//! The streaming onset-detection pipeline. Per symbol, ticks flow through:
//!
//! ```text
//! FeatureEngine -> CpdGate (optional) -> CandidateDetector
//!       |                                      |
//!       +------------> ConfirmDetector <-------+
//!                            |
//!                     RefractoryManager
//! ```
//!
//! The refractory check short-circuits candidate emission; confirmation
//! runs on its own record buffer, decoupled from the refractory check.
//! Cross-symbol state is disjoint: `OnsetEngine` routes ticks to fully
//! independent `SymbolPipeline` instances.

pub mod candidate;
pub mod confirm;
pub mod cpd;
pub mod pipeline;
pub mod refractory;

pub use candidate::{CandidateDetector, CandidateSignal};
pub use confirm::{CandidateDisposition, ConfirmDetector, ConfirmedOnset};
pub use cpd::{ChangePointGate, CpdGate, CusumDetector, PageHinkleyDetector};
pub use pipeline::{IdentityScorer, OnsetEngine, StrengthScorer, SymbolPipeline};
pub use refractory::RefractoryManager;
