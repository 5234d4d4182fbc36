//! quarry safeguard
//!
//! Advisory safety checks: named prose policies evaluated by a classifier
//! LLM with schema-constrained output. Callers fail open on checker errors;
//! availability wins over enforcement for an advisory filter.

pub mod checker;
pub mod policy;

pub use checker::{ItemVerdict, LlmSafeguardChecker, SafeguardChecker, Verdict};
pub use policy::{Policy, PII_LEAKAGE, PROMPT_INJECTION};
