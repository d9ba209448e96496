//! Mail Prompt Core
//!
//! Foundational types shared by the Mail Prompt workspace. This crate has no
//! dependency on HTTP clients, async runtimes or host integration code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `UiError`, `CoreResult`)
//! - `placeholders` - `{%name%}` template substitution
//! - `prompts` - Prompt templates, built-in defaults and the popup launcher filters
//! - `streaming` - Unified stream event types and the line adapter trait

pub mod error;
pub mod placeholders;
pub mod prompts;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult, UiError};

// ── Placeholders ───────────────────────────────────────────────────────
pub use placeholders::{
    find_placeholders, has_placeholder, replace_placeholders, SubstitutionMap,
};

// ── Prompt Templates ───────────────────────────────────────────────────
pub use prompts::{
    default_prompts, filter_prompts_for_tab, merge_prompts, search_prompts, PromptAction,
    PromptMatch, PromptTemplate, PromptType, TabKind,
};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
