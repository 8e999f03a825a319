//! Pattern mining, next-action prediction and workflow optimization over
//! recorded steps. None of it mutates a recording.

pub mod optimizer;
pub mod patterns;
pub mod suggestions;

pub use optimizer::{optimize, Optimization, OptimizationResult, Workflow};
pub use patterns::{pattern_key, Pattern, PatternDetector, Prediction};
pub use suggestions::{Suggestion, SuggestionGenerator, SuggestionKind, WorkflowSample};
