mod prompt;

pub use prompt::{
    validate_slug, CandidateOrigin, FieldOverrides, PromptPatch, PromptSummary, PromptVersion,
    CANDIDATE_SUFFIX,
};
