// Shared prompt fragments and template helpers.
// Each pipeline defines its own templates in pipelines/prompts.rs;
// this file holds what is common to all of them.

/// Appended to every system prompt that answers from retrieved context.
pub const GROUNDING_INSTRUCTION: &str = "\
    Answer ONLY from the provided context. If the context does not contain the answer, \
    say so plainly instead of guessing. Never invent employers, dates, titles, or metrics.";

/// Tone instruction shared by all candidate-facing prompts.
pub const PROFESSIONAL_TONE: &str = "\
    Keep a professional, concise tone suitable for a recruiter or hiring manager.";

/// Fills `{candidate_name}` in a template.
pub fn with_candidate(template: &str, candidate_name: &str) -> String {
    template.replace("{candidate_name}", candidate_name)
}
