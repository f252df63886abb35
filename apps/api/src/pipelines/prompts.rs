// Prompt constants for the three pipelines.
// Cross-cutting fragments live in llm_client::prompts.

use super::summary::SummaryStyle;

/// Chat system prompt. Replace `{candidate_name}` and `{context}` before sending.
pub const CHAT_SYSTEM_TEMPLATE: &str = "\
You are an assistant answering recruiters' questions about {candidate_name}'s \
professional background, skills and experience. Speak about {candidate_name} in \
the third person.

Use the following retrieved context to answer the question:
{context}";

/// Appended after the history and latest input when rewriting a follow-up
/// question into a standalone search query.
pub const CONTEXTUALIZE_INSTRUCTION: &str =
    "given the above conversation, generate a search query to lookup content important for the conversation.";

/// Summary prompt. Replace `{candidate_name}`, `{style_instruction}` and
/// `{context}` before sending.
pub const SUMMARY_TEMPLATE: &str = "\
Write a professional summary of {candidate_name} for a recruiter, based only on \
the documents below.

{style_instruction}

Documents:
{context}";

pub fn summary_style_instruction(style: SummaryStyle) -> &'static str {
    match style {
        SummaryStyle::Bullet => {
            "Format: 5 to 8 concise markdown bullet points covering role, core skills, \
             notable achievements and domain expertise."
        }
        SummaryStyle::Paragraph => {
            "Format: two or three well-structured paragraphs in flowing prose."
        }
        SummaryStyle::Executive => {
            "Format: a short executive brief. One headline sentence, then three \
             bullets on business impact, then one sentence on fit for senior roles."
        }
    }
}

/// Job-match system prompt.
pub const JOB_MATCH_SYSTEM: &str = "\
You are an experienced technical recruiter assessing how well a candidate fits \
a job description. Be specific and evidence-based.";

/// Job-match analysis prompt. Replace `{candidate_name}` and `{context}`.
pub const JOB_MATCH_TEMPLATE: &str = "\
Compare the job description with {candidate_name}'s background in the context \
below. Respond in markdown with these sections:

## Overall Fit
A fit rating (Strong / Moderate / Weak) and one-sentence justification.

## Matching Qualifications
Requirements {candidate_name} clearly meets, citing the evidence.

## Gaps
Requirements not evidenced in the context.

## Recommendation
Two or three sentences for the hiring manager.

Context:
{context}";

/// Fills a template's `{context}` placeholder.
pub fn with_context(template: &str, context: &str) -> String {
    template.replace("{context}", context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::prompts::with_candidate;

    #[test]
    fn test_chat_template_fully_substituted() {
        let prompt = with_context(
            &with_candidate(CHAT_SYSTEM_TEMPLATE, "Ada"),
            "Led the payments team.",
        );
        assert!(prompt.contains("Ada's professional background"));
        assert!(prompt.ends_with("Led the payments team."));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_each_style_has_distinct_instruction() {
        let bullet = summary_style_instruction(SummaryStyle::Bullet);
        let paragraph = summary_style_instruction(SummaryStyle::Paragraph);
        let executive = summary_style_instruction(SummaryStyle::Executive);
        assert_ne!(bullet, paragraph);
        assert_ne!(paragraph, executive);
    }
}
