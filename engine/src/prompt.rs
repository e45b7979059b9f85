//! System and task prompts for an extraction run.

use std::fmt::Write as _;

use crate::evidence::SourceRef;
use crate::few_shot::ExampleSnapshot;
use crate::profile::SourceProfile;
use crate::source::SourceDocument;

/// Placeholder that replaces the source text once it has been sent.
pub const COMPACTED_SOURCE: &str = "[Source text provided in the first turn. Use \
verify_information_present to re-check facts against it.]";

const WORKFLOW: &str = r"MANDATORY WORKFLOW:
1. Read the source and draft the record. Extract ONLY explicitly stated information.
2. For every rare field, call 'verify_information_present' before setting it. If nothing is found, leave the field absent. Never guess.
3. Call 'validate_dates' with the dates you found.
4. Call 'submit_biography' once with the final record.
5. If the submission is rejected, fix every reported error and submit again.

RULES:
- Dates use YYYY or YYYY-MM-DD.
- Absent means unknown: omit the field rather than writing null or a placeholder.
- List promotions in the order the source gives them.
- The task is NOT complete until 'submit_biography' accepts the record.";

/// Builds the system prompt from the profile and the run's examples.
#[must_use]
pub fn system_prompt(profile: &SourceProfile, examples: &ExampleSnapshot) -> String {
    let mut prompt = format!(
        "You extract structured biographies of PLA officers from {}.\n\n{WORKFLOW}\n\n",
        profile.source_description
    );

    let _ = writeln!(prompt, "Rare fields (verify first): {}", profile.rare_fields.join(", "));
    let _ = writeln!(prompt, "Common fields: {}\n", profile.common_fields.join(", "));

    prompt.push_str("Field expectations:\n");
    for (field, expectation) in profile.field_expectations {
        let _ = writeln!(prompt, "- {field}: {expectation}");
    }
    prompt.push('\n');

    prompt.push_str("Suggested search terms:\n");
    for (field, terms) in profile.field_search_terms {
        let _ = writeln!(prompt, "- {field}: {}", terms.join(", "));
    }
    prompt.push('\n');

    prompt.push_str(profile.extraction_context);
    prompt.push_str("\n\nConfidence: 0.9-1.0 most expected fields present and dates validated; \
                     0.7-0.8 common fields present with minor gaps; 0.5-0.6 limited information.");

    if !examples.is_empty() {
        prompt.push_str("\n\nExamples of accepted records:\n");
        for example in examples.examples() {
            let rendered = serde_json::to_string(example).unwrap_or_default();
            let _ = writeln!(prompt, "<example>\n{rendered}\n</example>");
        }
    }

    prompt
}

/// Builds the first user turn carrying the source text.
#[must_use]
pub fn task_prompt(
    source: &SourceDocument,
    source_ref: &SourceRef,
    profile: &SourceProfile,
) -> String {
    format!(
        r"<context>
Source URL: {url}
Source reference: {source_ref}

{text}
</context>

<task>
Extract the biography of the officer described in this {kind}.
</task>

<output_format>
Use ONLY the tools. The final record MUST be submitted via 'submit_biography'.
</output_format>",
        url = source.source_url,
        text = source.text,
        kind = profile.display_name.to_lowercase(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::few_shot::ExampleLibrary;
    use crate::record::Biography;

    #[test]
    fn test_task_prompt_carries_source() {
        let source = SourceDocument::new("https://www.news.cn/a.html", "林炳尧同志，1943年出生。");
        let prompt = task_prompt(&source, &SourceRef::from("src_1"), &SourceProfile::universal());
        assert!(prompt.contains("<context>\nSource URL: https://www.news.cn/a.html"));
        assert!(prompt.contains("Source reference: src_1"));
        assert!(prompt.contains("1943年出生"));
    }

    #[tokio::test]
    async fn test_system_prompt_includes_examples() {
        let profile = SourceProfile::universal();
        let bare = system_prompt(&profile, &ExampleSnapshot::empty());
        assert!(bare.contains("spouse_name: 妻子"));
        assert!(!bare.contains("<example>"));

        let library = ExampleLibrary::with_records([Biography::example()]);
        let with_examples = system_prompt(&profile, &library.snapshot(2).await);
        assert!(with_examples.contains("<example>"));
    }
}
