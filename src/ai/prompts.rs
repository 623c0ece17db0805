//! Prompt templates for the grading service.

/// Build the grading prompt, with or without a correction template.
///
/// The model is asked for prose feedback followed by a single `GRADE:` line
/// that `service::parse_grade` picks out.
pub fn grading_prompt(
    submission_title: &str,
    submission_text: &str,
    correction_template: Option<&str>,
) -> String {
    match correction_template {
        Some(template) => format!(
            "{}\n\nCORRECTION TEMPLATE:\n{}\n\nSUBMISSION TITLE: {}\n\nSTUDENT SUBMISSION:\n{}\n\n{}",
            GRADE_PREAMBLE_WITH_TEMPLATE, template, submission_title, submission_text, GRADE_OUTPUT_RULES
        ),
        None => format!(
            "{}\n\nSUBMISSION TITLE: {}\n\nSTUDENT SUBMISSION:\n{}\n\n{}",
            GRADE_PREAMBLE_SIMPLE, submission_title, submission_text, GRADE_OUTPUT_RULES
        ),
    }
}

const GRADE_PREAMBLE_WITH_TEMPLATE: &str = "\
You are an AI assistant helping grade a student's homework submission.

Below are a correction template with grading criteria and the student's \
submission. Evaluate the submission against each criterion in the template, \
pointing out what was done well and what is missing or incorrect.";

const GRADE_PREAMBLE_SIMPLE: &str = "\
You are an AI assistant helping grade a student's homework submission.

No correction template is available, so evaluate the submission on clarity, \
correctness, and completeness, pointing out what was done well and what is \
missing or incorrect.";

const GRADE_OUTPUT_RULES: &str = "\
Write your feedback as short paragraphs addressed to the student. End your \
response with exactly one final line of the form:

GRADE: <letter or score>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_template_when_given() {
        let with = grading_prompt("Essay", "my text", Some("rubric: thesis 50%"));
        assert!(with.contains("CORRECTION TEMPLATE"));
        assert!(with.contains("rubric: thesis 50%"));
        assert!(with.contains("my text"));

        let without = grading_prompt("Essay", "my text", None);
        assert!(!without.contains("CORRECTION TEMPLATE"));
        assert!(without.contains("GRADE:"));
    }
}
