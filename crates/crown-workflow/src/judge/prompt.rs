//! Judge prompts.
//!
//! Prompts depend only on their inputs so a retried evaluation asks the
//! judge exactly the same question.

use std::fmt::Write;

use crate::candidates::Candidate;

const TRUNCATED: &str = "\n... [truncated]";

/// Keep at most `max_chars` characters of `text`, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATED}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Prompt asking the judge to pick the best candidate.
pub fn evaluation_prompt(
    task_description: &str,
    candidates: &[Candidate],
    diff_chars: usize,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are evaluating code implementations from different AI coding agents \
         that worked on the same task."
    );
    let _ = writeln!(prompt, "\nTask:\n{}", task_description.trim());
    let _ = writeln!(prompt, "\nCandidates:");

    for candidate in candidates {
        let _ = writeln!(
            prompt,
            "\n--- Candidate {} ({}) ---\n{}",
            candidate.index,
            candidate.agent_name,
            truncate_chars(&candidate.diff, diff_chars)
        );
    }

    let _ = write!(
        prompt,
        "\nPick the implementation that best completes the task. Consider \
         correctness, completeness, code quality and test coverage.\n\
         Respond with JSON only, in exactly this shape:\n\
         {{\"winner\": <candidate index, 0 to {}>, \"reason\": \"<one or two sentences>\"}}\n",
        candidates.len().saturating_sub(1)
    );
    prompt
}

/// Prompt asking for a short summary of the winning change.
pub fn summary_prompt(task_description: &str, diff: &str, diff_chars: usize) -> String {
    format!(
        "Summarize the following code change for a pull request description.\n\
         Use a few short bullet points and do not repeat the diff.\n\n\
         Task:\n{}\n\nDiff:\n{}\n",
        task_description.trim(),
        truncate_chars(diff, diff_chars)
    )
}
