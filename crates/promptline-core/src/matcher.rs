//! Prompt detection over buffered output.

/// Location of the earliest prompt occurrence in a haystack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptMatch {
    /// Index of the matching prompt in the caller's list.
    pub index: usize,
    /// Byte offset where the prompt starts.
    pub start: usize,
    /// Byte offset one past the prompt's end.
    pub end: usize,
}

/// Find the leftmost occurrence of any prompt.
///
/// Ties at the same start position go to the prompt listed first. Empty
/// prompts never match.
pub fn find_earliest<S: AsRef<str>>(haystack: &str, prompts: &[S]) -> Option<PromptMatch> {
    let mut best: Option<PromptMatch> = None;

    for (index, prompt) in prompts.iter().enumerate() {
        let prompt = prompt.as_ref();
        if prompt.is_empty() {
            continue;
        }
        // Only a strictly earlier start can beat the current best.
        let limit = match best {
            Some(b) => (b.start + prompt.len()).min(haystack.len()),
            None => haystack.len(),
        };
        let window = match haystack.get(..limit) {
            Some(w) => w,
            None => haystack,
        };
        if let Some(start) = window.find(prompt) {
            if best.is_none_or(|b| start < b.start) {
                best = Some(PromptMatch {
                    index,
                    start,
                    end: start + prompt.len(),
                });
            }
        }
    }

    best
}
