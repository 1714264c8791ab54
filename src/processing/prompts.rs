//! Prompt text sent to the completion provider.

/// Context used when a document has no indexed chunks.
pub const NO_CONTENT: &str = "No content available.";

/// Format chunks as a numbered context block (`Content 1:`, `Content 2:`, ...).
///
/// Falls back to [`NO_CONTENT`] when `chunks` is empty.
pub fn document_prompt<S: AsRef<str>>(chunks: &[S]) -> String {
    if chunks.is_empty() {
        return NO_CONTENT.to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("\nContent {}:\n{}\n", i + 1, chunk.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn summary_instructions(context: &str) -> String {
    format!(
        "Generate a summary of the following notebook content:\n\n\
         ###\n{context}\n###\n\n\
         The first line must be the notebook title wrapped in double asterisks, \
         like **Title: <notebook title>**.\n\
         Then add two newline characters (\\n\\n).\n\
         After that, write the rest of the summary in no more than two sentences. \
         Be precise, avoid opinions, and summarize the main points in a clear and structured way."
    )
}

pub(crate) fn tutor_instructions(context: &str) -> String {
    format!(
        "You are a professor teaching a course. Use the following notebook content \
         to answer student questions accurately and concisely:\n\n{context}\n\n\
         Be precise and avoid opinions. \
         Only state what is in the notebook content. \
         Do not state what is not in the given notebook; be precise and straightforward."
    )
}

pub(crate) fn quiz_instructions(context: &str, num_questions: usize) -> String {
    format!(
        "Generate {num_questions} multiple-choice quiz questions from the following notebook content:\n\n\
         ###\n{context}\n###\n\n\
         Each question should have 4 answer choices (A, B, C, D) and indicate the correct answer at the end. \
         Separate questions with a blank line. The format of the reply should be:\n\
         Question 1: <question>\n\
         A) <answer choice A>\n\
         B) <answer choice B>\n\
         C) <answer choice C>\n\
         D) <answer choice D>\n\
         Correct Answer: C\n\n\
         Question 2: <question>\n\
         ..."
    )
}
