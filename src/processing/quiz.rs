//! Tolerant parser for multiple-choice quizzes returned by the completion provider.
//!
//! The model is asked for blocks of the form:
//!
//! ```text
//! Question 1: What is osmosis?
//! A) ...
//! B) ...
//! C) ...
//! D) ...
//! Correct Answer: B
//! ```
//!
//! separated by blank lines. Blocks that do not fit that shape are reported as
//! [`QuizBlock::Skipped`] instead of failing the whole reply.

use serde::{Deserialize, Serialize};

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    /// Question line as written by the model, including its `Question N:` prefix.
    pub question: String,
    /// The four answer choices, in order.
    pub choices: [String; 4],
    /// Text after the final `:` of the answer line, usually a single letter.
    pub correct: String,
}

/// Outcome of parsing one blank-line separated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizBlock {
    /// Well-formed question.
    Item(QuizItem),
    /// Block that was not a question; carries the reason.
    Skipped(String),
}

/// Parse every block of `reply`, keeping malformed ones as [`QuizBlock::Skipped`].
pub fn parse_blocks(reply: &str) -> Vec<QuizBlock> {
    let normalized = reply.replace("\r\n", "\n");
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(parse_block(&current));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        blocks.push(parse_block(&current));
    }
    blocks
}

/// Parse `reply` into well-formed questions, dropping everything else.
pub fn parse_quiz(reply: &str) -> Vec<QuizItem> {
    parse_blocks(reply)
        .into_iter()
        .filter_map(|block| match block {
            QuizBlock::Item(item) => Some(item),
            QuizBlock::Skipped(reason) => {
                tracing::debug!(reason = %reason, "Skipping malformed quiz block");
                None
            }
        })
        .collect()
}

fn parse_block(lines: &[&str]) -> QuizBlock {
    if lines.len() < 6 {
        return QuizBlock::Skipped(format!("expected at least 6 lines, found {}", lines.len()));
    }
    let question = lines[0];
    if !question.to_lowercase().starts_with("question") {
        return QuizBlock::Skipped(format!("block does not start with a question: {question:?}"));
    }
    let correct = lines[5].rsplit(':').next().unwrap_or_default().trim();
    if correct.is_empty() || !lines[5].contains(':') {
        return QuizBlock::Skipped(format!("missing correct answer in {:?}", lines[5]));
    }

    QuizBlock::Item(QuizItem {
        question: question.to_string(),
        choices: [
            lines[1].to_string(),
            lines[2].to_string(),
            lines[3].to_string(),
            lines[4].to_string(),
        ],
        correct: correct.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "Question 1: What carries oxygen in blood?\n\
A) Platelets\n\
B) Red blood cells\n\
C) Plasma\n\
D) White blood cells\n\
Correct Answer: B\n\
\n\
Question 2: Which organelle makes ATP?\n\
A) Nucleus\n\
B) Ribosome\n\
C) Mitochondrion\n\
D) Golgi body\n\
Correct Answer: C";

    #[test]
    fn parses_well_formed_reply() {
        let quiz = parse_quiz(REPLY);
        assert_eq!(quiz.len(), 2);
        assert_eq!(quiz[0].question, "Question 1: What carries oxygen in blood?");
        assert_eq!(quiz[0].choices[1], "B) Red blood cells");
        assert_eq!(quiz[0].correct, "B");
        assert_eq!(quiz[1].correct, "C");
    }

    #[test]
    fn handles_crlf_and_padding() {
        let reply = REPLY.replace('\n', "\r\n");
        let quiz = parse_quiz(&format!("  \r\n{reply}\r\n\r\n"));
        assert_eq!(quiz.len(), 2);
        assert_eq!(quiz[1].choices[3], "D) Golgi body");
    }

    #[test]
    fn malformed_blocks_are_skipped_not_fatal() {
        let reply = format!(
            "Here is your quiz!\n\n{REPLY}\n\nQuestion 3: Too short?\nA) yes\nB) no\n\n\
             Question 4: No answer?\nA) a\nB) b\nC) c\nD) d\nCorrect Answer:   "
        );
        let blocks = parse_blocks(&reply);
        assert_eq!(blocks.len(), 5);
        assert!(matches!(blocks[0], QuizBlock::Skipped(_)));
        assert!(matches!(blocks[3], QuizBlock::Skipped(_)));
        assert!(matches!(blocks[4], QuizBlock::Skipped(_)));

        let quiz = parse_quiz(&reply);
        assert_eq!(quiz.len(), 2);
        assert!(quiz.iter().all(|item| !item.correct.is_empty()));
    }

    #[test]
    fn question_prefix_is_case_insensitive() {
        let reply = "QUESTION: Capital of France?\nA) Rome\nB) Paris\nC) Oslo\nD) Bern\nAnswer: B";
        let quiz = parse_quiz(reply);
        assert_eq!(quiz.len(), 1);
        assert_eq!(quiz[0].correct, "B");
    }

    #[test]
    fn empty_reply_yields_nothing() {
        assert!(parse_quiz("").is_empty());
        assert!(parse_blocks("\n\n").is_empty());
    }
}
