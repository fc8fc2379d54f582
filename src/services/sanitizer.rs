//! Heuristic filter for administration (department) grouping labels.
//!
//! The administration field is free text and regularly holds a user's name
//! with their matricule, a role, or an approval status instead of a
//! department. Any label that looks like one of those is rejected; anything
//! the checks cannot vouch for is rejected as well.
//!
//! The same predicate backs the server-side aggregation and the client-side
//! reconciliation re-check.

use regex::Regex;

/// Placeholder departments shown when no real label survives filtering.
pub const DEFAULT_DEPARTMENTS: [&str; 5] = [
    "Direction Générale",
    "Direction Commerciale",
    "Direction Financière",
    "Direction Technique",
    "Service Informatique",
];

/// Role and status words that never name a department. A label containing
/// any of them, even inside a longer word, is rejected.
pub const STOP_WORDS: [&str; 15] = [
    "user",
    "admin",
    "utilisateur",
    "administrateur",
    "utilisateurs",
    "administrateurs",
    "en attente",
    "en_attente",
    "attente",
    "rejeté",
    "rejetés",
    "rejet",
    "pending",
    "approved",
    "rejected",
];

/// Substrings that mark a label as identifier-bearing wherever they appear.
const IDENTIFIER_WORDS: [&str; 2] = ["matricule", "utilisateur"];

/// Labels this short (after trimming) are rejected.
pub const MAX_REJECTED_LENGTH: usize = 3;

/// Why a label was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    StopWord(&'static str),
    IdentifierWord(&'static str),
    ParenthesizedNumber,
    DigitRun,
    LetterDigit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelVerdict {
    Valid,
    Rejected(RejectReason),
}

impl LabelVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, LabelVerdict::Valid)
    }
}

#[derive(Debug, Clone)]
pub struct LabelSanitizer {
    digit_run_threshold: usize,
    parenthesized_number: Regex,
    digit_run: Regex,
    letter_digit: Regex,
}

impl LabelSanitizer {
    /// Build a sanitizer flagging runs of `digit_run_threshold` or more digits.
    pub fn new(digit_run_threshold: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            digit_run_threshold,
            parenthesized_number: Regex::new(r"\(\s*\d+\s*\)")?,
            digit_run: Regex::new(&format!(r"\d{{{digit_run_threshold},}}"))?,
            letter_digit: Regex::new(r"\b\p{L}\d")?,
        })
    }

    pub fn digit_run_threshold(&self) -> usize {
        self.digit_run_threshold
    }

    /// Classify a candidate grouping label.
    pub fn classify(&self, label: &str) -> LabelVerdict {
        let trimmed = label.trim();
        if trimmed.chars().count() <= MAX_REJECTED_LENGTH {
            return LabelVerdict::Rejected(RejectReason::TooShort);
        }

        let lowered = trimmed.to_lowercase();
        if let Some(word) = IDENTIFIER_WORDS.iter().copied().find(|w| lowered.contains(w)) {
            return LabelVerdict::Rejected(RejectReason::IdentifierWord(word));
        }
        if let Some(word) = STOP_WORDS.iter().copied().find(|w| lowered.contains(w)) {
            return LabelVerdict::Rejected(RejectReason::StopWord(word));
        }
        if self.parenthesized_number.is_match(trimmed) {
            return LabelVerdict::Rejected(RejectReason::ParenthesizedNumber);
        }
        if self.digit_run.is_match(trimmed) {
            return LabelVerdict::Rejected(RejectReason::DigitRun);
        }
        if self.letter_digit.is_match(trimmed) {
            return LabelVerdict::Rejected(RejectReason::LetterDigit);
        }

        LabelVerdict::Valid
    }

    /// `true` when the label can be shown as a department.
    pub fn is_valid_grouping_label(&self, label: &str) -> bool {
        self.classify(label).is_valid()
    }

    /// Labels among `labels` that fail the check.
    pub fn contaminated<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        labels
            .into_iter()
            .filter(|label| !self.is_valid_grouping_label(label))
            .collect()
    }
}
