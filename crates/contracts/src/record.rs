//! FeedbackRecord - Validator output
//!
//! Canonical, validated representation of one feedback submission.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// User judgment about an entity annotation
///
/// Closed set; anything else is rejected at validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVerdict {
    /// The annotation was right
    Correct,
    /// The annotation was wrong
    Incorrect,
}

impl FeedbackVerdict {
    /// All accepted verdicts, in display order
    pub const ALL: [FeedbackVerdict; 2] = [FeedbackVerdict::Correct, FeedbackVerdict::Incorrect];

    /// Wire name of the verdict
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }

    /// Match a normalized (trimmed, lowercase) value against the closed set
    pub fn from_normalized(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }
}

impl fmt::Display for FeedbackVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated feedback record
///
/// Built exactly once by the validator. Sinks only ever see `&FeedbackRecord`
/// (or an `Arc` of it), so the record cannot change while it is fanned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Annotated source text (never empty)
    pub text: String,

    /// Document URL (client supplied or derived from the text)
    pub doc_url: Url,

    /// Entity identifier (URI)
    pub entity_uri: String,

    /// Surface form the entity was spotted as
    pub surface_form: String,

    /// Character offset of the surface form; `None` = unspecified
    pub offset: Option<u32>,

    /// Correct / incorrect
    pub verdict: FeedbackVerdict,

    /// Contributing annotation systems, in submission order
    pub systems: Vec<String>,

    /// Whether a human produced this feedback
    pub is_manual: bool,

    /// Language tag
    pub language: Option<String>,

    /// Discourse type / gender annotation
    pub discourse_type: Option<String>,

    /// Entity the submitter believes is correct
    pub right_entity: Option<String>,
}

impl FeedbackRecord {
    /// Offset as written to flat files (`-1` when unspecified)
    pub fn offset_or_sentinel(&self) -> i64 {
        self.offset.map(i64::from).unwrap_or(-1)
    }

    /// Systems joined with single spaces
    pub fn systems_joined(&self) -> String {
        self.systems.join(" ")
    }
}
