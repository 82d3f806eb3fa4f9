use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::ItemId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised while interpreting a selected option.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnswerOptionError {
    #[error("answer option must be between 1 and 5, got {0}")]
    OutOfRange(u8),

    #[error("unrecognised answer option: {0:?}")]
    Unparseable(String),
}

//
// ─── ANSWER OPTION ────────────────────────────────────────────────────────────
//

/// One of the five options every item carries.
///
/// On the wire an option is the number 1-5; users see the letters A-E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
    E,
}

impl AnswerOption {
    pub const ALL: [AnswerOption; 5] = [
        AnswerOption::A,
        AnswerOption::B,
        AnswerOption::C,
        AnswerOption::D,
        AnswerOption::E,
    ];

    /// Converts the wire value (1-5) to an option.
    ///
    /// # Errors
    ///
    /// Returns `AnswerOptionError::OutOfRange` for anything outside 1-5.
    pub fn from_u8(value: u8) -> Result<Self, AnswerOptionError> {
        match value {
            1 => Ok(Self::A),
            2 => Ok(Self::B),
            3 => Ok(Self::C),
            4 => Ok(Self::D),
            5 => Ok(Self::E),
            _ => Err(AnswerOptionError::OutOfRange(value)),
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            AnswerOption::A => 1,
            AnswerOption::B => 2,
            AnswerOption::C => 3,
            AnswerOption::D => 4,
            AnswerOption::E => 5,
        }
    }

    #[must_use]
    pub fn letter(self) -> char {
        match self {
            AnswerOption::A => 'A',
            AnswerOption::B => 'B',
            AnswerOption::C => 'C',
            AnswerOption::D => 'D',
            AnswerOption::E => 'E',
        }
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.value() - 1)
    }
}

impl TryFrom<u8> for AnswerOption {
    type Error = AnswerOptionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value)
    }
}

impl From<AnswerOption> for u8 {
    fn from(option: AnswerOption) -> Self {
        option.value()
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Accepts `A`-`E` (any case) or `1`-`5`.
impl FromStr for AnswerOption {
    type Err = AnswerOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(AnswerOptionError::Unparseable(trimmed.to_string()));
        };
        match c.to_ascii_uppercase() {
            'A' | '1' => Ok(Self::A),
            'B' | '2' => Ok(Self::B),
            'C' | '3' => Ok(Self::C),
            'D' | '4' => Ok(Self::D),
            'E' | '5' => Ok(Self::E),
            _ => Err(AnswerOptionError::Unparseable(trimmed.to_string())),
        }
    }
}

//
// ─── ANSWER RECORD ────────────────────────────────────────────────────────────
//

/// A locally recorded answer waiting to be synchronized.
///
/// Records are immutable once created and leave the answered queue only when
/// the backend acknowledges them (matched by [`AnswerKey`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub item_id: ItemId,
    pub selected_option: AnswerOption,
    pub response_time_ms: u64,
    pub served_at: DateTime<Utc>,
    pub answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    /// Stamps a new record answered at `answered_at`.
    ///
    /// `served_at` is back-dated by the response time. A response time that
    /// does not fit the calendar collapses `served_at` onto `answered_at`.
    #[must_use]
    pub fn stamp(
        item_id: ItemId,
        selected_option: AnswerOption,
        response_time_ms: u64,
        answered_at: DateTime<Utc>,
    ) -> Self {
        let served_at = i64::try_from(response_time_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|elapsed| answered_at.checked_sub_signed(elapsed))
            .unwrap_or(answered_at);

        Self {
            item_id,
            selected_option,
            response_time_ms,
            served_at,
            answered_at,
        }
    }

    #[must_use]
    pub fn key(&self) -> AnswerKey {
        AnswerKey {
            item_id: self.item_id,
            answered_at: self.answered_at,
            selected_option: self.selected_option,
        }
    }
}

/// Composite identity used to evict acknowledged answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnswerKey {
    pub item_id: ItemId,
    pub answered_at: DateTime<Utc>,
    pub selected_option: AnswerOption,
}
