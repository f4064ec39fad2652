//! Temporal extent of a data package.
//!
//! A package is stamped with exactly one of three shapes:
//! - **Instant**: a single point in time
//! - **Interval**: a closed span, `start <= end`
//! - **Series**: an ordered, non-empty list of instants
//!
//! Series order is the producer's responsibility. Out-of-order input is
//! rejected rather than sorted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Time stamp of a data package.
///
/// # Examples
///
/// ```
/// use vizpack::Time;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let span = Time::interval(now, now + Duration::hours(6)).unwrap();
/// assert!(span.contains(now + Duration::hours(1)));
/// assert!(Time::interval(now, now - Duration::hours(1)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Time {
    Instant {
        at: DateTime<Utc>,
    },

    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    Series {
        timestamps: Vec<DateTime<Utc>>,
    },
}

impl Time {
    /// Creates an instant.
    #[must_use]
    pub const fn instant(at: DateTime<Utc>) -> Self {
        Self::Instant { at }
    }

    /// Creates an instant at the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::Instant { at: Utc::now() }
    }

    /// Creates an interval.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `start > end`.
    pub fn interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        let time = Self::Interval { start, end };
        time.validate()?;
        Ok(time)
    }

    /// Creates a series from chronologically ordered timestamps.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptySeries` for an empty list and
    /// `ValidationError::UnorderedSeries` if any timestamp precedes its predecessor.
    pub fn series(timestamps: Vec<DateTime<Utc>>) -> Result<Self, ValidationError> {
        let time = Self::Series { timestamps };
        time.validate()?;
        Ok(time)
    }

    /// Checks the variant invariants.
    ///
    /// Values built through the constructors always pass; this exists for
    /// values that arrive through deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Instant { .. } => Ok(()),
            Self::Interval { start, end } => {
                if start > end {
                    return Err(ValidationError::InvalidInterval {
                        start: *start,
                        end: *end,
                    });
                }
                Ok(())
            }
            Self::Series { timestamps } => {
                if timestamps.is_empty() {
                    return Err(ValidationError::EmptySeries);
                }
                if let Some(pos) = timestamps.windows(2).position(|w| w[1] < w[0]) {
                    return Err(ValidationError::UnorderedSeries { index: pos + 1 });
                }
                Ok(())
            }
        }
    }

    /// Wire tag of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Instant { .. } => "instant",
            Self::Interval { .. } => "interval",
            Self::Series { .. } => "series",
        }
    }

    /// Earliest instant covered.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            Self::Instant { at } => *at,
            Self::Interval { start, .. } => *start,
            Self::Series { timestamps } => timestamps.first().copied().unwrap_or(DateTime::UNIX_EPOCH),
        }
    }

    /// Latest instant covered.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        match self {
            Self::Instant { at } => *at,
            Self::Interval { end, .. } => *end,
            Self::Series { timestamps } => timestamps.last().copied().unwrap_or(DateTime::UNIX_EPOCH),
        }
    }

    /// Number of discrete instants (an interval counts as its two endpoints).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Instant { .. } => 1,
            Self::Interval { .. } => 2,
            Self::Series { timestamps } => timestamps.len(),
        }
    }

    /// Always false for validated values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a timestamp is covered.
    ///
    /// Series membership is exact: only the listed instants are covered.
    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        match self {
            Self::Instant { at } => *at == time,
            Self::Interval { start, end } => time >= *start && time <= *end,
            Self::Series { timestamps } => timestamps.binary_search(&time).is_ok(),
        }
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instant { at } => write!(f, "{}", at.to_rfc3339()),
            Self::Interval { start, end } => {
                write!(f, "[{} → {}]", start.to_rfc3339(), end.to_rfc3339())
            }
            Self::Series { timestamps } => write!(
                f,
                "series[{}] {} → {}",
                timestamps.len(),
                self.start().to_rfc3339(),
                self.end().to_rfc3339()
            ),
        }
    }
}
