use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FSRSError, Result};

// ==================== Constants ====================

/// Forgetting curve exponent
pub const DECAY: f64 = -0.5;
/// Chosen so that R(S, S) = 0.9: 0.9^(1/DECAY) - 1
pub const FACTOR: f64 = 19.0 / 81.0;
/// Minimum stability (days)
pub const S_MIN: f64 = 0.01;
/// Maximum stability (days)
pub const S_MAX: f64 = 36500.0;
/// Difficulty lower bound
pub const D_MIN: f64 = 1.0;
/// Difficulty upper bound
pub const D_MAX: f64 = 10.0;
/// Default upper bound for scheduled intervals (days)
pub const DEFAULT_MAX_INTERVAL: f64 = 36500.0;
/// Scheduled intervals never go below one day
pub const MIN_INTERVAL: f64 = 1.0;
/// Numerical tolerance
pub const EPSILON: f64 = 1e-10;

// ==================== Rating ====================

/// Learner's self-assessment of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// All ratings in ascending order
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Numeric grade 1..=4
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Zero-based index into per-rating tables
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Anything but Again counts as a successful recall
    pub fn is_recall(self) -> bool {
        self != Rating::Again
    }
}

impl TryFrom<u8> for Rating {
    type Error = FSRSError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            other => Err(FSRSError::InvalidRating(other)),
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        };
        f.write_str(name)
    }
}

// ==================== Review history ====================

/// A single review of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub rating: Rating,
    /// Whole days since the previous review of the same item (0 = same day)
    pub delta_t: u32,
}

impl Review {
    /// Create a review from a raw 1..=4 grade
    pub fn new(rating: u8, delta_t: u32) -> Result<Self> {
        Ok(Self {
            rating: Rating::try_from(rating)?,
            delta_t,
        })
    }

    /// Review that happened at least one day after the previous one
    pub fn is_long_term(&self) -> bool {
        self.delta_t >= 1
    }
}

impl fmt::Display for Review {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Review {{ rating: {}, delta_t: {} }}", self.rating, self.delta_t)
    }
}

/// Chronological review history of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Review>", into = "Vec<Review>")]
pub struct Item {
    reviews: Vec<Review>,
}

impl Item {
    /// Create an item; the history must not be empty
    pub fn new(reviews: Vec<Review>) -> Result<Self> {
        if reviews.is_empty() {
            return Err(FSRSError::EmptyItem);
        }
        Ok(Self { reviews })
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    /// Always false for a constructed item
    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }

    /// Number of reviews that happened at least one day after the previous one
    pub fn long_term_review_count(&self) -> usize {
        self.reviews.iter().filter(|r| r.is_long_term()).count()
    }

    /// First review at least one day after the first one
    pub fn first_long_term_review(&self) -> Option<Review> {
        self.reviews.iter().skip(1).find(|r| r.is_long_term()).copied()
    }
}

impl TryFrom<Vec<Review>> for Item {
    type Error = FSRSError;

    fn try_from(reviews: Vec<Review>) -> Result<Self> {
        Item::new(reviews)
    }
}

impl From<Item> for Vec<Review> {
    fn from(item: Item) -> Self {
        item.reviews
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item {{ reviews: [")?;
        for (i, review) in self.reviews.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", review)?;
        }
        write!(f, "] }}")
    }
}

// ==================== Memory state ====================

/// Stability/difficulty pair describing one memory trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    /// Days until recall probability falls to 90%
    pub stability: f64,
    /// Resistance to stability growth, [1, 10]
    pub difficulty: f64,
}

impl MemoryState {
    pub fn new(stability: f64, difficulty: f64) -> Self {
        Self {
            stability,
            difficulty,
        }
    }

    /// Reject states that cannot be fed to the model
    pub fn validate(&self) -> Result<()> {
        if !self.stability.is_finite() || self.stability <= 0.0 {
            return Err(FSRSError::InvalidMemoryState(format!(
                "stability must be positive and finite, got {}",
                self.stability
            )));
        }
        if !self.difficulty.is_finite() {
            return Err(FSRSError::InvalidMemoryState(format!(
                "difficulty must be finite, got {}",
                self.difficulty
            )));
        }
        Ok(())
    }
}

impl fmt::Display for MemoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MemoryState {{ stability: {:.4}, difficulty: {:.4} }}",
            self.stability, self.difficulty
        )
    }
}

/// Predicted state and recommended delay if a rating is chosen now
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub memory: MemoryState,
    /// Days until the next review
    pub interval: f64,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ItemState {{ memory: {}, interval: {:.2} }}",
            self.memory, self.interval
        )
    }
}

/// Outcomes for all four ratings from the same starting point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextStates {
    pub again: ItemState,
    pub hard: ItemState,
    pub good: ItemState,
    pub easy: ItemState,
}

impl NextStates {
    pub fn get(&self, rating: Rating) -> &ItemState {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }

    /// States in rating order Again..Easy
    pub fn iter(&self) -> impl Iterator<Item = (Rating, &ItemState)> {
        Rating::ALL.into_iter().map(move |r| (r, self.get(r)))
    }
}
