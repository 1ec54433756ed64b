//! Frame-interval algebra.
//!
//! A [`FrameIntervals`] value answers "in which frames is this thing
//! active". It is kept sorted, with no overlapping or touching intervals.
//! An empty set means the owner is static.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Inclusive range of frame indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameInterval {
    /// First frame (inclusive).
    pub frame_start: u64,
    /// Last frame (inclusive).
    pub frame_end: u64,
}

impl FrameInterval {
    /// Creates an interval.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFrameInterval` if `start > end`.
    pub const fn new(start: u64, end: u64) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidFrameInterval { start, end });
        }
        Ok(Self {
            frame_start: start,
            frame_end: end,
        })
    }

    /// Single-frame interval `[frame, frame]`.
    #[must_use]
    pub const fn single(frame: u64) -> Self {
        Self {
            frame_start: frame,
            frame_end: frame,
        }
    }

    /// True if `frame` lies within the interval.
    #[must_use]
    pub const fn contains(&self, frame: u64) -> bool {
        self.frame_start <= frame && frame <= self.frame_end
    }

    /// Number of frames covered, saturating at `u64::MAX` for `[0, u64::MAX]`.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.frame_end.saturating_sub(self.frame_start).saturating_add(1)
    }

    /// True if the two intervals overlap or sit next to each other.
    const fn touches(&self, other: &Self) -> bool {
        self.frame_start <= other.frame_end.saturating_add(1)
            && other.frame_start <= self.frame_end.saturating_add(1)
    }
}

impl fmt::Display for FrameInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.frame_start, self.frame_end)
    }
}

/// Ordered set of disjoint, non-adjacent frame intervals.
///
/// # Examples
///
/// ```
/// use openlabel::FrameIntervals;
///
/// let mut fis = FrameIntervals::new();
/// for f in [0, 1, 2, 5] {
///     fis.update(f);
/// }
/// assert_eq!(fis.to_pairs(), vec![(0, 2), (5, 5)]);
/// assert!(fis.has_frame(1));
/// assert!(!fis.has_frame(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameIntervals(Vec<FrameInterval>);

impl FrameIntervals {
    /// Creates an empty (static) set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a set from stored intervals.
    ///
    /// Intervals are normalized: sorted, and overlapping or adjacent ones fused.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFrameInterval` for any reversed interval.
    pub fn from_pairs(pairs: &[(u64, u64)]) -> Result<Self, ValidationError> {
        let mut fis = Self::new();
        for &(start, end) in pairs {
            fis.insert_interval(FrameInterval::new(start, end)?);
        }
        Ok(fis)
    }

    /// True for a static owner.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of disjoint intervals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Intervals in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, FrameInterval> {
        self.0.iter()
    }

    /// Intervals in ascending order.
    #[must_use]
    pub fn as_slice(&self) -> &[FrameInterval] {
        &self.0
    }

    /// Returns the intervals as `(start, end)` tuples.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(u64, u64)> {
        self.0.iter().map(|fi| (fi.frame_start, fi.frame_end)).collect()
    }

    /// True iff some interval contains `frame`.
    #[must_use]
    pub fn has_frame(&self, frame: u64) -> bool {
        self.0.iter().any(|fi| fi.contains(frame))
    }

    /// Lowest covered frame.
    #[must_use]
    pub fn first_frame(&self) -> Option<u64> {
        self.0.first().map(|fi| fi.frame_start)
    }

    /// Highest covered frame.
    #[must_use]
    pub fn last_frame(&self) -> Option<u64> {
        self.0.last().map(|fi| fi.frame_end)
    }

    /// Iterates every frame index covered, in ascending order.
    pub fn frames(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().flat_map(|fi| fi.frame_start..=fi.frame_end)
    }

    /// Gap-aware merge of a single frame.
    ///
    /// Writing the last frame again is a no-op, writing the next frame grows
    /// the last interval and anything further ahead opens a new interval.
    /// A frame that lies before the last interval's end is placed in order.
    pub fn update(&mut self, frame: u64) {
        let Some(last) = self.0.last_mut() else {
            self.0.push(FrameInterval::single(frame));
            return;
        };
        if last.frame_end == frame {
            return;
        }
        if last.frame_end.checked_add(1) == Some(frame) {
            last.frame_end = frame;
            return;
        }
        if frame > last.frame_end {
            self.0.push(FrameInterval::single(frame));
            return;
        }
        if !self.has_frame(frame) {
            self.insert_interval(FrameInterval::single(frame));
        }
    }

    /// No-gap merge: stretches the last interval up to `frame`.
    ///
    /// Only valid when every frame in between is known to be covered.
    pub fn update_no_gap(&mut self, frame: u64) {
        match self.0.last_mut() {
            None => self.0.push(FrameInterval::single(frame)),
            Some(last) if last.frame_end < frame => last.frame_end = frame,
            Some(_) => {}
        }
    }

    /// Coarsened document-level merge: keeps one `[min, max]` span.
    pub fn extend_span(&mut self, frame: u64) {
        let span = match (self.first_frame(), self.last_frame()) {
            (Some(start), Some(end)) => FrameInterval {
                frame_start: start.min(frame),
                frame_end: end.max(frame),
            },
            _ => FrameInterval::single(frame),
        };
        self.0.clear();
        self.0.push(span);
    }

    /// Inserts an interval in order, fusing it with any neighbour it touches.
    fn insert_interval(&mut self, mut interval: FrameInterval) {
        let pos = self
            .0
            .partition_point(|fi| fi.frame_end.saturating_add(1) < interval.frame_start);
        let mut end = pos;
        while end < self.0.len() && self.0[end].touches(&interval) {
            interval.frame_start = interval.frame_start.min(self.0[end].frame_start);
            interval.frame_end = interval.frame_end.max(self.0[end].frame_end);
            end += 1;
        }
        self.0.splice(pos..end, std::iter::once(interval));
    }
}

impl<'a> IntoIterator for &'a FrameIntervals {
    type Item = &'a FrameInterval;
    type IntoIter = std::slice::Iter<'a, FrameInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
