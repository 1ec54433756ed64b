//! Frames, the sparse timeline, and the holistic registry.
//!
//! A [`Frame`] exists once something references its index. It holds, per
//! element kind, a slot for every element present in that frame together
//! with the attributes written for the element at that frame.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::trace;

use crate::attribute::AttributeSet;
use crate::element::ElementKind;
use crate::stream::{FrameStream, Odometry};
use crate::uid::Uid;

/// Per-frame data of one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameElement {
    /// Attributes written at this frame.
    pub data: AttributeSet,
}

/// Properties of a frame: capture time, per-stream data, odometry and
/// free-form entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameProperties {
    /// Capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Stream properties valid at this frame, by stream name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub streams: BTreeMap<String, FrameStream>,
    /// Vehicle pose at this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometry: Option<Odometry>,
    /// Free-form entries, written next to the named ones.
    #[serde(flatten)]
    pub properties: Map<String, Json>,
}

/// One instant of the annotated sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: u64,
    elements: [BTreeMap<Uid, FrameElement>; ElementKind::COUNT],
    /// `frame_properties`, absent until something is written there.
    pub properties: Option<FrameProperties>,
}

impl Frame {
    /// An empty frame.
    #[must_use]
    pub fn new(index: u64) -> Self {
        Self {
            index,
            elements: Default::default(),
            properties: None,
        }
    }

    /// Frame number.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// True if `uid` of `kind` is referenced in this frame.
    #[must_use]
    pub fn contains(&self, kind: ElementKind, uid: &Uid) -> bool {
        self.elements[kind.index()].contains_key(uid)
    }

    /// Slot of `uid` in this frame.
    #[must_use]
    pub fn element(&self, kind: ElementKind, uid: &Uid) -> Option<&FrameElement> {
        self.elements[kind.index()].get(uid)
    }

    /// Elements of `kind` referenced in this frame, by uid.
    #[must_use]
    pub fn elements(&self, kind: ElementKind) -> &BTreeMap<Uid, FrameElement> {
        &self.elements[kind.index()]
    }

    /// Returns the slot for `uid`, creating an empty one if needed.
    pub(crate) fn slot(&mut self, kind: ElementKind, uid: &Uid) -> &mut FrameElement {
        self.elements[kind.index()].entry(uid.clone()).or_default()
    }

    /// Total number of element references across kinds.
    #[must_use]
    pub fn num_references(&self) -> usize {
        self.elements.iter().map(BTreeMap::len).sum()
    }
}

/// Elements that must appear in every frame created from now on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolisticRegistry {
    by_kind: [BTreeSet<Uid>; ElementKind::COUNT],
}

impl HolisticRegistry {
    /// Registers `uid`; returns false if it was already present.
    pub fn register(&mut self, kind: ElementKind, uid: Uid) -> bool {
        self.by_kind[kind.index()].insert(uid)
    }

    /// True if the element is registered.
    #[must_use]
    pub fn contains(&self, kind: ElementKind, uid: &Uid) -> bool {
        self.by_kind[kind.index()].contains(uid)
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.iter().all(BTreeSet::is_empty)
    }

    /// Every registered element, kind by kind.
    pub fn iter(&self) -> impl Iterator<Item = (ElementKind, &Uid)> {
        ElementKind::ALL
            .into_iter()
            .flat_map(move |kind| self.by_kind[kind.index()].iter().map(move |uid| (kind, uid)))
    }

    /// Inserts an empty reference for every registered element into `frame`.
    pub fn on_new_frame(&self, frame: &mut Frame) {
        for (kind, uid) in self.iter() {
            frame.slot(kind, uid);
        }
    }
}

/// Sparse index from frame number to [`Frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    frames: BTreeMap<u64, Frame>,
}

impl Timeline {
    /// Frame `index`, if it exists.
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&Frame> {
        self.frames.get(&index)
    }

    pub(crate) fn get_mut(&mut self, index: u64) -> Option<&mut Frame> {
        self.frames.get_mut(&index)
    }

    /// True if frame `index` exists.
    #[must_use]
    pub fn contains(&self, index: u64) -> bool {
        self.frames.contains_key(&index)
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if no frame exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Highest frame index created so far.
    #[must_use]
    pub fn last_index(&self) -> Option<u64> {
        self.frames.keys().next_back().copied()
    }

    /// Frames in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    pub(crate) fn insert(&mut self, frame: Frame) {
        self.frames.insert(frame.index, frame);
    }

    /// Frame `index`, created bare if missing.
    pub(crate) fn entry(&mut self, index: u64) -> &mut Frame {
        self.frames.entry(index).or_insert_with(|| Frame::new(index))
    }

    /// Makes sure frame `index` exists and returns the frames created, in
    /// ascending order.
    ///
    /// With `backfill`, every missing frame between the nearest earlier frame
    /// and `index` is created too. Each new frame is stamped with the
    /// holistic elements.
    pub fn ensure(&mut self, index: u64, backfill: bool, holistic: &HolisticRegistry) -> Vec<u64> {
        if self.frames.contains_key(&index) {
            return Vec::new();
        }
        let mut created = Vec::new();
        let previous = self.frames.range(..index).next_back().map(|(&f, _)| f);
        if backfill {
            if let Some(previous) = previous {
                created.extend(previous + 1..index);
            }
        }
        created.push(index);
        for &f in &created {
            let mut frame = Frame::new(f);
            holistic.on_new_frame(&mut frame);
            trace!(frame = f, target = index, "created frame");
            self.frames.insert(f, frame);
        }
        created
    }
}
