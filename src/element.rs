//! Element kinds and the per-element record.
//!
//! Elements are the annotated things of a document: objects, actions,
//! events, contexts and relations. An element is identified by its kind
//! and [`Uid`]. Its name and semantic type are fixed when it is created.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, AttributeKind, AttributeSet};
use crate::error::FormatError;
use crate::frame_interval::FrameIntervals;
use crate::uid::Uid;

/// Category of an element.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Object,
    Action,
    Event,
    Context,
    Relation,
}

impl ElementKind {
    /// Number of element kinds.
    pub const COUNT: usize = 5;

    /// Every kind, in tree order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Object,
        Self::Action,
        Self::Event,
        Self::Context,
        Self::Relation,
    ];

    /// Dense index, stable across releases.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Object => 0,
            Self::Action => 1,
            Self::Event => 2,
            Self::Context => 3,
            Self::Relation => 4,
        }
    }

    /// Singular name, as written in `rdf_*` links and log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Action => "action",
            Self::Event => "event",
            Self::Context => "context",
            Self::Relation => "relation",
        }
    }

    /// Table key in the tree, e.g. `"objects"`.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Object => "objects",
            Self::Action => "actions",
            Self::Event => "events",
            Self::Context => "contexts",
            Self::Relation => "relations",
        }
    }

    /// Key of the static attribute bucket, e.g. `"object_data"`.
    #[must_use]
    pub const fn data_key(self) -> &'static str {
        match self {
            Self::Object => "object_data",
            Self::Action => "action_data",
            Self::Event => "event_data",
            Self::Context => "context_data",
            Self::Relation => "relation_data",
        }
    }

    /// Key of the data-pointer index, e.g. `"object_data_pointers"`.
    #[must_use]
    pub const fn pointers_key(self) -> &'static str {
        match self {
            Self::Object => "object_data_pointers",
            Self::Action => "action_data_pointers",
            Self::Event => "event_data_pointers",
            Self::Context => "context_data_pointers",
            Self::Relation => "relation_data_pointers",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| FormatError::shape(s, "element kind"))
    }
}

/// Optional fields supplied when declaring an element.
///
/// # Examples
///
/// ```
/// use openlabel::{ElementArgs, Uid};
///
/// let args = ElementArgs::new().uid(3).semantic_type("person");
/// assert_eq!(args.uid, Uid::Integer(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementArgs {
    /// Requested identifier; `Uid::None` lets the document pick one.
    pub uid: Uid,
    /// Semantic type, written as `type`.
    pub semantic_type: Option<String>,
    /// Key of a registered ontology.
    pub ontology_uid: Option<String>,
    /// Name of a declared coordinate system.
    pub coordinate_system: Option<String>,
}

impl ElementArgs {
    /// No uid and no optional fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a specific identifier.
    #[must_use]
    pub fn uid(mut self, uid: impl Into<Uid>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Sets the semantic type.
    #[must_use]
    pub fn semantic_type(mut self, semantic_type: impl Into<String>) -> Self {
        self.semantic_type = Some(semantic_type.into());
        self
    }

    /// Links the element to a registered ontology.
    #[must_use]
    pub fn ontology_uid(mut self, ontology_uid: impl Into<String>) -> Self {
        self.ontology_uid = Some(ontology_uid.into());
        self
    }

    /// Places the element in a declared coordinate system.
    #[must_use]
    pub fn coordinate_system(mut self, name: impl Into<String>) -> Self {
        self.coordinate_system = Some(name.into());
        self
    }
}

/// Which side of a relation an element is linked on.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdfRole {
    Subject,
    Object,
}

/// Link from a relation to one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdfRef {
    /// Linked element.
    pub uid: Uid,
    /// Kind of the linked element.
    #[serde(rename = "type")]
    pub kind: ElementKind,
}

/// Coverage record for one attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPointer {
    /// Attribute kind the name was written with.
    pub kind: AttributeKind,
    /// Frames the attribute has been written at; empty if only set statically.
    pub frame_intervals: FrameIntervals,
}

/// An annotated element and everything stored on it outside of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Table the element lives in.
    pub kind: ElementKind,
    /// Identifier within the kind table.
    pub uid: Uid,
    /// Human-readable name.
    pub name: String,
    /// Written as `type`.
    pub semantic_type: Option<String>,
    /// Key of a registered ontology.
    pub ontology_uid: Option<String>,
    /// Name of a declared coordinate system.
    pub coordinate_system: Option<String>,
    /// Empty while the element is static.
    pub frame_intervals: FrameIntervals,
    /// Static attributes.
    pub data: AttributeSet,
    /// Coverage of every attribute name, static or per frame.
    pub data_pointers: BTreeMap<String, DataPointer>,
    /// Always empty for non-relations.
    pub rdf_subjects: Vec<RdfRef>,
    /// Always empty for non-relations.
    pub rdf_objects: Vec<RdfRef>,
}

impl Element {
    /// Creates an element with no frame scoping and no data.
    #[must_use]
    pub fn new(kind: ElementKind, uid: Uid, name: impl Into<String>) -> Self {
        Self {
            kind,
            uid,
            name: name.into(),
            semantic_type: None,
            ontology_uid: None,
            coordinate_system: None,
            frame_intervals: FrameIntervals::new(),
            data: AttributeSet::new(),
            data_pointers: BTreeMap::new(),
            rdf_subjects: Vec::new(),
            rdf_objects: Vec::new(),
        }
    }

    /// True until the element has been referenced in a frame.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.frame_intervals.is_empty()
    }

    /// True once the element has been referenced in a frame.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    /// Records that `attr` exists, optionally at `frame`.
    pub(crate) fn touch_data_pointer(&mut self, attr: &Attribute, frame: Option<u64>) {
        let pointer = self
            .data_pointers
            .entry(attr.name.clone())
            .or_insert_with(|| DataPointer {
                kind: attr.kind(),
                frame_intervals: FrameIntervals::new(),
            });
        pointer.kind = attr.kind();
        if let Some(frame) = frame {
            pointer.frame_intervals.update(frame);
        }
    }

    /// Links list for `role`.
    #[must_use]
    pub fn rdf(&self, role: RdfRole) -> &[RdfRef] {
        match role {
            RdfRole::Subject => &self.rdf_subjects,
            RdfRole::Object => &self.rdf_objects,
        }
    }

    pub(crate) fn rdf_mut(&mut self, role: RdfRole) -> &mut Vec<RdfRef> {
        match role {
            RdfRole::Subject => &mut self.rdf_subjects,
            RdfRole::Object => &mut self.rdf_objects,
        }
    }
}
