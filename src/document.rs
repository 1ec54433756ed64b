//! The annotation document.
//!
//! [`Document`] owns every table: elements by kind, the frame timeline, the
//! holistic registry, ontologies, coordinate systems and metadata. All
//! writes go through it so that identifier counters, frame intervals and
//! the write-order pointer stay consistent.
//!
//! Writes that cannot be applied (unknown element, out-of-order frame,
//! undeclared coordinate system) are soft failures: a warning is logged,
//! nothing changes and a [`WriteError`] is returned that callers may ignore.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::attribute::Attribute;
use crate::config::DocumentConfig;
use crate::element::{Element, ElementArgs, ElementKind, RdfRef, RdfRole};
use crate::error::{LabelError, LabelResult, WriteError};
use crate::frame::{Frame, FrameProperties, HolisticRegistry, Timeline};
use crate::frame_interval::FrameIntervals;
use crate::metadata::Metadata;
use crate::registry::{CoordinateSystem, CoordinateSystemType, CoordinateSystems, Ontologies};
use crate::stream::{FrameStream, Odometry, Stream, StreamProperties, StreamType, Streams};
use crate::uid::{parse_uid, RandomUuids, Uid, UidAllocator, UuidSource};

/// Metadata keys with a dedicated field.
const RESERVED_METADATA_KEYS: [&str; 5] = ["schema_version", "name", "annotator", "comment", "file_version"];

/// Frame property keys with a dedicated operation.
const RESERVED_FRAME_KEYS: [&str; 3] = ["timestamp", "streams", "odometry"];

/// Logs a soft failure and converts it for return.
fn reject(err: WriteError) -> LabelError {
    match &err {
        WriteError::UnknownElement { kind, uid } => warn!(kind = %kind, uid = %uid, "{err}"),
        WriteError::OutOfOrderFrame { frame, current } => warn!(frame, current, "{err}"),
        WriteError::UndeclaredCoordinateSystem { name } => warn!(name = %name, "{err}"),
        WriteError::UnknownStream { name } => warn!(stream = %name, "{err}"),
        other => warn!("{other}"),
    }
    err.into()
}

/// A time-indexed annotation document.
///
/// # Examples
///
/// ```
/// use openlabel::{Attribute, Document, ElementArgs, ElementKind};
///
/// let mut doc = Document::new();
/// let uid = doc.add_object("marcos", ElementArgs::new().semantic_type("person"), None);
/// doc.add_object_data(&uid, Attribute::bbox("head", [10.0, 10.0, 30.0, 30.0]), None)
///     .unwrap();
///
/// let marcos = doc.get_element(ElementKind::Object, &uid).unwrap();
/// assert!(marcos.is_static());
/// assert_eq!(marcos.data.len(), 1);
/// ```
#[derive(Debug)]
pub struct Document {
    pub(crate) config: DocumentConfig,
    pub(crate) metadata: Metadata,
    pub(crate) elements: [BTreeMap<Uid, Element>; ElementKind::COUNT],
    pub(crate) timeline: Timeline,
    /// Coarsened `[min, max]` span of every frame created.
    pub(crate) span: FrameIntervals,
    pub(crate) holistic: HolisticRegistry,
    pub(crate) ontologies: Ontologies,
    pub(crate) coordinate_systems: CoordinateSystems,
    pub(crate) streams: Streams,
    pub(crate) uids: UidAllocator,
    pub(crate) uuids: Box<dyn UuidSource>,
    /// Highest frame accepted for a frame-scoped attribute write.
    pub(crate) current_frame: Option<u64>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(DocumentConfig::default(), Box::new(RandomUuids))
    }

    /// Creates an empty document.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configuration is invalid.
    pub fn with_config(config: DocumentConfig) -> LabelResult<Self> {
        Self::with_uuid_source(config, Box::new(RandomUuids))
    }

    /// Creates an empty document drawing UUIDs from `uuids`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configuration is invalid.
    pub fn with_uuid_source(config: DocumentConfig, uuids: Box<dyn UuidSource>) -> LabelResult<Self> {
        Ok(Self::build(config.validate()?, uuids))
    }

    pub(crate) fn build(config: DocumentConfig, uuids: Box<dyn UuidSource>) -> Self {
        Self {
            metadata: Metadata::new(config.schema_version.clone()),
            elements: Default::default(),
            timeline: Timeline::default(),
            span: FrameIntervals::new(),
            holistic: HolisticRegistry::default(),
            ontologies: Ontologies::default(),
            coordinate_systems: CoordinateSystems::default(),
            streams: Streams::default(),
            uids: UidAllocator::new(config.use_uuid),
            uuids,
            current_frame: None,
            config,
        }
    }

    /// The configuration the document was built with.
    #[must_use]
    pub const fn config(&self) -> &DocumentConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    /// Declares an element, optionally at a frame, and returns its uid.
    ///
    /// Redeclaring an existing uid keeps its name and semantic type. Without
    /// a frame, the element becomes holistic if frames already exist: it is
    /// referenced in the current frame and in every frame created later.
    /// This holds for redeclarations too, so a static element declared again
    /// once frames exist turns dynamic.
    ///
    /// Unregistered ontologies and coordinate systems in `args` are dropped
    /// with a warning.
    pub fn declare(
        &mut self,
        kind: ElementKind,
        name: impl Into<String>,
        args: ElementArgs,
        frame: Option<u64>,
    ) -> Uid {
        let ElementArgs {
            uid,
            semantic_type,
            ontology_uid,
            coordinate_system,
        } = args;
        let uid = self.uids.resolve(kind, uid, self.uuids.as_mut());

        let table = &self.elements[kind.index()];
        let created = !table.contains_key(&uid);
        if created {
            let ontology_uid = ontology_uid.filter(|ont| {
                let known = self.ontologies.contains(ont);
                if !known {
                    warn!(ontology_uid = %ont, kind = %kind, uid = %uid, "Ontology has not been registered");
                }
                known
            });
            let coordinate_system = coordinate_system.filter(|cs| self.check_coordinate_system(cs).is_ok());

            let mut element = Element::new(kind, uid.clone(), name);
            element.semantic_type = semantic_type;
            element.ontology_uid = ontology_uid;
            element.coordinate_system = coordinate_system;
            self.elements[kind.index()].insert(uid.clone(), element);
            debug!(kind = %kind, uid = %uid, "element declared");
        }

        match frame {
            Some(f) => self.reference_in_frame(kind, &uid, f),
            None => {
                if let Some(current) = self.timeline.last_index() {
                    if self.holistic.register(kind, uid.clone()) {
                        debug!(kind = %kind, uid = %uid, frame = current, "holistic element");
                    }
                    self.reference_in_frame(kind, &uid, current);
                }
            }
        }
        uid
    }

    /// Like [`Document::declare`], taking the uid as caller-supplied text.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MalformedIdentifier` for text that is not
    /// empty, an integer or a UUID. Nothing is declared in that case.
    pub fn declare_str(
        &mut self,
        kind: ElementKind,
        name: impl Into<String>,
        uid: &str,
        args: ElementArgs,
        frame: Option<u64>,
    ) -> LabelResult<Uid> {
        let uid = parse_uid(uid)?;
        Ok(self.declare(kind, name, args.uid(uid), frame))
    }

    /// Declares an object. See [`Document::declare`].
    pub fn add_object(&mut self, name: impl Into<String>, args: ElementArgs, frame: Option<u64>) -> Uid {
        self.declare(ElementKind::Object, name, args, frame)
    }

    /// Declares an action. See [`Document::declare`].
    pub fn add_action(&mut self, name: impl Into<String>, args: ElementArgs, frame: Option<u64>) -> Uid {
        self.declare(ElementKind::Action, name, args, frame)
    }

    /// Declares an event. See [`Document::declare`].
    pub fn add_event(&mut self, name: impl Into<String>, args: ElementArgs, frame: Option<u64>) -> Uid {
        self.declare(ElementKind::Event, name, args, frame)
    }

    /// Declares a context. See [`Document::declare`].
    pub fn add_context(&mut self, name: impl Into<String>, args: ElementArgs, frame: Option<u64>) -> Uid {
        self.declare(ElementKind::Context, name, args, frame)
    }

    /// Declares a relation. See [`Document::declare`].
    pub fn add_relation(&mut self, name: impl Into<String>, args: ElementArgs, frame: Option<u64>) -> Uid {
        self.declare(ElementKind::Relation, name, args, frame)
    }

    /// Declares a relation and links `subject` and `object` to it.
    ///
    /// # Errors
    ///
    /// Returns `WriteError::UnknownElement` (soft) if either end does not
    /// exist; the relation is not declared then.
    pub fn add_relation_subject_object(
        &mut self,
        name: impl Into<String>,
        args: ElementArgs,
        subject: (ElementKind, Uid),
        object: (ElementKind, Uid),
        frame: Option<u64>,
    ) -> LabelResult<Uid> {
        for (kind, uid) in [&subject, &object] {
            if !self.has(*kind, uid) {
                return Err(reject(WriteError::UnknownElement {
                    kind: *kind,
                    uid: uid.clone(),
                }));
            }
        }
        let relation = self.add_relation(name, args, frame);
        self.add_rdf(&relation, RdfRole::Subject, subject.0, &subject.1)?;
        self.add_rdf(&relation, RdfRole::Object, object.0, &object.1)?;
        Ok(relation)
    }

    /// Links an element to a relation as subject or object.
    ///
    /// # Errors
    ///
    /// Returns `WriteError::UnknownElement` (soft) if the relation or the
    /// element does not exist.
    pub fn add_rdf(
        &mut self,
        relation_uid: &Uid,
        role: RdfRole,
        element_kind: ElementKind,
        element_uid: &Uid,
    ) -> LabelResult<()> {
        if !self.has(ElementKind::Relation, relation_uid) {
            return Err(reject(WriteError::UnknownElement {
                kind: ElementKind::Relation,
                uid: relation_uid.clone(),
            }));
        }
        if !self.has(element_kind, element_uid) {
            return Err(reject(WriteError::UnknownElement {
                kind: element_kind,
                uid: element_uid.clone(),
            }));
        }
        if let Some(relation) = self.elements[ElementKind::Relation.index()].get_mut(relation_uid) {
            relation.rdf_mut(role).push(RdfRef {
                uid: element_uid.clone(),
                kind: element_kind,
            });
        }
        Ok(())
    }

    /// True if any element linked to the relation is referenced in `frame`.
    #[must_use]
    pub fn is_relation_at_frame(&self, relation_uid: &Uid, frame: u64) -> bool {
        let (Some(relation), Some(f)) = (
            self.get_element(ElementKind::Relation, relation_uid),
            self.timeline.get(frame),
        ) else {
            return false;
        };
        relation
            .rdf_subjects
            .iter()
            .chain(&relation.rdf_objects)
            .any(|r| f.contains(r.kind, &r.uid))
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Sets an attribute on an element, statically or at `frame`.
    ///
    /// An attribute with the same kind and name is replaced in place.
    /// Frame-scoped writes must not go back in time: a frame below the
    /// highest one written so far is rejected.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` (hard) if the value holds
    /// NaN or an infinity.
    ///
    /// Soft failures, with the document unchanged:
    /// `WriteError::UnknownElement`, `WriteError::UndeclaredCoordinateSystem`
    /// and `WriteError::OutOfOrderFrame`.
    pub fn add_data(
        &mut self,
        kind: ElementKind,
        uid: &Uid,
        attr: Attribute,
        frame: Option<u64>,
    ) -> LabelResult<()> {
        attr.check_finite()?;
        if !self.has(kind, uid) {
            return Err(reject(WriteError::UnknownElement {
                kind,
                uid: uid.clone(),
            }));
        }
        if let Some(cs) = &attr.coordinate_system {
            self.check_coordinate_system(cs)?;
        }

        let Some(f) = frame else {
            if let Some(element) = self.elements[kind.index()].get_mut(uid) {
                element.touch_data_pointer(&attr, None);
                element.data.set(attr);
            }
            return Ok(());
        };

        if let Some(current) = self.current_frame {
            if f < current {
                return Err(reject(WriteError::OutOfOrderFrame { frame: f, current }));
            }
        }
        self.reference_in_frame(kind, uid, f);
        if let Some(element) = self.elements[kind.index()].get_mut(uid) {
            element.touch_data_pointer(&attr, Some(f));
        }
        self.timeline.entry(f).slot(kind, uid).data.set(attr);
        self.current_frame = Some(f);
        Ok(())
    }

    /// Sets an object attribute.
    ///
    /// # Errors
    ///
    /// See [`Document::add_data`].
    pub fn add_object_data(&mut self, uid: &Uid, attr: Attribute, frame: Option<u64>) -> LabelResult<()> {
        self.add_data(ElementKind::Object, uid, attr, frame)
    }

    /// Sets an action attribute.
    ///
    /// # Errors
    ///
    /// See [`Document::add_data`].
    pub fn add_action_data(&mut self, uid: &Uid, attr: Attribute, frame: Option<u64>) -> LabelResult<()> {
        self.add_data(ElementKind::Action, uid, attr, frame)
    }

    /// Sets an event attribute.
    ///
    /// # Errors
    ///
    /// See [`Document::add_data`].
    pub fn add_event_data(&mut self, uid: &Uid, attr: Attribute, frame: Option<u64>) -> LabelResult<()> {
        self.add_data(ElementKind::Event, uid, attr, frame)
    }

    /// Sets a context attribute.
    ///
    /// # Errors
    ///
    /// See [`Document::add_data`].
    pub fn add_context_data(&mut self, uid: &Uid, attr: Attribute, frame: Option<u64>) -> LabelResult<()> {
        self.add_data(ElementKind::Context, uid, attr, frame)
    }

    /// Sets a relation attribute.
    ///
    /// # Errors
    ///
    /// See [`Document::add_data`].
    pub fn add_relation_data(&mut self, uid: &Uid, attr: Attribute, frame: Option<u64>) -> LabelResult<()> {
        self.add_data(ElementKind::Relation, uid, attr, frame)
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Returns frame `frame`, creating it if needed.
    ///
    /// With `backfill`, missing frames between the nearest earlier frame and
    /// `frame` are created as well. Every created frame references the
    /// holistic elements.
    pub fn ensure_frame(&mut self, frame: u64, backfill: bool) -> &Frame {
        let created = self.timeline.ensure(frame, backfill, &self.holistic);
        if !created.is_empty() {
            self.stamp_holistic(&created, backfill);
            self.span.extend_span(frame);
            debug!(frame, created = created.len(), "frame added");
        }
        self.timeline.entry(frame)
    }

    /// Merges properties into `frames.<frame>.frame_properties`.
    ///
    /// Creates the frame if needed. The `"timestamp"`, `"streams"` and
    /// `"odometry"` keys in `properties` are ignored with a warning; pass
    /// the timestamp separately and use [`Document::add_stream_properties`]
    /// and [`Document::add_odometry`] for the others.
    pub fn add_frame_properties(
        &mut self,
        frame: u64,
        timestamp: Option<DateTime<Utc>>,
        properties: Map<String, Json>,
    ) {
        let props = self.frame_properties_mut(frame);
        if timestamp.is_some() {
            props.timestamp = timestamp;
        }
        for (key, value) in properties {
            if RESERVED_FRAME_KEYS.contains(&key.as_str()) {
                warn!(frame, key = %key, "reserved frame property key, ignoring");
                continue;
            }
            props.properties.insert(key, value);
        }
    }

    /// Frame properties of `frame`, created empty along with the frame.
    fn frame_properties_mut(&mut self, frame: u64) -> &mut FrameProperties {
        self.ensure_frame(frame, self.config.backfill_missing_frames);
        self.timeline
            .entry(frame)
            .properties
            .get_or_insert_with(Default::default)
    }

    /// Records the vehicle pose at `frame`, creating the frame if needed.
    /// A second call for the same frame replaces the pose.
    ///
    /// # Errors
    ///
    /// Returns a validation error (hard) for a pose that is not 16 finite
    /// values; nothing is created then.
    pub fn add_odometry(&mut self, frame: u64, odometry: Odometry) -> LabelResult<()> {
        odometry.validate()?;
        self.frame_properties_mut(frame).odometry = Some(odometry);
        Ok(())
    }

    /// References `uid` in `frame` and records the frame on the element.
    fn reference_in_frame(&mut self, kind: ElementKind, uid: &Uid, frame: u64) {
        self.ensure_frame(frame, self.config.backfill_missing_frames);
        self.timeline.entry(frame).slot(kind, uid);
        if let Some(element) = self.elements[kind.index()].get_mut(uid) {
            element.frame_intervals.update(frame);
        }
    }

    /// Extends the frame intervals of holistic elements over new frames.
    fn stamp_holistic(&mut self, created: &[u64], backfill: bool) {
        let (Some(&first), Some(&last)) = (created.first(), created.last()) else {
            return;
        };
        for (kind, uid) in self.holistic.iter() {
            let Some(element) = self.elements[kind.index()].get_mut(uid) else {
                continue;
            };
            let fis = &mut element.frame_intervals;
            if backfill && fis.last_frame().and_then(|end| end.checked_add(1)) == Some(first) {
                fis.update_no_gap(last);
            } else {
                for &f in created {
                    fis.update(f);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Registries and metadata
    // ------------------------------------------------------------------

    /// Registers an ontology source and returns its key.
    pub fn add_ontology(&mut self, source: impl Into<String>) -> String {
        self.ontologies.add(source)
    }

    /// Registers a coordinate system and returns its name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPose` unless `pose` is absent or
    /// holds 16 values.
    pub fn add_coordinate_system(
        &mut self,
        name: impl Into<String>,
        cs_type: impl Into<CoordinateSystemType>,
        parent: Option<&str>,
        pose: Option<Vec<f64>>,
    ) -> LabelResult<String> {
        self.coordinate_systems.add(name, cs_type, parent, pose)
    }

    fn check_coordinate_system(&self, name: &str) -> LabelResult<()> {
        if self.coordinate_systems.contains(name) {
            Ok(())
        } else {
            Err(reject(WriteError::UndeclaredCoordinateSystem {
                name: name.to_string(),
            }))
        }
    }

    /// Declares a stream and returns its name.
    ///
    /// Declaring a name again replaces its uri, description and type and
    /// keeps its properties.
    pub fn add_stream(
        &mut self,
        name: impl Into<String>,
        uri: impl Into<String>,
        description: impl Into<String>,
        stream_type: impl Into<StreamType>,
    ) -> String {
        self.streams.add(name, uri, description, stream_type)
    }

    /// Adds calibration, synchronization or free-form properties to a stream.
    ///
    /// When `properties.sync` names a document frame, the properties go to
    /// `frames.<frame>.frame_properties.streams.<stream>` and the frame is
    /// created if needed. Otherwise they are merged into the stream itself.
    /// Empty properties are ignored. These writes are not subject to the
    /// write-order check of [`Document::add_data`].
    ///
    /// # Errors
    ///
    /// Returns a validation error (hard) for malformed calibration or sync
    /// data and `WriteError::UnknownStream` (soft) for an undeclared stream.
    /// The document is unchanged in both cases.
    pub fn add_stream_properties(&mut self, stream: &str, properties: StreamProperties) -> LabelResult<()> {
        properties.validate()?;
        if properties.is_empty() {
            return Ok(());
        }
        if !self.streams.contains(stream) {
            return Err(reject(WriteError::UnknownStream {
                name: stream.to_string(),
            }));
        }
        match properties.target_frame() {
            Some(frame) => self
                .frame_properties_mut(frame)
                .streams
                .entry(stream.to_string())
                .or_insert_with(FrameStream::default)
                .stream_properties
                .merge(properties),
            None => {
                if let Some(entry) = self.streams.get_mut(stream) {
                    entry
                        .stream_properties
                        .get_or_insert_with(StreamProperties::default)
                        .merge(properties);
                }
            }
        }
        Ok(())
    }

    /// Sets `metadata.name`.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata.name = Some(name.into());
    }

    /// Sets `metadata.annotator`.
    pub fn set_annotator(&mut self, annotator: impl Into<String>) {
        self.metadata.annotator = Some(annotator.into());
    }

    /// Sets `metadata.comment`.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.metadata.comment = Some(comment.into());
    }

    /// Sets `metadata.file_version`.
    pub fn set_file_version(&mut self, version: impl Into<String>) {
        self.metadata.file_version = Some(version.into());
    }

    /// Merges custom key/value pairs into the metadata block.
    ///
    /// Keys that name a dedicated metadata field are skipped with a warning.
    pub fn add_metadata_properties(&mut self, properties: Map<String, Json>) {
        for (key, value) in properties {
            if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "reserved metadata key, use its setter");
                continue;
            }
            self.metadata.properties.insert(key, value);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// True if an element of `kind` with `uid` exists.
    #[must_use]
    pub fn has(&self, kind: ElementKind, uid: &Uid) -> bool {
        self.elements[kind.index()].contains_key(uid)
    }

    /// The element of `kind` with `uid`.
    #[must_use]
    pub fn get_element(&self, kind: ElementKind, uid: &Uid) -> Option<&Element> {
        self.elements[kind.index()].get(uid)
    }

    /// Elements of `kind`, ordered by uid.
    pub fn elements(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements[kind.index()].values()
    }

    /// Number of elements of `kind`.
    #[must_use]
    pub fn num_elements(&self, kind: ElementKind) -> usize {
        self.elements[kind.index()].len()
    }

    /// Uids of elements of `kind` with the given semantic type.
    #[must_use]
    pub fn elements_of_type(&self, kind: ElementKind, semantic_type: &str) -> Vec<Uid> {
        self.elements(kind)
            .filter(|e| e.semantic_type.as_deref() == Some(semantic_type))
            .map(|e| e.uid.clone())
            .collect()
    }

    /// Frame `frame`, if it exists.
    #[must_use]
    pub fn get_frame(&self, frame: u64) -> Option<&Frame> {
        self.timeline.get(frame)
    }

    /// Frames in ascending order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.timeline.iter()
    }

    /// Number of frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.timeline.len()
    }

    /// Document-level span, a single `[min, max]` interval once any frame exists.
    #[must_use]
    pub const fn frame_intervals(&self) -> &FrameIntervals {
        &self.span
    }

    /// Frames an element is active in. Empty for static elements.
    #[must_use]
    pub fn element_frame_intervals(&self, kind: ElementKind, uid: &Uid) -> Option<&FrameIntervals> {
        self.get_element(kind, uid).map(|e| &e.frame_intervals)
    }

    /// Attribute `name` of an element, either static or as written at `frame`.
    #[must_use]
    pub fn get_element_data(
        &self,
        kind: ElementKind,
        uid: &Uid,
        name: &str,
        frame: Option<u64>,
    ) -> Option<&Attribute> {
        match frame {
            Some(f) => self.timeline.get(f)?.element(kind, uid)?.data.get(name),
            None => self.get_element(kind, uid)?.data.get(name),
        }
    }

    /// Uids of elements of `kind` that carry an attribute called `name`.
    #[must_use]
    pub fn elements_with_data_name(&self, kind: ElementKind, name: &str) -> Vec<Uid> {
        self.elements(kind)
            .filter(|e| e.data_pointers.contains_key(name))
            .map(|e| e.uid.clone())
            .collect()
    }

    /// Frames at which attribute `name` of an element has been written.
    #[must_use]
    pub fn frames_with_data_name(&self, kind: ElementKind, uid: &Uid, name: &str) -> Option<&FrameIntervals> {
        self.get_element(kind, uid)?
            .data_pointers
            .get(name)
            .map(|p| &p.frame_intervals)
    }

    /// True if some element of `kind` has an attribute called `name` written
    /// at `frame`. With `uid`, only that element is looked at.
    #[must_use]
    pub fn has_frame_data_name(&self, kind: ElementKind, frame: u64, name: &str, uid: Option<&Uid>) -> bool {
        let Some(f) = self.timeline.get(frame) else {
            return false;
        };
        f.elements(kind)
            .iter()
            .filter(|(slot_uid, _)| match uid {
                Some(u) => u == *slot_uid,
                None => true,
            })
            .any(|(_, slot)| slot.data.contains_name(name))
    }

    /// Source of the ontology registered under `uid`.
    #[must_use]
    pub fn get_ontology(&self, uid: &str) -> Option<&str> {
        self.ontologies.get(uid)
    }

    /// The ontology table.
    #[must_use]
    pub const fn ontologies(&self) -> &Ontologies {
        &self.ontologies
    }

    /// The coordinate system called `name`.
    #[must_use]
    pub fn coordinate_system(&self, name: &str) -> Option<&CoordinateSystem> {
        self.coordinate_systems.get(name)
    }

    /// The coordinate system table.
    #[must_use]
    pub const fn coordinate_systems(&self) -> &CoordinateSystems {
        &self.coordinate_systems
    }

    /// The stream called `name`.
    #[must_use]
    pub fn get_stream(&self, name: &str) -> Option<&Stream> {
        self.streams.get(name)
    }

    /// The stream table.
    #[must_use]
    pub const fn streams(&self) -> &Streams {
        &self.streams
    }

    /// Properties of `stream` recorded at `frame`.
    #[must_use]
    pub fn frame_stream_properties(&self, frame: u64, stream: &str) -> Option<&StreamProperties> {
        self.timeline
            .get(frame)?
            .properties
            .as_ref()?
            .streams
            .get(stream)
            .map(|s| &s.stream_properties)
    }

    /// Vehicle pose recorded at `frame`.
    #[must_use]
    pub fn odometry(&self, frame: u64) -> Option<&Odometry> {
        self.timeline.get(frame)?.properties.as_ref()?.odometry.as_ref()
    }

    /// The metadata block.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// True if the element is stamped into every new frame.
    #[must_use]
    pub fn is_holistic(&self, kind: ElementKind, uid: &Uid) -> bool {
        self.holistic.contains(kind, uid)
    }

    /// Highest frame accepted so far for a frame-scoped attribute write.
    #[must_use]
    pub const fn current_frame(&self) -> Option<u64> {
        self.current_frame
    }

    /// Largest integer uid issued or accepted for `kind`.
    #[must_use]
    pub const fn last_uid(&self, kind: ElementKind) -> Option<u64> {
        self.uids.last_used(kind)
    }

    /// True once the document issues UUIDs.
    #[must_use]
    pub const fn uses_uuid(&self) -> bool {
        self.uids.uuid_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid::tests::CountingUuids;

    fn doc() -> Document {
        Document::with_uuid_source(DocumentConfig::default(), Box::new(CountingUuids::default())).unwrap()
    }

    fn intervals(doc: &Document, kind: ElementKind, uid: &Uid) -> Vec<(u64, u64)> {
        doc.element_frame_intervals(kind, uid).unwrap().to_pairs()
    }

    #[test]
    fn test_static_declaration() {
        let mut doc = doc();
        let uid = doc.add_object("marcos", ElementArgs::new().semantic_type("person"), None);
        assert_eq!(uid, Uid::Integer(0));
        let e = doc.get_element(ElementKind::Object, &uid).unwrap();
        assert!(e.is_static());
        assert_eq!(e.semantic_type.as_deref(), Some("person"));
        assert_eq!(doc.frame_count(), 0);
        assert!(!doc.is_holistic(ElementKind::Object, &uid));
    }

    #[test]
    fn test_redeclaration_keeps_identity_fields() {
        let mut doc = doc();
        let uid = doc.add_object("car", ElementArgs::new().semantic_type("car"), None);
        doc.add_object("truck", ElementArgs::new().uid(uid.clone()).semantic_type("truck"), Some(2));
        let e = doc.get_element(ElementKind::Object, &uid).unwrap();
        assert_eq!(e.name, "car");
        assert_eq!(e.semantic_type.as_deref(), Some("car"));
        assert!(e.is_dynamic());
        assert_eq!(doc.num_elements(ElementKind::Object), 1);
    }

    #[test]
    fn test_gap_aware_declarations_and_span() {
        let mut doc = doc();
        let a = doc.add_object("A", ElementArgs::new(), Some(0));
        for f in [1, 2, 5] {
            doc.add_object("A", ElementArgs::new().uid(a.clone()), Some(f));
        }
        let b = doc.add_object("B", ElementArgs::new(), Some(7));
        for f in [8, 9] {
            doc.add_object("B", ElementArgs::new().uid(b.clone()), Some(f));
        }
        doc.add_object("A", ElementArgs::new().uid(a.clone()), Some(5));
        doc.add_object("A", ElementArgs::new().uid(a.clone()), Some(5));

        assert_eq!(intervals(&doc, ElementKind::Object, &a), vec![(0, 2), (5, 5)]);
        assert_eq!(intervals(&doc, ElementKind::Object, &b), vec![(7, 9)]);
        assert_eq!(doc.frame_intervals().to_pairs(), vec![(0, 9)]);
        // Frames 3, 4 and 6 were back-filled.
        assert_eq!(doc.frame_count(), 10);
    }

    #[test]
    fn test_no_backfill_config() {
        let config = DocumentConfig {
            backfill_missing_frames: false,
            ..DocumentConfig::default()
        };
        let mut doc = Document::with_config(config).unwrap();
        doc.add_object("A", ElementArgs::new(), Some(0));
        doc.add_object("B", ElementArgs::new(), Some(4));
        assert_eq!(doc.frame_count(), 2);
        assert_eq!(doc.frame_intervals().to_pairs(), vec![(0, 4)]);
    }

    #[test]
    fn test_holistic_element_follows_new_frames() {
        let mut doc = doc();
        doc.add_object("car", ElementArgs::new(), Some(0));
        doc.add_object("car", ElementArgs::new().uid(0), Some(1));
        let ctx = doc.add_context("weather", ElementArgs::new().semantic_type("sunny"), None);

        assert!(doc.is_holistic(ElementKind::Context, &ctx));
        assert!(doc.get_frame(1).unwrap().contains(ElementKind::Context, &ctx));
        assert!(!doc.get_frame(0).unwrap().contains(ElementKind::Context, &ctx));
        assert_eq!(intervals(&doc, ElementKind::Context, &ctx), vec![(1, 1)]);

        doc.add_object("car", ElementArgs::new().uid(0), Some(4));
        for f in 2..=4 {
            assert!(doc.get_frame(f).unwrap().contains(ElementKind::Context, &ctx));
        }
        assert_eq!(intervals(&doc, ElementKind::Context, &ctx), vec![(1, 4)]);
    }

    #[test]
    fn test_static_element_redeclared_after_frames_becomes_holistic() {
        let mut doc = doc();
        let ctx = doc.add_context("scene", ElementArgs::new(), None);
        doc.add_object("car", ElementArgs::new(), Some(0));
        assert!(!doc.is_holistic(ElementKind::Context, &ctx));
        assert!(doc.get_element(ElementKind::Context, &ctx).unwrap().is_static());

        doc.add_context("scene", ElementArgs::new().uid(ctx.clone()), None);
        assert!(doc.is_holistic(ElementKind::Context, &ctx));
        assert!(doc.get_frame(0).unwrap().contains(ElementKind::Context, &ctx));
        assert_eq!(intervals(&doc, ElementKind::Context, &ctx), vec![(0, 0)]);

        doc.add_object("car", ElementArgs::new().uid(0), Some(2));
        assert!(doc.get_frame(2).unwrap().contains(ElementKind::Context, &ctx));
        assert_eq!(intervals(&doc, ElementKind::Context, &ctx), vec![(0, 2)]);
    }

    #[test]
    fn test_holistic_redeclaration_is_idempotent() {
        let mut doc = doc();
        doc.add_object("car", ElementArgs::new(), Some(3));
        let ctx = doc.add_context("weather", ElementArgs::new(), None);
        doc.add_context("weather", ElementArgs::new().uid(ctx.clone()), None);
        assert_eq!(doc.num_elements(ElementKind::Context), 1);
        assert_eq!(intervals(&doc, ElementKind::Context, &ctx), vec![(3, 3)]);
        assert_eq!(doc.get_frame(3).unwrap().num_references(), 2);
    }

    #[test]
    fn test_static_attribute_and_pointer() {
        let mut doc = doc();
        let uid = doc.add_object("marcos", ElementArgs::new(), None);
        doc.add_object_data(&uid, Attribute::bbox("head", [10.0, 10.0, 30.0, 30.0]), None)
            .unwrap();
        doc.add_object_data(&uid, Attribute::bbox("head", [11.0, 10.0, 30.0, 30.0]), None)
            .unwrap();

        let e = doc.get_element(ElementKind::Object, &uid).unwrap();
        assert!(e.is_static());
        assert_eq!(e.data.len(), 1);
        assert_eq!(
            doc.get_element_data(ElementKind::Object, &uid, "head", None)
                .and_then(|a| a.value.as_bbox()),
            Some([11.0, 10.0, 30.0, 30.0])
        );
        assert!(doc
            .frames_with_data_name(ElementKind::Object, &uid, "head")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_frame_attribute_makes_element_dynamic() {
        let mut doc = doc();
        let uid = doc.add_object("car", ElementArgs::new(), None);
        for f in [2, 3, 6] {
            doc.add_object_data(&uid, Attribute::num("speed", f as f64), Some(f)).unwrap();
        }
        assert_eq!(intervals(&doc, ElementKind::Object, &uid), vec![(2, 3), (6, 6)]);
        assert_eq!(
            doc.frames_with_data_name(ElementKind::Object, &uid, "speed").unwrap().to_pairs(),
            vec![(2, 3), (6, 6)]
        );
        assert_eq!(
            doc.get_element_data(ElementKind::Object, &uid, "speed", Some(3))
                .and_then(|a| a.value.as_num()),
            Some(3.0)
        );
        assert!(doc.get_element_data(ElementKind::Object, &uid, "speed", None).is_none());
        assert_eq!(doc.elements_with_data_name(ElementKind::Object, "speed"), vec![uid]);
        assert_eq!(doc.current_frame(), Some(6));
    }

    #[test]
    fn test_out_of_order_write_is_discarded() {
        let mut doc = doc();
        let uid = doc.add_object("car", ElementArgs::new(), None);
        doc.add_object_data(&uid, Attribute::num("speed", 1.0), Some(5)).unwrap();

        let err = doc
            .add_object_data(&uid, Attribute::num("speed", 2.0), Some(3))
            .unwrap_err();
        assert!(err.is_soft());
        assert_eq!(err.as_write(), Some(&WriteError::OutOfOrderFrame { frame: 3, current: 5 }));
        assert!(doc.get_frame(3).is_none());
        assert_eq!(doc.current_frame(), Some(5));

        // Same frame is still accepted.
        doc.add_object_data(&uid, Attribute::num("speed", 3.0), Some(5)).unwrap();
    }

    #[test]
    fn test_unknown_element_is_soft() {
        let mut doc = doc();
        let err = doc
            .add_action_data(&Uid::Integer(9), Attribute::boolean("ok", true), None)
            .unwrap_err();
        assert_eq!(
            err.as_write(),
            Some(&WriteError::UnknownElement {
                kind: ElementKind::Action,
                uid: Uid::Integer(9),
            })
        );
    }

    #[test]
    fn test_undeclared_coordinate_system() {
        let mut doc = doc();
        let uid = doc.add_object("car", ElementArgs::new().coordinate_system("odom"), None);
        assert!(doc.get_element(ElementKind::Object, &uid).unwrap().coordinate_system.is_none());

        let attr = Attribute::point3d("center", [0.0, 0.0, 0.0]).in_coordinate_system("odom");
        let err = doc.add_object_data(&uid, attr.clone(), None).unwrap_err();
        assert!(matches!(err.as_write(), Some(WriteError::UndeclaredCoordinateSystem { .. })));

        doc.add_coordinate_system("odom", "scene_cs", None, None).unwrap();
        doc.add_object_data(&uid, attr, None).unwrap();
    }

    #[test]
    fn test_unknown_ontology_is_dropped() {
        let mut doc = doc();
        let ont = doc.add_ontology("http://ontology/a");
        let known = doc.add_object("a", ElementArgs::new().ontology_uid(ont.clone()), None);
        let unknown = doc.add_object("b", ElementArgs::new().ontology_uid("7"), None);
        assert_eq!(
            doc.get_element(ElementKind::Object, &known).unwrap().ontology_uid,
            Some(ont)
        );
        assert!(doc.get_element(ElementKind::Object, &unknown).unwrap().ontology_uid.is_none());
    }

    #[test]
    fn test_uuid_mode_latches() {
        let mut doc = doc();
        assert_eq!(doc.add_object("a", ElementArgs::new(), None), Uid::Integer(0));
        doc.declare_str(
            ElementKind::Object,
            "b",
            "3d4705a6-6a54-4c5c-9f33-bbb21cc5d576",
            ElementArgs::new(),
            None,
        )
        .unwrap();
        assert!(doc.uses_uuid());
        assert_eq!(
            doc.add_action("run", ElementArgs::new(), None),
            Uid::Uuid("00000000-0000-4000-8000-000000000001".to_string())
        );
    }

    #[test]
    fn test_declare_str_rejects_malformed() {
        let mut doc = doc();
        let err = doc
            .declare_str(ElementKind::Object, "x", "12a", ElementArgs::new(), None)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(doc.num_elements(ElementKind::Object), 0);
        assert_eq!(doc.last_uid(ElementKind::Object), None);
    }

    #[test]
    fn test_relations_and_rdf() {
        let mut doc = doc();
        let car = doc.add_object("car", ElementArgs::new(), Some(0));
        let road = doc.add_object("road", ElementArgs::new(), None);
        let rel = doc
            .add_relation_subject_object(
                "on",
                ElementArgs::new().semantic_type("isOn"),
                (ElementKind::Object, car.clone()),
                (ElementKind::Object, road.clone()),
                None,
            )
            .unwrap();
        let relation = doc.get_element(ElementKind::Relation, &rel).unwrap();
        assert_eq!(relation.rdf(RdfRole::Subject)[0].uid, car);
        assert_eq!(relation.rdf(RdfRole::Object)[0].uid, road);
        assert!(doc.is_relation_at_frame(&rel, 0));
        assert!(!doc.is_relation_at_frame(&rel, 1));

        let err = doc
            .add_relation_subject_object(
                "near",
                ElementArgs::new(),
                (ElementKind::Object, car),
                (ElementKind::Object, Uid::Integer(40)),
                None,
            )
            .unwrap_err();
        assert!(err.is_soft());
        assert_eq!(doc.num_elements(ElementKind::Relation), 1);
    }

    #[test]
    fn test_frame_properties_and_metadata() {
        let mut doc = doc();
        let ts: DateTime<Utc> = "2020-04-11T12:00:01Z".parse().unwrap();
        let mut props = Map::new();
        props.insert("gps".to_string(), serde_json::json!([41.2, 2.1]));
        props.insert("timestamp".to_string(), serde_json::json!("ignored"));
        doc.add_frame_properties(3, Some(ts), props);

        let p = doc.get_frame(3).unwrap().properties.as_ref().unwrap();
        assert_eq!(p.timestamp, Some(ts));
        assert_eq!(p.properties.len(), 1);
        assert_eq!(doc.current_frame(), None);

        doc.set_annotator("jdoe");
        let mut meta = Map::new();
        meta.insert("recorded_at".to_string(), serde_json::json!("night"));
        meta.insert("annotator".to_string(), serde_json::json!("other"));
        doc.add_metadata_properties(meta);
        assert_eq!(doc.metadata().annotator.as_deref(), Some("jdoe"));
        assert_eq!(doc.metadata().properties.len(), 1);
    }

    #[test]
    fn test_non_finite_write_is_hard_and_changes_nothing() {
        let mut doc = doc();
        let uid = doc.add_object("car", ElementArgs::new(), None);
        let err = doc
            .add_object_data(&uid, Attribute::num("speed", f64::NAN), Some(2))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!err.is_soft());
        assert_eq!(doc.frame_count(), 0);
        assert_eq!(doc.current_frame(), None);
        assert!(doc.get_element(ElementKind::Object, &uid).unwrap().data_pointers.is_empty());

        // Checked before the element lookup.
        let err = doc
            .add_object_data(&Uid::Integer(9), Attribute::vec("v", vec![f64::INFINITY]), None)
            .unwrap_err();
        assert!(err.is_validation());
    }

    fn identity() -> Vec<f64> {
        (0..16).map(|i| if i % 5 == 0 { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_static_stream_properties_merge_into_stream() {
        let mut doc = doc();
        doc.add_stream("CAM_FRONT", "./front.mp4", "front camera", StreamType::Camera);
        doc.add_stream_properties(
            "CAM_FRONT",
            StreamProperties::new().extrinsics(crate::stream::Extrinsics::new(identity()).unwrap()),
        )
        .unwrap();
        doc.add_stream_properties(
            "CAM_FRONT",
            StreamProperties::new()
                .sync(crate::stream::StreamSync::shift(2))
                .property("fps", serde_json::json!(30)),
        )
        .unwrap();

        let props = doc.get_stream("CAM_FRONT").unwrap().stream_properties.as_ref().unwrap();
        assert!(props.extrinsics.is_some());
        assert_eq!(props.sync.as_ref().and_then(|s| s.frame_shift), Some(2));
        assert_eq!(props.properties.get("fps"), Some(&serde_json::json!(30)));
        assert_eq!(doc.frame_count(), 0);
        assert_eq!(doc.streams().len(), 1);
    }

    #[test]
    fn test_frame_stream_properties_go_to_the_frame() {
        let mut doc = doc();
        doc.add_stream("CAM_FRONT", "", "", "camera");
        let uid = doc.add_object("car", ElementArgs::new(), None);
        doc.add_object_data(&uid, Attribute::num("speed", 1.0), Some(5)).unwrap();

        // Earlier than the write pointer, still accepted.
        let sync = crate::stream::StreamSync::at_frame(3).frame_stream(4);
        doc.add_stream_properties("CAM_FRONT", StreamProperties::new().sync(sync)).unwrap();

        let props = doc.frame_stream_properties(3, "CAM_FRONT").unwrap();
        assert_eq!(props.sync.as_ref().and_then(|s| s.frame_stream), Some(4));
        assert!(doc.get_stream("CAM_FRONT").unwrap().stream_properties.is_none());
        assert_eq!(doc.current_frame(), Some(5));
    }

    #[test]
    fn test_stream_property_failures() {
        let mut doc = doc();
        let err = doc
            .add_stream_properties("LIDAR", StreamProperties::new().property("rpm", serde_json::json!(600)))
            .unwrap_err();
        assert_eq!(
            err.as_write(),
            Some(&WriteError::UnknownStream {
                name: "LIDAR".to_string()
            })
        );

        doc.add_stream("LIDAR", "", "", StreamType::Lidar);
        let bad_sync = crate::stream::StreamSync::shift(1).frame_stream(3);
        let err = doc
            .add_stream_properties("LIDAR", StreamProperties::new().sync(bad_sync))
            .unwrap_err();
        assert!(err.is_validation());

        doc.add_stream_properties("LIDAR", StreamProperties::new()).unwrap();
        assert!(doc.get_stream("LIDAR").unwrap().stream_properties.is_none());
        assert_eq!(doc.frame_count(), 0);
    }

    #[test]
    fn test_odometry_per_frame() {
        let mut doc = doc();
        doc.add_odometry(2, Odometry::new(identity()).unwrap()).unwrap();
        assert_eq!(doc.odometry(2).unwrap().pose_lcs_wrt_wcs_4x4, identity());
        assert!(doc.odometry(1).is_none());

        let mut bad = Odometry::new(identity()).unwrap();
        bad.pose_lcs_wrt_wcs_4x4.pop();
        assert!(doc.add_odometry(4, bad).unwrap_err().is_validation());
        assert!(doc.get_frame(4).is_none());
    }

    #[test]
    fn test_reserved_frame_property_keys_are_skipped() {
        let mut doc = doc();
        let mut props = Map::new();
        props.insert("streams".to_string(), serde_json::json!({"CAM": {}}));
        props.insert("odometry".to_string(), serde_json::json!({}));
        props.insert("weather".to_string(), serde_json::json!("rain"));
        doc.add_frame_properties(0, None, props);

        let p = doc.get_frame(0).unwrap().properties.as_ref().unwrap();
        assert!(p.streams.is_empty());
        assert!(p.odometry.is_none());
        assert_eq!(p.properties.len(), 1);
    }

    #[test]
    fn test_has_frame_data_name() {
        let mut doc = doc();
        let a = doc.add_object("a", ElementArgs::new(), Some(0));
        let b = doc.add_object("b", ElementArgs::new(), Some(0));
        doc.add_object_data(&b, Attribute::bbox("shape", [0.0, 0.0, 1.0, 1.0]), Some(1))
            .unwrap();

        assert!(doc.has_frame_data_name(ElementKind::Object, 1, "shape", None));
        assert!(doc.has_frame_data_name(ElementKind::Object, 1, "shape", Some(&b)));
        assert!(!doc.has_frame_data_name(ElementKind::Object, 1, "shape", Some(&a)));
        assert!(!doc.has_frame_data_name(ElementKind::Object, 0, "shape", None));
        assert!(!doc.has_frame_data_name(ElementKind::Action, 1, "shape", None));
        assert!(!doc.has_frame_data_name(ElementKind::Object, 9, "shape", None));
    }

    #[test]
    fn test_elements_of_type() {
        let mut doc = doc();
        doc.add_object("a", ElementArgs::new().semantic_type("car"), None);
        doc.add_object("b", ElementArgs::new().semantic_type("person"), None);
        doc.add_object("c", ElementArgs::new().semantic_type("car"), None);
        assert_eq!(
            doc.elements_of_type(ElementKind::Object, "car"),
            vec![Uid::Integer(0), Uid::Integer(2)]
        );
    }
}
