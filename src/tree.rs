//! Conversion between a [`Document`] and its structured tree.
//!
//! The tree is a `serde_json::Value` rooted at `"openlabel"`. Rendering never
//! fails; rebuilding validates shapes and identifiers and fails hard on the
//! first problem.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value as Json};
use tracing::{debug, warn};

use crate::attribute::{AttributeKind, AttributeSet};
use crate::config::{DocumentConfig, ROOT_KEY};
use crate::document::Document;
use crate::element::{DataPointer, Element, ElementKind, RdfRef};
use crate::error::{FormatError, LabelResult, ValidationError};
use crate::frame::{Frame, FrameProperties};
use crate::frame_interval::FrameIntervals;
use crate::metadata::Metadata;
use crate::registry::{check_pose, CoordinateSystem};
use crate::stream::Stream;
use crate::uid::{parse_uid, RandomUuids, Uid};

impl Document {
    /// Renders the document as a structured tree.
    #[must_use]
    pub fn to_tree(&self) -> Json {
        let mut root = Map::new();
        root.insert("metadata".to_string(), to_json(&self.metadata));
        if !self.span.is_empty() {
            root.insert("frame_intervals".to_string(), to_json(&self.span));
        }
        for kind in ElementKind::ALL {
            let table = &self.elements[kind.index()];
            if table.is_empty() {
                continue;
            }
            let nodes: Map<String, Json> = table
                .iter()
                .map(|(uid, element)| (uid.to_string(), Json::Object(element_node(element))))
                .collect();
            root.insert(kind.plural().to_string(), Json::Object(nodes));
        }
        if !self.timeline.is_empty() {
            let frames: Map<String, Json> = self
                .timeline
                .iter()
                .map(|frame| (frame.index().to_string(), Json::Object(frame_node(frame))))
                .collect();
            root.insert("frames".to_string(), Json::Object(frames));
        }
        if !self.ontologies.is_empty() {
            let onts: Map<String, Json> = self
                .ontologies
                .iter()
                .map(|(uid, source)| (uid.to_string(), json!(source)))
                .collect();
            root.insert("ontologies".to_string(), Json::Object(onts));
        }
        if !self.coordinate_systems.is_empty() {
            let systems: Map<String, Json> = self
                .coordinate_systems
                .iter()
                .map(|(name, cs)| (name.to_string(), to_json(cs)))
                .collect();
            root.insert("coordinate_systems".to_string(), Json::Object(systems));
        }
        if !self.streams.is_empty() {
            let streams: Map<String, Json> = self
                .streams
                .iter()
                .map(|(name, stream)| (name.to_string(), to_json(stream)))
                .collect();
            root.insert("streams".to_string(), Json::Object(streams));
        }
        json!({ ROOT_KEY: root })
    }

    /// Renders one frame.
    ///
    /// With `dynamic_only` this is the frame's own node. Otherwise every
    /// element referenced in the frame is completed with its static record
    /// (without `frame_intervals`), its static attributes overridden by the
    /// ones written at this frame, and static elements are included too.
    /// Returns `None` with a warning for a frame that does not exist.
    #[must_use]
    pub fn frame_to_tree(&self, frame: u64, dynamic_only: bool) -> Option<Json> {
        let Some(f) = self.timeline.get(frame) else {
            warn!(frame, "frame does not exist");
            return None;
        };
        let mut node = frame_node(f);
        if dynamic_only {
            return Some(Json::Object(node));
        }
        for kind in ElementKind::ALL {
            let mut entries = match node.remove(kind.plural()) {
                Some(Json::Object(entries)) => entries,
                _ => Map::new(),
            };
            for element in self.elements(kind) {
                let slot = f.element(kind, &element.uid);
                if slot.is_none() && !element.is_static() {
                    continue;
                }
                let mut entry = element_node(element);
                entry.remove("frame_intervals");
                if let Some(slot) = slot.filter(|s| !s.data.is_empty()) {
                    let mut data = element.data.clone();
                    for attr in slot.data.iter() {
                        data.set(attr.clone());
                    }
                    entry.insert(kind.data_key().to_string(), data.to_tree());
                }
                entries.insert(element.uid.to_string(), Json::Object(entry));
            }
            if !entries.is_empty() {
                node.insert(kind.plural().to_string(), Json::Object(entries));
            }
        }
        Some(Json::Object(node))
    }

    /// Serializes one frame to JSON text; see [`Document::frame_to_tree`].
    ///
    /// # Errors
    ///
    /// Returns a `FormatError` if serialization fails.
    pub fn frame_to_json_string(&self, frame: u64, dynamic_only: bool, pretty: bool) -> LabelResult<Option<String>> {
        let Some(tree) = self.frame_to_tree(frame, dynamic_only) else {
            return Ok(None);
        };
        let text = if pretty {
            serde_json::to_string_pretty(&tree)?
        } else {
            serde_json::to_string(&tree)?
        };
        Ok(Some(text))
    }

    /// Rebuilds a document from a structured tree.
    ///
    /// Identifier counters and the UUID mode are recomputed from the loaded
    /// uids. The write-order pointer and the holistic registry start empty.
    ///
    /// # Errors
    ///
    /// Returns a `FormatError` for a missing root or a malformed node and a
    /// `ValidationError` for malformed identifiers, intervals or payloads.
    pub fn from_tree(tree: &Json) -> LabelResult<Self> {
        let root = tree
            .get(ROOT_KEY)
            .ok_or_else(|| FormatError::MissingRoot {
                root: ROOT_KEY.to_string(),
            })?
            .as_object()
            .ok_or_else(|| FormatError::shape(ROOT_KEY, "object"))?;

        let metadata: Metadata = match root.get("metadata") {
            Some(node) => {
                if node.get("schema_version").is_none() {
                    return Err(ValidationError::MissingField {
                        field: "metadata.schema_version".to_string(),
                    }
                    .into());
                }
                from_json(node)?
            }
            None => Metadata::default(),
        };
        let config = DocumentConfig {
            schema_version: metadata.schema_version.clone(),
            ..DocumentConfig::default()
        };
        let mut doc = Self::build(config, Box::new(RandomUuids));
        doc.metadata = metadata;

        if let Some(node) = root.get("frame_intervals") {
            let stored = intervals_from_tree(node, "frame_intervals")?;
            if let (Some(first), Some(last)) = (stored.first_frame(), stored.last_frame()) {
                doc.span.extend_span(first);
                doc.span.extend_span(last);
            }
        }

        for kind in ElementKind::ALL {
            let Some(node) = root.get(kind.plural()) else {
                continue;
            };
            let table = node
                .as_object()
                .ok_or_else(|| FormatError::shape(kind.plural(), "object"))?;
            for (key, element_node) in table {
                let uid = parse_uid(key)?;
                let path = format!("{}.{key}", kind.plural());
                let element = element_from_tree(kind, uid.clone(), element_node, &path)?;
                doc.uids.observe(kind, &uid);
                doc.elements[kind.index()].insert(uid, element);
            }
        }
        if doc.uids.uuid_mode() {
            doc.config.use_uuid = true;
        }

        if let Some(node) = root.get("frames") {
            let frames = node
                .as_object()
                .ok_or_else(|| FormatError::shape("frames", "object"))?;
            for (key, frame_node) in frames {
                let index: u64 = key
                    .parse()
                    .map_err(|_| FormatError::shape(format!("frames.{key}"), "frame index"))?;
                let frame = frame_from_tree(index, frame_node, &format!("frames.{key}"))?;
                doc.span.extend_span(index);
                doc.timeline.insert(frame);
            }
        }

        if let Some(node) = root.get("ontologies") {
            let onts: BTreeMap<String, String> = from_json(node)?;
            for (uid, source) in onts {
                doc.ontologies.insert(uid, source);
            }
        }

        if let Some(node) = root.get("coordinate_systems") {
            let systems: BTreeMap<String, CoordinateSystem> = from_json(node)?;
            for (name, cs) in systems {
                if !cs.pose_wrt_parent.is_empty() {
                    check_pose("pose_wrt_parent", &cs.pose_wrt_parent)?;
                }
                doc.coordinate_systems.insert(name, cs);
            }
        }

        if let Some(node) = root.get("streams") {
            let streams: BTreeMap<String, Stream> = from_json(node)?;
            for (name, stream) in streams {
                if let Some(props) = &stream.stream_properties {
                    props.validate()?;
                }
                doc.streams.insert(name, stream);
            }
        }

        debug!(
            frames = doc.timeline.len(),
            uuid_mode = doc.uids.uuid_mode(),
            "document loaded"
        );
        Ok(doc)
    }

    /// Serializes the tree to JSON text.
    ///
    /// # Errors
    ///
    /// Returns a `FormatError` if serialization fails.
    pub fn to_json_string(&self, pretty: bool) -> LabelResult<String> {
        let tree = self.to_tree();
        let text = if pretty {
            serde_json::to_string_pretty(&tree)?
        } else {
            serde_json::to_string(&tree)?
        };
        Ok(text)
    }

    /// Parses JSON text and rebuilds the document.
    ///
    /// # Errors
    ///
    /// Returns a `FormatError` for invalid JSON, otherwise as [`Document::from_tree`].
    pub fn from_json_str(text: &str) -> LabelResult<Self> {
        let tree: Json = serde_json::from_str(text)?;
        Self::from_tree(&tree)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Json {
    // Plain data records with string keys only.
    serde_json::to_value(value).unwrap_or(Json::Null)
}

fn from_json<T: DeserializeOwned>(node: &Json) -> Result<T, FormatError> {
    Ok(T::deserialize(node)?)
}

fn element_node(element: &Element) -> Map<String, Json> {
    let mut node = Map::new();
    node.insert("name".to_string(), json!(element.name));
    if let Some(t) = &element.semantic_type {
        node.insert("type".to_string(), json!(t));
    }
    if let Some(ont) = &element.ontology_uid {
        node.insert("ontology_uid".to_string(), json!(ont));
    }
    if let Some(cs) = &element.coordinate_system {
        node.insert("coordinate_system".to_string(), json!(cs));
    }
    if !element.frame_intervals.is_empty() {
        node.insert("frame_intervals".to_string(), to_json(&element.frame_intervals));
    }
    if !element.data.is_empty() {
        node.insert(element.kind.data_key().to_string(), element.data.to_tree());
    }
    if !element.data_pointers.is_empty() {
        let pointers: Map<String, Json> = element
            .data_pointers
            .iter()
            .map(|(name, p)| {
                (
                    name.clone(),
                    json!({
                        "type": p.kind.as_str(),
                        "frame_intervals": to_json(&p.frame_intervals),
                    }),
                )
            })
            .collect();
        node.insert(element.kind.pointers_key().to_string(), Json::Object(pointers));
    }
    if element.kind == ElementKind::Relation {
        node.insert("rdf_subjects".to_string(), to_json(&element.rdf_subjects));
        node.insert("rdf_objects".to_string(), to_json(&element.rdf_objects));
    }
    node
}

fn element_from_tree(kind: ElementKind, uid: Uid, node: &Json, path: &str) -> LabelResult<Element> {
    let obj = node.as_object().ok_or_else(|| FormatError::shape(path, "object"))?;
    let name = obj
        .get("name")
        .ok_or_else(|| ValidationError::MissingField {
            field: format!("{path}.name"),
        })?
        .as_str()
        .ok_or_else(|| FormatError::shape(format!("{path}.name"), "string"))?;
    let optional = |key: &str| -> Result<Option<String>, FormatError> {
        obj.get(key)
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| FormatError::shape(format!("{path}.{key}"), "string"))
            })
            .transpose()
    };

    let mut element = Element::new(kind, uid, name);
    element.semantic_type = optional("type")?;
    element.ontology_uid = optional("ontology_uid")?;
    element.coordinate_system = optional("coordinate_system")?;
    if let Some(fis) = obj.get("frame_intervals") {
        element.frame_intervals = intervals_from_tree(fis, &format!("{path}.frame_intervals"))?;
    }
    if let Some(data) = obj.get(kind.data_key()) {
        element.data = AttributeSet::from_tree(data, &format!("{path}.{}", kind.data_key()))?;
    }
    if let Some(pointers) = obj.get(kind.pointers_key()) {
        let pointers_path = format!("{path}.{}", kind.pointers_key());
        let pointers = pointers
            .as_object()
            .ok_or_else(|| FormatError::shape(&pointers_path, "object"))?;
        for (name, p) in pointers {
            let p_path = format!("{pointers_path}.{name}");
            let attr_kind: AttributeKind = p
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| FormatError::shape(format!("{p_path}.type"), "string"))?
                .parse()?;
            let frame_intervals = match p.get("frame_intervals") {
                Some(fis) => intervals_from_tree(fis, &format!("{p_path}.frame_intervals"))?,
                None => FrameIntervals::new(),
            };
            element.data_pointers.insert(
                name.clone(),
                DataPointer {
                    kind: attr_kind,
                    frame_intervals,
                },
            );
        }
    }
    if kind == ElementKind::Relation {
        if let Some(node) = obj.get("rdf_subjects") {
            element.rdf_subjects = from_json::<Vec<RdfRef>>(node)?;
        }
        if let Some(node) = obj.get("rdf_objects") {
            element.rdf_objects = from_json::<Vec<RdfRef>>(node)?;
        }
    }
    Ok(element)
}

fn frame_node(frame: &Frame) -> Map<String, Json> {
    let mut node = Map::new();
    for kind in ElementKind::ALL {
        let slots = frame.elements(kind);
        if slots.is_empty() {
            continue;
        }
        let entries: Map<String, Json> = slots
            .iter()
            .map(|(uid, slot)| {
                let mut entry = Map::new();
                if !slot.data.is_empty() {
                    entry.insert(kind.data_key().to_string(), slot.data.to_tree());
                }
                (uid.to_string(), Json::Object(entry))
            })
            .collect();
        node.insert(kind.plural().to_string(), Json::Object(entries));
    }
    if let Some(props) = &frame.properties {
        node.insert("frame_properties".to_string(), to_json(props));
    }
    node
}

fn frame_from_tree(index: u64, node: &Json, path: &str) -> LabelResult<Frame> {
    let obj = node.as_object().ok_or_else(|| FormatError::shape(path, "object"))?;
    let mut frame = Frame::new(index);
    for kind in ElementKind::ALL {
        let Some(slots) = obj.get(kind.plural()) else {
            continue;
        };
        let slots_path = format!("{path}.{}", kind.plural());
        let slots = slots
            .as_object()
            .ok_or_else(|| FormatError::shape(&slots_path, "object"))?;
        for (key, slot_node) in slots {
            let uid = parse_uid(key)?;
            let slot = frame.slot(kind, &uid);
            if let Some(data) = slot_node.get(kind.data_key()) {
                slot.data = AttributeSet::from_tree(data, &format!("{slots_path}.{key}.{}", kind.data_key()))?;
            }
        }
    }
    if let Some(props) = obj.get("frame_properties") {
        let mut props = from_json::<FrameProperties>(props)?;
        for entry in props.streams.values_mut() {
            let stream_props = &mut entry.stream_properties;
            if let Some(sync) = &mut stream_props.sync {
                sync.frame = Some(index);
            }
            stream_props.validate()?;
        }
        if let Some(odometry) = &props.odometry {
            odometry.validate()?;
        }
        frame.properties = Some(props);
    }
    Ok(frame)
}

fn intervals_from_tree(node: &Json, path: &str) -> LabelResult<FrameIntervals> {
    let items = node
        .as_array()
        .ok_or_else(|| FormatError::shape(path, "array of frame intervals"))?;
    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let bound = |key: &str| {
            item.get(key)
                .and_then(Json::as_u64)
                .ok_or_else(|| FormatError::shape(format!("{path}.{key}"), "unsigned integer"))
        };
        pairs.push((bound("frame_start")?, bound("frame_end")?));
    }
    Ok(FrameIntervals::from_pairs(&pairs)?)
}
