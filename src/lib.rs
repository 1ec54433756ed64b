//! # openlabel - Time-indexed annotation documents
//!
//! openlabel builds and maintains an in-memory annotation document that
//! describes elements observed across a sequence of frames, and converts it
//! to and from a structured JSON tree.
//!
//! ## Core Concepts
//!
//! - **Element**: an object, action, event, context or relation, identified
//!   per kind by a [`Uid`]
//! - **Frame**: one instant of the sequence, created the first time it is referenced
//! - **Frame intervals**: the frames an element is active in; empty means static
//! - **Holistic element**: declared (or redeclared) without a frame once frames
//!   exist, it is referenced by every frame created afterwards
//! - **Stream**: a sensor the annotations refer to, with calibration and
//!   synchronization properties, static or per frame
//! - **Attribute**: a named, typed value set statically or at a frame
//!
//! ## Usage
//!
//! ```rust
//! use openlabel::{Attribute, Document, ElementArgs, ElementKind};
//!
//! let mut doc = Document::new();
//! let car = doc.add_object("car", ElementArgs::new().semantic_type("car"), Some(0));
//! doc.add_object_data(&car, Attribute::bbox("shape", [10.0, 10.0, 40.0, 20.0]), Some(1))
//!     .unwrap();
//!
//! assert_eq!(doc.element_frame_intervals(ElementKind::Object, &car).unwrap().to_pairs(), vec![(0, 1)]);
//!
//! let tree = doc.to_tree();
//! let loaded = openlabel::Document::from_tree(&tree).unwrap();
//! assert_eq!(loaded.to_tree(), tree);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute;
pub mod config;
pub mod document;
pub mod element;
pub mod error;
pub mod frame;
pub mod frame_interval;
pub mod metadata;
pub mod poly2d;
pub mod registry;
pub mod stream;
pub mod tree;
pub mod uid;

// Re-export primary types at crate root for convenience
pub use attribute::{Attribute, AttributeKind, AttributeSet, AttributeValue, Poly2dVal};
pub use config::{DocumentConfig, ROOT_KEY, SCHEMA_VERSION};
pub use document::Document;
pub use element::{DataPointer, Element, ElementArgs, ElementKind, RdfRef, RdfRole};
pub use error::{FormatError, LabelError, LabelResult, ValidationError, WriteError};
pub use frame::{Frame, FrameElement, FrameProperties, HolisticRegistry, Timeline};
pub use frame_interval::{FrameInterval, FrameIntervals};
pub use metadata::Metadata;
pub use poly2d::{compute_srf6dcc, pack_chain_code, simplify, unpack_chain_code, ChainCode};
pub use registry::{CoordinateSystem, CoordinateSystemType, CoordinateSystems, Ontologies};
pub use stream::{
    Extrinsics, FrameStream, Intrinsics, IntrinsicsFisheye, IntrinsicsPinhole, Odometry, Stream, StreamProperties,
    StreamSync, StreamType, Streams,
};
pub use uid::{parse_uid, RandomUuids, Uid, UidAllocator, UuidSource};
