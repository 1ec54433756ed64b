//! Ontology and coordinate-system tables.
//!
//! Both tables deduplicate: registering the same ontology text or the same
//! coordinate-system name twice returns the existing identifier.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LabelResult, ValidationError, WriteError};

/// Number of floats in a row-major 4x4 pose matrix.
pub const POSE_LEN: usize = 16;

/// Rejects NaN and infinities in `values`.
pub(crate) fn check_finite(field: &str, values: &[f64]) -> Result<(), ValidationError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ValidationError::NonFiniteValue {
            field: field.to_string(),
        })
    }
}

/// Checks a 4x4 pose: exactly [`POSE_LEN`] finite values.
pub(crate) fn check_pose(field: &str, pose: &[f64]) -> Result<(), ValidationError> {
    if pose.len() != POSE_LEN {
        return Err(ValidationError::InvalidPose { len: pose.len() });
    }
    check_finite(field, pose)
}

/// Ontology sources keyed by sequential string identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ontologies {
    entries: BTreeMap<String, String>,
}

impl Ontologies {
    /// Registers `source` and returns its key.
    ///
    /// An already registered source logs a warning and returns its key.
    pub fn add(&mut self, source: impl Into<String>) -> String {
        let source = source.into();
        if let Some(uid) = self.find(&source) {
            warn!(uid = %uid, source = %source, "{}", WriteError::DuplicateOntology { uid: uid.to_string() });
            return uid.to_string();
        }
        let uid = self.next_key().to_string();
        self.entries.insert(uid.clone(), source);
        uid
    }

    /// Inserts an entry read back from a tree.
    pub(crate) fn insert(&mut self, uid: String, source: String) {
        self.entries.insert(uid, source);
    }

    fn find(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, s)| s.as_str() == source)
            .map(|(uid, _)| uid.as_str())
    }

    fn next_key(&self) -> u64 {
        self.entries
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .map_or(0, |n| n + 1)
    }

    /// Source registered under `uid`.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<&str> {
        self.entries.get(uid).map(String::as_str)
    }

    /// True if `uid` is registered.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    /// Number of registered ontologies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no ontology is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(uid, source)` pairs ordered by uid.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Kind of a coordinate system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CoordinateSystemType {
    /// Attached to a sensor.
    Sensor,
    /// Local frame such as a vehicle body.
    Local,
    /// World or scene frame.
    Scene,
    /// UTM geographic frame.
    GeoUtm,
    /// Anything else, stored verbatim.
    Custom(String),
}

impl CoordinateSystemType {
    /// Tag written in the tree.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sensor => "sensor_cs",
            Self::Local => "local_cs",
            Self::Scene => "scene_cs",
            Self::GeoUtm => "geo_utm",
            Self::Custom(s) => s,
        }
    }
}

impl fmt::Display for CoordinateSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for CoordinateSystemType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "sensor_cs" => Self::Sensor,
            "local_cs" => Self::Local,
            "scene_cs" => Self::Scene,
            "geo_utm" => Self::GeoUtm,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for CoordinateSystemType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<CoordinateSystemType> for String {
    fn from(t: CoordinateSystemType) -> Self {
        match t {
            CoordinateSystemType::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// A registered coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    /// Kind of the system.
    #[serde(rename = "type")]
    pub cs_type: CoordinateSystemType,
    /// Parent name; empty for a root.
    #[serde(default)]
    pub parent: String,
    /// Row-major 4x4 pose relative to the parent; empty when unknown.
    #[serde(default)]
    pub pose_wrt_parent: Vec<f64>,
    /// Names of the systems whose parent this is.
    #[serde(default)]
    pub children: Vec<String>,
}

/// Coordinate systems keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateSystems {
    entries: BTreeMap<String, CoordinateSystem>,
}

impl CoordinateSystems {
    /// Registers a coordinate system and returns its name.
    ///
    /// A duplicate name logs a warning and leaves the table unchanged. An
    /// unknown parent logs a warning; the system is still stored, unlinked.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPose` if `pose` is given and does not
    /// hold exactly 16 values, and `ValidationError::NonFiniteValue` if it
    /// holds NaN or an infinity.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        cs_type: impl Into<CoordinateSystemType>,
        parent: Option<&str>,
        pose: Option<Vec<f64>>,
    ) -> LabelResult<String> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            warn!(name = %name, "{}", WriteError::DuplicateCoordinateSystem { name: name.clone() });
            return Ok(name);
        }
        let pose = pose.unwrap_or_default();
        if !pose.is_empty() {
            check_pose("pose_wrt_parent", &pose)?;
        }
        let parent = parent.unwrap_or_default().to_string();
        if !parent.is_empty() {
            match self.entries.get_mut(&parent) {
                Some(p) => p.children.push(name.clone()),
                None => warn!(
                    name = %name,
                    parent = %parent,
                    "{}",
                    WriteError::UnresolvedParentCoordinateSystem {
                        name: name.clone(),
                        parent: parent.clone(),
                    }
                ),
            }
        }
        self.entries.insert(
            name.clone(),
            CoordinateSystem {
                cs_type: cs_type.into(),
                parent,
                pose_wrt_parent: pose,
                children: Vec::new(),
            },
        );
        Ok(name)
    }

    pub(crate) fn insert(&mut self, name: String, cs: CoordinateSystem) {
        self.entries.insert(name, cs);
    }

    /// The system called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CoordinateSystem> {
        self.entries.get(name)
    }

    /// True if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, system)` pairs ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoordinateSystem)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Vec<f64> {
        let mut m = vec![0.0; POSE_LEN];
        for i in 0..4 {
            m[i * 5] = 1.0;
        }
        m
    }

    #[test]
    fn test_ontology_keys_are_sequential() {
        let mut onts = Ontologies::default();
        assert_eq!(onts.add("http://a"), "0");
        assert_eq!(onts.add("http://b"), "1");
        assert_eq!(onts.get("1"), Some("http://b"));
    }

    #[test]
    fn test_ontology_dedup_returns_existing() {
        let mut onts = Ontologies::default();
        onts.add("http://a");
        onts.add("http://b");
        assert_eq!(onts.add("http://a"), "0");
        assert_eq!(onts.len(), 2);
    }

    #[test]
    fn test_ontology_key_follows_loaded_max() {
        let mut onts = Ontologies::default();
        onts.insert("4".to_string(), "http://x".to_string());
        assert_eq!(onts.add("http://y"), "5");
    }

    #[test]
    fn test_coordinate_system_links_parent() {
        let mut cs = CoordinateSystems::default();
        cs.add("odom", "scene_cs", None, None).unwrap();
        cs.add("vehicle", "local_cs", Some("odom"), Some(identity())).unwrap();

        assert_eq!(cs.get("odom").unwrap().children, vec!["vehicle".to_string()]);
        let vehicle = cs.get("vehicle").unwrap();
        assert_eq!(vehicle.parent, "odom");
        assert_eq!(vehicle.cs_type, CoordinateSystemType::Local);
        assert_eq!(vehicle.pose_wrt_parent.len(), POSE_LEN);
    }

    #[test]
    fn test_coordinate_system_unresolved_parent_is_unlinked() {
        let mut cs = CoordinateSystems::default();
        assert_eq!(cs.add("camera", "sensor_cs", Some("vehicle"), None).unwrap(), "camera");
        assert_eq!(cs.get("camera").unwrap().parent, "vehicle");
        cs.add("vehicle", "local_cs", None, None).unwrap();
        assert!(cs.get("vehicle").unwrap().children.is_empty());
    }

    #[test]
    fn test_coordinate_system_duplicate_is_ignored() {
        let mut cs = CoordinateSystems::default();
        cs.add("odom", "scene_cs", None, None).unwrap();
        cs.add("odom", "local_cs", None, None).unwrap();
        assert_eq!(cs.len(), 1);
        assert_eq!(cs.get("odom").unwrap().cs_type, CoordinateSystemType::Scene);
    }

    #[test]
    fn test_coordinate_system_rejects_bad_pose() {
        let mut cs = CoordinateSystems::default();
        let err = cs.add("odom", "scene_cs", None, Some(vec![1.0; 9])).unwrap_err();
        assert!(err.is_validation());
        assert!(cs.is_empty());
    }

    #[test]
    fn test_coordinate_system_rejects_non_finite_pose() {
        let mut cs = CoordinateSystems::default();
        let mut pose = identity();
        pose[3] = f64::NAN;
        let err = cs.add("odom", "scene_cs", None, Some(pose)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonFiniteValue {
                field: "pose_wrt_parent".to_string()
            }
            .into()
        );
        pose = identity();
        pose[7] = f64::NEG_INFINITY;
        assert!(cs.add("odom", "scene_cs", None, Some(pose)).unwrap_err().is_validation());
        assert!(cs.is_empty());
    }

    #[test]
    fn test_coordinate_system_serde_shape() {
        let cs = CoordinateSystem {
            cs_type: "custom_rig".into(),
            parent: String::new(),
            pose_wrt_parent: Vec::new(),
            children: vec!["a".to_string()],
        };
        let json = serde_json::to_value(&cs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "custom_rig", "parent": "", "pose_wrt_parent": [], "children": ["a"]})
        );
        let back: CoordinateSystem = serde_json::from_value(json).unwrap();
        assert_eq!(back, cs);
    }
}
