//! Sensor streams, their calibration and synchronization.
//!
//! A [`Stream`] names one data source (a camera, a lidar) that annotations
//! were made on. Its [`StreamProperties`] carry intrinsics, extrinsics and
//! synchronization data, either for the whole sequence or for one frame.
//! Per-frame vehicle pose is recorded as [`Odometry`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::registry::{check_finite, check_pose};

/// Number of values in a 3x4 camera matrix.
pub const CAMERA_MATRIX_LEN: usize = 12;

/// Keys of [`StreamProperties`] with a dedicated field.
const RESERVED_STREAM_KEYS: [&str; 4] = ["intrinsics_pinhole", "intrinsics_fisheye", "extrinsics", "sync"];

/// Kind of sensor behind a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamType {
    /// Image sensor.
    Camera,
    /// Laser scanner.
    Lidar,
    /// Radar.
    Radar,
    /// Satellite positioning and inertial unit.
    GpsImu,
    /// Any other sensor.
    Other,
    /// Anything else, stored verbatim.
    Custom(String),
}

impl StreamType {
    /// Tag written in the tree.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Camera => "camera",
            Self::Lidar => "lidar",
            Self::Radar => "radar",
            Self::GpsImu => "gps_imu",
            Self::Other => "other",
            Self::Custom(s) => s,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StreamType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "camera" => Self::Camera,
            "lidar" => Self::Lidar,
            "radar" => Self::Radar,
            "gps_imu" => Self::GpsImu,
            "other" => Self::Other,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for StreamType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<StreamType> for String {
    fn from(t: StreamType) -> Self {
        match t {
            StreamType::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// Pinhole camera model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsPinhole {
    /// Image width in pixels.
    pub width_px: u32,
    /// Image height in pixels.
    pub height_px: u32,
    /// Row-major 3x4 projection matrix.
    pub camera_matrix_3x4: Vec<f64>,
    /// Distortion coefficients; empty, or 5 to 14 values.
    #[serde(rename = "distortion_coeffs_1xN", default)]
    pub distortion_coeffs: Vec<f64>,
    /// Extra calibration entries, written next to the named ones.
    #[serde(flatten)]
    pub additional: Map<String, Json>,
}

impl IntrinsicsPinhole {
    /// Creates a validated pinhole model.
    ///
    /// # Errors
    ///
    /// See [`IntrinsicsPinhole::validate`].
    pub fn new(
        width_px: u32,
        height_px: u32,
        camera_matrix_3x4: Vec<f64>,
        distortion_coeffs: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        let intrinsics = Self {
            width_px,
            height_px,
            camera_matrix_3x4,
            distortion_coeffs,
            additional: Map::new(),
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Checks matrix and coefficient counts and that every value is finite.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidCalibration` for a wrong count and
    /// `ValidationError::NonFiniteValue` for NaN or an infinity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.camera_matrix_3x4.len() != CAMERA_MATRIX_LEN {
            return Err(ValidationError::InvalidCalibration {
                field: "camera_matrix_3x4".to_string(),
                reason: format!(
                    "expected {CAMERA_MATRIX_LEN} values, got {}",
                    self.camera_matrix_3x4.len()
                ),
            });
        }
        let n = self.distortion_coeffs.len();
        if n != 0 && !(5..=14).contains(&n) {
            return Err(ValidationError::InvalidCalibration {
                field: "distortion_coeffs_1xN".to_string(),
                reason: format!("expected none or 5 to 14 values, got {n}"),
            });
        }
        check_finite("camera_matrix_3x4", &self.camera_matrix_3x4)?;
        check_finite("distortion_coeffs_1xN", &self.distortion_coeffs)
    }
}

/// Fisheye camera model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsFisheye {
    /// Image width in pixels.
    pub width_px: u32,
    /// Image height in pixels.
    pub height_px: u32,
    /// Polynomial lens coefficients.
    pub lens_coeffs_1x4: [f64; 4],
    /// Field of view in degrees.
    pub fov_deg: f64,
    /// Optical center, x.
    pub center_x: f64,
    /// Optical center, y.
    pub center_y: f64,
    /// Image circle radius, x.
    pub radius_x: f64,
    /// Image circle radius, y.
    pub radius_y: f64,
    /// Extra calibration entries, written next to the named ones.
    #[serde(flatten)]
    pub additional: Map<String, Json>,
}

impl IntrinsicsFisheye {
    /// Creates a validated fisheye model. `center` and `radius` are `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonFiniteValue` if any value is NaN or infinite.
    pub fn new(
        width_px: u32,
        height_px: u32,
        lens_coeffs_1x4: [f64; 4],
        fov_deg: f64,
        center: (f64, f64),
        radius: (f64, f64),
    ) -> Result<Self, ValidationError> {
        let intrinsics = Self {
            width_px,
            height_px,
            lens_coeffs_1x4,
            fov_deg,
            center_x: center.0,
            center_y: center.1,
            radius_x: radius.0,
            radius_y: radius.1,
            additional: Map::new(),
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Checks that every value is finite.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonFiniteValue` naming the first bad field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_finite("lens_coeffs_1x4", &self.lens_coeffs_1x4)?;
        check_finite("fov_deg", &[self.fov_deg])?;
        check_finite("center", &[self.center_x, self.center_y])?;
        check_finite("radius", &[self.radius_x, self.radius_y])
    }
}

/// Either camera model.
#[derive(Debug, Clone, PartialEq)]
pub enum Intrinsics {
    /// Pinhole model.
    Pinhole(IntrinsicsPinhole),
    /// Fisheye model.
    Fisheye(IntrinsicsFisheye),
}

impl From<IntrinsicsPinhole> for Intrinsics {
    fn from(i: IntrinsicsPinhole) -> Self {
        Self::Pinhole(i)
    }
}

impl From<IntrinsicsFisheye> for Intrinsics {
    fn from(i: IntrinsicsFisheye) -> Self {
        Self::Fisheye(i)
    }
}

/// Pose of the sensor coordinate system relative to the local one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Row-major 4x4 pose.
    pub pose_scs_wrt_lcs_4x4: Vec<f64>,
    /// Extra entries, written next to the pose.
    #[serde(flatten)]
    pub additional: Map<String, Json>,
}

impl Extrinsics {
    /// Creates validated extrinsics.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPose` unless `pose` holds 16 values,
    /// and `ValidationError::NonFiniteValue` for NaN or an infinity.
    pub fn new(pose: Vec<f64>) -> Result<Self, ValidationError> {
        check_pose("pose_scs_wrt_lcs_4x4", &pose)?;
        Ok(Self {
            pose_scs_wrt_lcs_4x4: pose,
            additional: Map::new(),
        })
    }

    /// Checks the pose.
    ///
    /// # Errors
    ///
    /// As [`Extrinsics::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_pose("pose_scs_wrt_lcs_4x4", &self.pose_scs_wrt_lcs_4x4)
    }
}

/// Pose of the local coordinate system relative to the world at one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    /// Row-major 4x4 pose.
    pub pose_lcs_wrt_wcs_4x4: Vec<f64>,
    /// Extra entries, written next to the pose.
    #[serde(flatten)]
    pub additional: Map<String, Json>,
}

impl Odometry {
    /// Creates a validated odometry record.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPose` unless `pose` holds 16 values,
    /// and `ValidationError::NonFiniteValue` for NaN or an infinity.
    pub fn new(pose: Vec<f64>) -> Result<Self, ValidationError> {
        check_pose("pose_lcs_wrt_wcs_4x4", &pose)?;
        Ok(Self {
            pose_lcs_wrt_wcs_4x4: pose,
            additional: Map::new(),
        })
    }

    /// Checks the pose.
    ///
    /// # Errors
    ///
    /// As [`Odometry::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_pose("pose_lcs_wrt_wcs_4x4", &self.pose_lcs_wrt_wcs_4x4)
    }
}

/// How a stream's own frame numbering maps to the document's.
///
/// Either a constant `frame_shift` for the whole sequence, or a document
/// `frame` with the matching stream frame and capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSync {
    /// Document frame the entry belongs to. Decides where it is stored and
    /// is not written itself.
    #[serde(skip)]
    pub frame: Option<u64>,
    /// Constant offset between stream and document frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_shift: Option<i64>,
    /// Stream frame matching `frame`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_stream: Option<u64>,
    /// Capture time of the stream frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Extra entries.
    #[serde(flatten)]
    pub additional: Map<String, Json>,
}

impl StreamSync {
    /// Constant offset for the whole sequence.
    #[must_use]
    pub fn shift(frame_shift: i64) -> Self {
        Self {
            frame_shift: Some(frame_shift),
            ..Self::default()
        }
    }

    /// Synchronization entry for document frame `frame`.
    #[must_use]
    pub fn at_frame(frame: u64) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    /// Sets the stream frame matching the document frame.
    #[must_use]
    pub fn frame_stream(mut self, frame_stream: u64) -> Self {
        self.frame_stream = Some(frame_stream);
        self
    }

    /// Sets the capture time.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// True if nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame_shift.is_none()
            && self.frame_stream.is_none()
            && self.timestamp.is_none()
            && self.additional.is_empty()
    }

    /// Checks that a shift is not mixed with per-frame fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidCalibration` if `frame_shift` is set
    /// together with `frame`, `frame_stream` or `timestamp`, or if
    /// `frame_stream` or `timestamp` is set without a document frame.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let per_frame = self.frame_stream.is_some() || self.timestamp.is_some();
        if self.frame_shift.is_some() && (per_frame || self.frame.is_some()) {
            return Err(ValidationError::InvalidCalibration {
                field: "sync".to_string(),
                reason: "frame_shift cannot be combined with per-frame synchronization".to_string(),
            });
        }
        if self.frame_shift.is_none() && self.frame.is_none() && per_frame {
            return Err(ValidationError::InvalidCalibration {
                field: "sync".to_string(),
                reason: "frame_stream and timestamp need a document frame".to_string(),
            });
        }
        Ok(())
    }
}

/// Calibration, synchronization and free-form properties of a stream.
///
/// # Examples
///
/// ```
/// use openlabel::{Extrinsics, StreamProperties, StreamSync};
///
/// let mut pose = vec![0.0; 16];
/// for i in 0..4 {
///     pose[i * 5] = 1.0;
/// }
/// let props = StreamProperties::new()
///     .extrinsics(Extrinsics::new(pose).unwrap())
///     .sync(StreamSync::at_frame(3).frame_stream(1));
/// assert_eq!(props.target_frame(), Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamProperties {
    /// Pinhole intrinsics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsics_pinhole: Option<IntrinsicsPinhole>,
    /// Fisheye intrinsics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsics_fisheye: Option<IntrinsicsFisheye>,
    /// Sensor pose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsics: Option<Extrinsics>,
    /// Frame synchronization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<StreamSync>,
    /// Free-form entries, written next to the named ones.
    #[serde(flatten)]
    pub properties: Map<String, Json>,
}

impl StreamProperties {
    /// Empty properties.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the camera model.
    #[must_use]
    pub fn intrinsics(mut self, intrinsics: impl Into<Intrinsics>) -> Self {
        match intrinsics.into() {
            Intrinsics::Pinhole(i) => self.intrinsics_pinhole = Some(i),
            Intrinsics::Fisheye(i) => self.intrinsics_fisheye = Some(i),
        }
        self
    }

    /// Sets the sensor pose.
    #[must_use]
    pub fn extrinsics(mut self, extrinsics: Extrinsics) -> Self {
        self.extrinsics = Some(extrinsics);
        self
    }

    /// Sets the synchronization entry.
    #[must_use]
    pub fn sync(mut self, sync: StreamSync) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Adds a free-form entry.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: Json) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// True if nothing was provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intrinsics_pinhole.is_none()
            && self.intrinsics_fisheye.is_none()
            && self.extrinsics.is_none()
            && self.sync.is_none()
            && self.properties.is_empty()
    }

    /// Document frame these properties belong to, if any.
    #[must_use]
    pub fn target_frame(&self) -> Option<u64> {
        self.sync.as_ref().and_then(|s| s.frame)
    }

    /// Validates every calibration block present.
    ///
    /// # Errors
    ///
    /// Propagates the first error of the intrinsics, extrinsics or sync check.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(i) = &self.intrinsics_pinhole {
            i.validate()?;
        }
        if let Some(i) = &self.intrinsics_fisheye {
            i.validate()?;
        }
        if let Some(e) = &self.extrinsics {
            e.validate()?;
        }
        if let Some(s) = &self.sync {
            s.validate()?;
        }
        Ok(())
    }

    /// Merges `other` into `self`. Present blocks replace ours; free-form
    /// entries are added key by key. An empty sync entry is not kept.
    pub fn merge(&mut self, other: Self) {
        let Self {
            intrinsics_pinhole,
            intrinsics_fisheye,
            extrinsics,
            sync,
            properties,
        } = other;
        if intrinsics_pinhole.is_some() {
            self.intrinsics_pinhole = intrinsics_pinhole;
        }
        if intrinsics_fisheye.is_some() {
            self.intrinsics_fisheye = intrinsics_fisheye;
        }
        if extrinsics.is_some() {
            self.extrinsics = extrinsics;
        }
        if let Some(sync) = sync.filter(|s| !s.is_empty()) {
            self.sync = Some(sync);
        }
        for (key, value) in properties {
            if RESERVED_STREAM_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "reserved stream property key, use its builder");
                continue;
            }
            self.properties.insert(key, value);
        }
    }
}

/// A declared stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Sensor kind.
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    /// Where the stream's data lives.
    #[serde(default)]
    pub uri: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Properties valid for the whole sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_properties: Option<StreamProperties>,
}

/// Properties of one stream at one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStream {
    /// Properties valid at that frame.
    #[serde(default)]
    pub stream_properties: StreamProperties,
}

/// Streams keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Streams {
    entries: BTreeMap<String, Stream>,
}

impl Streams {
    /// Declares a stream and returns its name.
    ///
    /// Declaring a name again replaces its type, uri and description and
    /// keeps the properties added so far.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        uri: impl Into<String>,
        description: impl Into<String>,
        stream_type: impl Into<StreamType>,
    ) -> String {
        let name = name.into();
        let (stream_type, uri, description) = (stream_type.into(), uri.into(), description.into());
        match self.entries.get_mut(&name) {
            Some(stream) => {
                debug!(name = %name, "stream redeclared");
                stream.stream_type = stream_type;
                stream.uri = uri;
                stream.description = description;
            }
            None => {
                self.entries.insert(
                    name.clone(),
                    Stream {
                        stream_type,
                        uri,
                        description,
                        stream_properties: None,
                    },
                );
            }
        }
        name
    }

    pub(crate) fn insert(&mut self, name: String, stream: Stream) {
        self.entries.insert(name, stream);
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Stream> {
        self.entries.get_mut(name)
    }

    /// The stream called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Stream> {
        self.entries.get(name)
    }

    /// True if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of declared streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no stream is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, stream)` pairs ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Stream)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
