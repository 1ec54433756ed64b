//! Typed attribute values attached to elements.
//!
//! Each [`Attribute`] has a name and one payload from the closed set in
//! [`AttributeValue`]. Within one element (or one element-in-frame slot) an
//! attribute is identified by its kind and name: setting it again replaces
//! the previous value in place.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::error::{FormatError, LabelError, ValidationError};
use crate::poly2d::{compute_srf6dcc, longest_segment, pack_chain_code, CHAIN_CODE_BITS, MAX_SEGMENT_STEPS};

/// Type tag of an attribute payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Bbox,
    Rbbox,
    Num,
    Text,
    Boolean,
    Vec,
    Point2d,
    Point3d,
    Poly2d,
    Poly3d,
    Cuboid,
    Mat,
    Binary,
    Image,
}

impl AttributeKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::Bbox,
        Self::Rbbox,
        Self::Num,
        Self::Text,
        Self::Boolean,
        Self::Vec,
        Self::Point2d,
        Self::Point3d,
        Self::Poly2d,
        Self::Poly3d,
        Self::Cuboid,
        Self::Mat,
        Self::Binary,
        Self::Image,
    ];

    /// Key used for this kind in the structured tree.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bbox => "bbox",
            Self::Rbbox => "rbbox",
            Self::Num => "num",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Vec => "vec",
            Self::Point2d => "point2d",
            Self::Point3d => "point3d",
            Self::Poly2d => "poly2d",
            Self::Poly3d => "poly3d",
            Self::Cuboid => "cuboid",
            Self::Mat => "mat",
            Self::Binary => "binary",
            Self::Image => "image",
        }
    }

    /// True for geometric kinds, which may carry nested attributes.
    #[must_use]
    pub const fn is_geometry(self) -> bool {
        matches!(
            self,
            Self::Bbox
                | Self::Rbbox
                | Self::Point2d
                | Self::Point3d
                | Self::Poly2d
                | Self::Poly3d
                | Self::Cuboid
        )
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| FormatError::UnknownAttributeKind { kind: s.to_string() })
    }
}

/// Encoding of a 2D polygon's vertices.
#[derive(Debug, Clone, PartialEq)]
pub enum Poly2dVal {
    /// Absolute coordinates `[x0, y0, x1, y1, ...]`.
    Absolute(Vec<f64>),
    /// SRF6DCC chain code packed as base64 text.
    Srf6dcc {
        /// First vertex x.
        xinit: i64,
        /// First vertex y.
        yinit: i64,
        /// Padding symbols appended before packing.
        rest: usize,
        /// Base64 text of the packed symbols.
        encoded: String,
    },
}

impl Poly2dVal {
    /// Mode tag stored next to the value.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Absolute(_) => "MODE_POLY2D_ABSOLUTE",
            Self::Srf6dcc { .. } => "MODE_POLY2D_SRF6DCC",
        }
    }
}

/// Attribute payloads.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Center x, center y, width, height.
    Bbox([f64; 4]),
    /// Center x, center y, width, height, rotation (radians).
    Rbbox([f64; 5]),
    /// A single number.
    Num(f64),
    /// Free text.
    Text(String),
    /// A flag.
    Boolean(bool),
    /// Numbers of any length.
    Vec(Vec<f64>),
    /// Point in the image plane, with an optional point id.
    Point2d {
        val: [f64; 2],
        id: Option<i64>,
    },
    /// Point in space, with an optional point id.
    Point3d {
        val: [f64; 3],
        id: Option<i64>,
    },
    /// Polygon or polyline in the image plane.
    Poly2d {
        val: Poly2dVal,
        closed: bool,
        /// Parent index per vertex, for skeletons.
        hierarchy: Option<Vec<i64>>,
    },
    /// Polygon or polyline in space, `[x0, y0, z0, ...]`.
    Poly3d {
        val: Vec<f64>,
        closed: bool,
    },
    /// Position, rotation and size; 9 values (Euler) or 10 (quaternion).
    Cuboid(Vec<f64>),
    /// Row-major matrix of `channels * width * height` values.
    Mat {
        val: Vec<f64>,
        channels: u32,
        width: u32,
        height: u32,
        data_type: String,
    },
    /// Encoded binary blob.
    Binary {
        val: String,
        data_type: String,
        encoding: String,
    },
    /// Encoded image.
    Image {
        val: String,
        mime_type: String,
        encoding: String,
    },
}

impl AttributeValue {
    /// Kind tag of the payload.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        match self {
            Self::Bbox(_) => AttributeKind::Bbox,
            Self::Rbbox(_) => AttributeKind::Rbbox,
            Self::Num(_) => AttributeKind::Num,
            Self::Text(_) => AttributeKind::Text,
            Self::Boolean(_) => AttributeKind::Boolean,
            Self::Vec(_) => AttributeKind::Vec,
            Self::Point2d { .. } => AttributeKind::Point2d,
            Self::Point3d { .. } => AttributeKind::Point3d,
            Self::Poly2d { .. } => AttributeKind::Poly2d,
            Self::Poly3d { .. } => AttributeKind::Poly3d,
            Self::Cuboid(_) => AttributeKind::Cuboid,
            Self::Mat { .. } => AttributeKind::Mat,
            Self::Binary { .. } => AttributeKind::Binary,
            Self::Image { .. } => AttributeKind::Image,
        }
    }

    /// The number of a `num` payload.
    #[must_use]
    pub const fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(v) => Some(*v),
            _ => None,
        }
    }

    /// The text of a `text` payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The flag of a `boolean` payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// The box of a `bbox` payload.
    #[must_use]
    pub const fn as_bbox(&self) -> Option<[f64; 4]> {
        match self {
            Self::Bbox(v) => Some(*v),
            _ => None,
        }
    }
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// A named, typed value.
///
/// # Examples
///
/// ```
/// use openlabel::{Attribute, AttributeKind};
///
/// let head = Attribute::bbox("head", [10.0, 10.0, 30.0, 30.0]);
/// assert_eq!(head.kind(), AttributeKind::Bbox);
/// assert_eq!(head.name, "head");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Name, unique per kind within one element or slot.
    pub name: String,
    /// Payload.
    pub value: AttributeValue,
    /// Coordinate system the value is expressed in; must be declared.
    pub coordinate_system: Option<String>,
    /// Non-geometric attributes describing a geometric one.
    pub attributes: AttributeSet,
}

impl Attribute {
    /// Creates an attribute from a name and payload.
    #[must_use]
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
            coordinate_system: None,
            attributes: AttributeSet::default(),
        }
    }

    /// A `bbox` attribute.
    #[must_use]
    pub fn bbox(name: impl Into<String>, val: [f64; 4]) -> Self {
        Self::new(name, AttributeValue::Bbox(val))
    }

    /// A rotated `rbbox` attribute.
    #[must_use]
    pub fn rbbox(name: impl Into<String>, val: [f64; 5]) -> Self {
        Self::new(name, AttributeValue::Rbbox(val))
    }

    /// A `num` attribute.
    #[must_use]
    pub fn num(name: impl Into<String>, val: f64) -> Self {
        Self::new(name, AttributeValue::Num(val))
    }

    /// A `text` attribute.
    #[must_use]
    pub fn text(name: impl Into<String>, val: impl Into<String>) -> Self {
        Self::new(name, AttributeValue::Text(val.into()))
    }

    /// A `boolean` attribute.
    #[must_use]
    pub fn boolean(name: impl Into<String>, val: bool) -> Self {
        Self::new(name, AttributeValue::Boolean(val))
    }

    /// A `vec` attribute.
    #[must_use]
    pub fn vec(name: impl Into<String>, val: Vec<f64>) -> Self {
        Self::new(name, AttributeValue::Vec(val))
    }

    /// A `point2d` attribute without point id.
    #[must_use]
    pub fn point2d(name: impl Into<String>, val: [f64; 2]) -> Self {
        Self::new(name, AttributeValue::Point2d { val, id: None })
    }

    /// A `point3d` attribute without point id.
    #[must_use]
    pub fn point3d(name: impl Into<String>, val: [f64; 3]) -> Self {
        Self::new(name, AttributeValue::Point3d { val, id: None })
    }

    /// Polygon stored with absolute coordinates.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` for an odd number of values.
    pub fn poly2d(name: impl Into<String>, coords: Vec<f64>, closed: bool) -> Result<Self, ValidationError> {
        let name = name.into();
        if coords.len() % 2 != 0 {
            return Err(ValidationError::InvalidAttribute {
                name,
                reason: format!("poly2d needs coordinate pairs, got {} values", coords.len()),
            });
        }
        Ok(Self::new(
            name,
            AttributeValue::Poly2d {
                val: Poly2dVal::Absolute(coords),
                closed,
                hierarchy: None,
            },
        ))
    }

    /// Polygon compressed with the SRF6DCC chain code.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` for an odd or empty
    /// coordinate list, or when two consecutive points are more than
    /// [`MAX_SEGMENT_STEPS`] steps apart.
    pub fn poly2d_srf6dcc(name: impl Into<String>, coords: &[i64], closed: bool) -> Result<Self, ValidationError> {
        let name = name.into();
        if coords.is_empty() || coords.len() % 2 != 0 {
            return Err(ValidationError::InvalidAttribute {
                name,
                reason: format!("poly2d needs coordinate pairs, got {} values", coords.len()),
            });
        }
        let longest = longest_segment(coords);
        if longest > MAX_SEGMENT_STEPS {
            return Err(ValidationError::InvalidAttribute {
                name,
                reason: format!("segment of {longest} steps is too long to chain-code"),
            });
        }
        let code = compute_srf6dcc(coords);
        let (encoded, rest) = pack_chain_code(&code.distances, CHAIN_CODE_BITS)?;
        Ok(Self::new(
            name,
            AttributeValue::Poly2d {
                val: Poly2dVal::Srf6dcc {
                    xinit: code.xinit,
                    yinit: code.yinit,
                    rest,
                    encoded,
                },
                closed,
                hierarchy: None,
            },
        ))
    }

    /// A `poly3d` attribute.
    #[must_use]
    pub fn poly3d(name: impl Into<String>, val: Vec<f64>, closed: bool) -> Self {
        Self::new(name, AttributeValue::Poly3d { val, closed })
    }

    /// A `cuboid` attribute.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` unless `val` holds 9 or 10 values.
    pub fn cuboid(name: impl Into<String>, val: Vec<f64>) -> Result<Self, ValidationError> {
        let name = name.into();
        if val.len() != 9 && val.len() != 10 {
            return Err(ValidationError::InvalidAttribute {
                name,
                reason: format!("cuboid needs 9 or 10 values, got {}", val.len()),
            });
        }
        Ok(Self::new(name, AttributeValue::Cuboid(val)))
    }

    /// A `mat` attribute.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` if `val` does not hold
    /// `channels * width * height` values.
    pub fn mat(
        name: impl Into<String>,
        val: Vec<f64>,
        channels: u32,
        width: u32,
        height: u32,
        data_type: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let expected = u64::from(channels) * u64::from(width) * u64::from(height);
        if val.len() as u64 != expected {
            return Err(ValidationError::InvalidAttribute {
                name,
                reason: format!("mat expects {expected} values, got {}", val.len()),
            });
        }
        Ok(Self::new(
            name,
            AttributeValue::Mat {
                val,
                channels,
                width,
                height,
                data_type: data_type.into(),
            },
        ))
    }

    /// A `binary` attribute holding encoded text.
    #[must_use]
    pub fn binary(
        name: impl Into<String>,
        val: impl Into<String>,
        data_type: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AttributeValue::Binary {
                val: val.into(),
                data_type: data_type.into(),
                encoding: encoding.into(),
            },
        )
    }

    /// An `image` attribute holding encoded text.
    #[must_use]
    pub fn image(
        name: impl Into<String>,
        val: impl Into<String>,
        mime_type: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AttributeValue::Image {
                val: val.into(),
                mime_type: mime_type.into(),
                encoding: encoding.into(),
            },
        )
    }

    /// Expresses the value in a declared coordinate system.
    #[must_use]
    pub fn in_coordinate_system(mut self, name: impl Into<String>) -> Self {
        self.coordinate_system = Some(name.into());
        self
    }

    /// Attaches a nested attribute to a geometric value.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` if `self` is not geometric
    /// or `nested` is.
    pub fn with_attribute(mut self, nested: Attribute) -> Result<Self, ValidationError> {
        let kind = self.kind();
        if !kind.is_geometry() {
            return Err(ValidationError::InvalidAttribute {
                name: self.name,
                reason: format!("{kind} values cannot carry attributes"),
            });
        }
        if nested.kind().is_geometry() {
            return Err(ValidationError::InvalidAttribute {
                name: nested.name,
                reason: "nested attributes must not be geometric".to_string(),
            });
        }
        self.attributes.set(nested);
        Ok(self)
    }

    /// Kind of the payload.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        self.value.kind()
    }

    /// Checks that no float in the payload or in nested attributes is NaN or
    /// infinite. The tree has no representation for them.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAttribute` naming the offending attribute.
    pub fn check_finite(&self) -> Result<(), ValidationError> {
        let finite = match &self.value {
            AttributeValue::Bbox(v) => all_finite(v),
            AttributeValue::Rbbox(v) => all_finite(v),
            AttributeValue::Num(v) => v.is_finite(),
            AttributeValue::Point2d { val, .. } => all_finite(val),
            AttributeValue::Point3d { val, .. } => all_finite(val),
            AttributeValue::Vec(v)
            | AttributeValue::Cuboid(v)
            | AttributeValue::Poly3d { val: v, .. }
            | AttributeValue::Mat { val: v, .. }
            | AttributeValue::Poly2d {
                val: Poly2dVal::Absolute(v),
                ..
            } => all_finite(v),
            AttributeValue::Text(_)
            | AttributeValue::Boolean(_)
            | AttributeValue::Poly2d { .. }
            | AttributeValue::Binary { .. }
            | AttributeValue::Image { .. } => true,
        };
        if !finite {
            return Err(ValidationError::InvalidAttribute {
                name: self.name.clone(),
                reason: "NaN and infinite values cannot be stored".to_string(),
            });
        }
        self.attributes.iter().try_for_each(Attribute::check_finite)
    }

    /// Renders this attribute as a tree node.
    #[must_use]
    pub fn to_tree(&self) -> Json {
        let mut node = Map::new();
        node.insert("name".to_string(), json!(self.name));
        match &self.value {
            AttributeValue::Bbox(v) => {
                node.insert("val".to_string(), json!(v));
            }
            AttributeValue::Rbbox(v) => {
                node.insert("val".to_string(), json!(v));
            }
            AttributeValue::Num(v) => {
                node.insert("val".to_string(), json!(v));
            }
            AttributeValue::Text(v) => {
                node.insert("val".to_string(), json!(v));
            }
            AttributeValue::Boolean(v) => {
                node.insert("val".to_string(), json!(v));
            }
            AttributeValue::Vec(v) | AttributeValue::Cuboid(v) => {
                node.insert("val".to_string(), json!(v));
            }
            AttributeValue::Point2d { val, id } => {
                node.insert("val".to_string(), json!(val));
                if let Some(id) = id {
                    node.insert("id".to_string(), json!(id));
                }
            }
            AttributeValue::Point3d { val, id } => {
                node.insert("val".to_string(), json!(val));
                if let Some(id) = id {
                    node.insert("id".to_string(), json!(id));
                }
            }
            AttributeValue::Poly2d { val, closed, hierarchy } => {
                let rendered = match val {
                    Poly2dVal::Absolute(coords) => json!(coords),
                    Poly2dVal::Srf6dcc {
                        xinit,
                        yinit,
                        rest,
                        encoded,
                    } => json!([xinit.to_string(), yinit.to_string(), rest.to_string(), encoded]),
                };
                node.insert("val".to_string(), rendered);
                node.insert("mode".to_string(), json!(val.mode()));
                node.insert("closed".to_string(), json!(closed));
                if let Some(h) = hierarchy {
                    node.insert("hierarchy".to_string(), json!(h));
                }
            }
            AttributeValue::Poly3d { val, closed } => {
                node.insert("val".to_string(), json!(val));
                node.insert("closed".to_string(), json!(closed));
            }
            AttributeValue::Mat {
                val,
                channels,
                width,
                height,
                data_type,
            } => {
                node.insert("val".to_string(), json!(val));
                node.insert("channels".to_string(), json!(channels));
                node.insert("width".to_string(), json!(width));
                node.insert("height".to_string(), json!(height));
                node.insert("data_type".to_string(), json!(data_type));
            }
            AttributeValue::Binary {
                val,
                data_type,
                encoding,
            } => {
                node.insert("val".to_string(), json!(val));
                node.insert("data_type".to_string(), json!(data_type));
                node.insert("encoding".to_string(), json!(encoding));
            }
            AttributeValue::Image {
                val,
                mime_type,
                encoding,
            } => {
                node.insert("val".to_string(), json!(val));
                node.insert("mime_type".to_string(), json!(mime_type));
                node.insert("encoding".to_string(), json!(encoding));
            }
        }
        if let Some(cs) = &self.coordinate_system {
            node.insert("coordinate_system".to_string(), json!(cs));
        }
        if !self.attributes.is_empty() {
            node.insert("attributes".to_string(), self.attributes.to_tree());
        }
        Json::Object(node)
    }

    /// Rebuilds an attribute of `kind` from a tree node.
    ///
    /// # Errors
    ///
    /// Returns a `FormatError` when a field is missing or has the wrong type,
    /// and a `ValidationError` when a payload has the wrong arity.
    pub fn from_tree(kind: AttributeKind, node: &Json, path: &str) -> Result<Self, LabelError> {
        let obj = node.as_object().ok_or_else(|| FormatError::shape(path, "object"))?;
        let name = str_field(obj, "name", path)?.to_string();
        let val = obj
            .get("val")
            .ok_or_else(|| FormatError::shape(format!("{path}.val"), "value"))?;
        let val_path = format!("{path}.val");

        let value = match kind {
            AttributeKind::Bbox => AttributeValue::Bbox(fixed_numbers(val, &val_path, &name)?),
            AttributeKind::Rbbox => AttributeValue::Rbbox(fixed_numbers(val, &val_path, &name)?),
            AttributeKind::Num => AttributeValue::Num(
                val.as_f64().ok_or_else(|| FormatError::shape(&val_path, "number"))?,
            ),
            AttributeKind::Text => AttributeValue::Text(
                val.as_str()
                    .ok_or_else(|| FormatError::shape(&val_path, "string"))?
                    .to_string(),
            ),
            AttributeKind::Boolean => AttributeValue::Boolean(
                val.as_bool().ok_or_else(|| FormatError::shape(&val_path, "boolean"))?,
            ),
            AttributeKind::Vec => AttributeValue::Vec(numbers(val, &val_path)?),
            AttributeKind::Point2d => AttributeValue::Point2d {
                val: fixed_numbers(val, &val_path, &name)?,
                id: obj.get("id").and_then(Json::as_i64),
            },
            AttributeKind::Point3d => AttributeValue::Point3d {
                val: fixed_numbers(val, &val_path, &name)?,
                id: obj.get("id").and_then(Json::as_i64),
            },
            AttributeKind::Poly2d => {
                let mode = obj.get("mode").and_then(Json::as_str).unwrap_or("MODE_POLY2D_ABSOLUTE");
                let val = if mode == "MODE_POLY2D_SRF6DCC" {
                    poly2d_chain_code(val, &val_path)?
                } else {
                    Poly2dVal::Absolute(numbers(val, &val_path)?)
                };
                let hierarchy = match obj.get("hierarchy") {
                    Some(h) => Some(
                        h.as_array()
                            .ok_or_else(|| FormatError::shape(format!("{path}.hierarchy"), "array"))?
                            .iter()
                            .map(|v| v.as_i64().ok_or_else(|| FormatError::shape(format!("{path}.hierarchy"), "integer")))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    None => None,
                };
                AttributeValue::Poly2d {
                    val,
                    closed: obj.get("closed").and_then(Json::as_bool).unwrap_or(false),
                    hierarchy,
                }
            }
            AttributeKind::Poly3d => AttributeValue::Poly3d {
                val: numbers(val, &val_path)?,
                closed: obj.get("closed").and_then(Json::as_bool).unwrap_or(false),
            },
            AttributeKind::Cuboid => return finish(Self::cuboid(name, numbers(val, &val_path)?)?, obj, path),
            AttributeKind::Mat => {
                let dim = |key: &str| -> Result<u32, FormatError> {
                    obj.get(key)
                        .and_then(Json::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| FormatError::shape(format!("{path}.{key}"), "unsigned integer"))
                };
                let attr = Self::mat(
                    name,
                    numbers(val, &val_path)?,
                    dim("channels")?,
                    dim("width")?,
                    dim("height")?,
                    str_field(obj, "data_type", path)?,
                )?;
                return finish(attr, obj, path);
            }
            AttributeKind::Binary => AttributeValue::Binary {
                val: val.as_str().ok_or_else(|| FormatError::shape(&val_path, "string"))?.to_string(),
                data_type: str_field(obj, "data_type", path)?.to_string(),
                encoding: str_field(obj, "encoding", path)?.to_string(),
            },
            AttributeKind::Image => AttributeValue::Image {
                val: val.as_str().ok_or_else(|| FormatError::shape(&val_path, "string"))?.to_string(),
                mime_type: str_field(obj, "mime_type", path)?.to_string(),
                encoding: str_field(obj, "encoding", path)?.to_string(),
            },
        };
        finish(Self::new(name, value), obj, path)
    }
}

fn finish(mut attr: Attribute, obj: &Map<String, Json>, path: &str) -> Result<Attribute, LabelError> {
    attr.coordinate_system = obj
        .get("coordinate_system")
        .and_then(Json::as_str)
        .map(str::to_string);
    if let Some(nested) = obj.get("attributes") {
        attr.attributes = AttributeSet::from_tree(nested, &format!("{path}.attributes"))?;
    }
    Ok(attr)
}

fn str_field<'a>(obj: &'a Map<String, Json>, key: &str, path: &str) -> Result<&'a str, FormatError> {
    obj.get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| FormatError::shape(format!("{path}.{key}"), "string"))
}

fn numbers(val: &Json, path: &str) -> Result<Vec<f64>, FormatError> {
    val.as_array()
        .ok_or_else(|| FormatError::shape(path, "array of numbers"))?
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| FormatError::shape(path, "array of numbers")))
        .collect()
}

fn fixed_numbers<const N: usize>(val: &Json, path: &str, name: &str) -> Result<[f64; N], LabelError> {
    let values = numbers(val, path)?;
    let len = values.len();
    values.try_into().map_err(|_| {
        ValidationError::InvalidAttribute {
            name: name.to_string(),
            reason: format!("expected {N} values, got {len}"),
        }
        .into()
    })
}

fn poly2d_chain_code(val: &Json, path: &str) -> Result<Poly2dVal, FormatError> {
    let parts = val
        .as_array()
        .filter(|a| a.len() == 4)
        .ok_or_else(|| FormatError::shape(path, "[xinit, yinit, rest, code]"))?;
    let text = |i: usize| {
        parts[i]
            .as_str()
            .ok_or_else(|| FormatError::shape(path, "[xinit, yinit, rest, code]"))
    };
    let int = |i: usize| -> Result<i64, FormatError> {
        text(i)?
            .parse()
            .map_err(|_| FormatError::shape(path, "integer text"))
    };
    Ok(Poly2dVal::Srf6dcc {
        xinit: int(0)?,
        yinit: int(1)?,
        rest: text(2)?
            .parse()
            .map_err(|_| FormatError::shape(path, "integer text"))?,
        encoded: text(3)?.to_string(),
    })
}

/// Attributes grouped by kind, each group in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    by_kind: BTreeMap<AttributeKind, Vec<Attribute>>,
}

impl AttributeSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces by `(kind, name)`.
    ///
    /// A replaced attribute keeps its position. Returns true on replacement.
    pub fn set(&mut self, attr: Attribute) -> bool {
        let group = self.by_kind.entry(attr.kind()).or_default();
        if let Some(slot) = group.iter_mut().find(|a| a.name == attr.name) {
            *slot = attr;
            true
        } else {
            group.push(attr);
            false
        }
    }

    /// First attribute called `name`, across kinds.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.by_kind.values().flatten().find(|a| a.name == name)
    }

    /// Attribute of `kind` called `name`.
    #[must_use]
    pub fn get_kind(&self, kind: AttributeKind, name: &str) -> Option<&Attribute> {
        self.by_kind.get(&kind)?.iter().find(|a| a.name == name)
    }

    /// Attributes of one kind, in insertion order.
    #[must_use]
    pub fn of_kind(&self, kind: AttributeKind) -> &[Attribute] {
        self.by_kind.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Every attribute, grouped by kind.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.by_kind.values().flatten()
    }

    /// True if any attribute is called `name`.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True if the set holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(Vec::is_empty)
    }

    /// Total number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    /// Renders `{ "<kind>": [ ... ], ... }`.
    #[must_use]
    pub fn to_tree(&self) -> Json {
        let mut node = Map::new();
        for (kind, group) in &self.by_kind {
            if group.is_empty() {
                continue;
            }
            node.insert(
                kind.as_str().to_string(),
                Json::Array(group.iter().map(Attribute::to_tree).collect()),
            );
        }
        Json::Object(node)
    }

    /// Parses `{ "<kind>": [ ... ], ... }`.
    ///
    /// # Errors
    ///
    /// Propagates shape and validation errors from individual attributes.
    pub fn from_tree(node: &Json, path: &str) -> Result<Self, LabelError> {
        let obj = node.as_object().ok_or_else(|| FormatError::shape(path, "object"))?;
        let mut set = Self::new();
        for (key, list) in obj {
            let kind: AttributeKind = key.parse()?;
            let group_path = format!("{path}.{key}");
            let items = list
                .as_array()
                .ok_or_else(|| FormatError::shape(&group_path, "array"))?;
            for (i, item) in items.iter().enumerate() {
                set.set(Attribute::from_tree(kind, item, &format!("{group_path}[{i}]"))?);
            }
        }
        Ok(set)
    }
}
