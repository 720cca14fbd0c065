use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Project,
    Dataset,
    Image,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Project => "Project",
            ObjectKind::Dataset => "Dataset",
            ObjectKind::Image => "Image",
        }
    }

    /// Query parameter name used by the webclient annotation endpoint.
    pub fn query_key(&self) -> &'static str {
        match self {
            ObjectKind::Project => "project",
            ObjectKind::Dataset => "dataset",
            ObjectKind::Image => "image",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Kind:<id>` reference, e.g. `Project:51` or `Image:1203`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: i64,
}

impl ObjectRef {
    pub fn project(id: i64) -> Self {
        Self {
            kind: ObjectKind::Project,
            id,
        }
    }

    pub fn dataset(id: i64) -> Self {
        Self {
            kind: ObjectKind::Dataset,
            id,
        }
    }

    pub fn image(id: i64) -> Self {
        Self {
            kind: ObjectKind::Image,
            id,
        }
    }

    pub fn expect_project(self) -> Result<i64, ArcError> {
        match self.kind {
            ObjectKind::Project => Ok(self.id),
            _ => Err(ArcError::NotAProject(self.to_string())),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ObjectRef {
    type Err = ArcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (kind, id) = trimmed
            .split_once(':')
            .ok_or_else(|| ArcError::InvalidObjectRef(value.to_string()))?;
        let kind = match kind {
            "Project" => ObjectKind::Project,
            "Dataset" => ObjectKind::Dataset,
            "Image" => ObjectKind::Image,
            _ => return Err(ArcError::InvalidObjectRef(value.to_string())),
        };
        let id = id
            .parse::<i64>()
            .ok()
            .filter(|id| *id >= 0)
            .ok_or_else(|| ArcError::InvalidObjectRef(value.to_string()))?;
        Ok(Self { kind, id })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experimenter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner: Experimenter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner: Experimenter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub size_x: Option<u64>,
    pub size_y: Option<u64>,
    pub size_z: Option<u64>,
    pub pixel_size_x: Option<PhysicalSize>,
    pub pixel_size_y: Option<PhysicalSize>,
    pub pixel_size_z: Option<PhysicalSize>,
}

impl Image {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::image(self.id)
    }

    /// Unit of the X pixel size, the one reported for the whole image.
    pub fn pixel_size_unit(&self) -> Option<&str> {
        self.pixel_size_x
            .as_ref()
            .and_then(|size| size.unit.as_deref())
    }
}

/// A map annotation: ordered key/value pairs under a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub namespace: Option<String>,
    pub values: Vec<(String, String)>,
}

impl Annotation {
    pub fn new(namespace: &str, values: &[(&str, &str)]) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            values: values
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn matches(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// Last value wins when a key repeats, like building a dict from pairs.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OriginalMetadata {
    pub series: Vec<(String, Value)>,
    pub global: Vec<(String, Value)>,
}

/// Lowercase with spaces turned into dashes: "My First Study" -> "my-first-study".
pub fn fmt_identifier(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}
