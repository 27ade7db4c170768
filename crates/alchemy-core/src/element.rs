use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Reference to generated artwork: an inline `data:` URL or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Wrap base64 PNG bytes as a `data:` URL.
    pub fn from_png_base64(b64: &str) -> Self {
        Self(format!("data:image/png;base64,{b64}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discovered element.
///
/// `image` is always present on elements returned by the generation
/// endpoints. Client-side entries restored from storage carry `None` until
/// their artwork is fetched back from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: Identity,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ArtifactRef>,
}

impl Element {
    /// Build an element, deriving its identity from `name`.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Identity::from_name(&name),
            name,
            description: description.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ArtifactRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

/// Separator between the identity and the sequence number in a placement key.
pub const PLACEMENT_SEPARATOR: char = '_';

/// Key of a single placement on the canvas: `<identity>_<sequence>`.
///
/// The sequence is decimal, so the identity is everything before the last
/// separator even when the identity itself contains `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlacementKey(String);

impl PlacementKey {
    pub fn new(id: &Identity, sequence: u64) -> Self {
        Self(format!("{id}{PLACEMENT_SEPARATOR}{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity portion of the key.
    pub fn identity(&self) -> Identity {
        match self.0.rsplit_once(PLACEMENT_SEPARATOR) {
            Some((id, _)) => Identity::from_name(id),
            None => Identity::from_name(&self.0),
        }
    }

    /// Sequence portion of the key, if it parses.
    pub fn sequence(&self) -> Option<u64> {
        self.0
            .rsplit_once(PLACEMENT_SEPARATOR)
            .and_then(|(_, seq)| seq.parse().ok())
    }
}

impl fmt::Display for PlacementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlacementKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An element placed on the canvas. Copies of one element may coexist, each
/// under its own key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedElement {
    pub key: PlacementKey,
    pub element: Element,
    pub position: Position,
}
