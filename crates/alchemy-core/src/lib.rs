pub mod api;
pub mod element;
pub mod identity;
pub mod time;

pub use element::{ArtifactRef, Element, PlacedElement, PlacementKey, Position};
pub use identity::{Identity, normalize};

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::element::{ArtifactRef, Element};

    /// Deterministic fake artwork for `name`.
    pub fn fake_artifact(name: &str) -> ArtifactRef {
        ArtifactRef::from_png_base64(&format!("img-{}", crate::normalize(name)))
    }

    /// Element without artwork, as restored from client storage.
    pub fn make_element(name: &str) -> Element {
        Element::new(name, format!("A {name}."))
    }

    /// Element with deterministic artwork, as returned by the server.
    pub fn make_rendered_element(name: &str) -> Element {
        make_element(name).with_image(fake_artifact(name))
    }
}
