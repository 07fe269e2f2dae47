//! Renderable objects, their factory and the keyed collection that owns
//! them.
//!
//! Objects never share ownership: the [`ObjectSet`] is the single owner and
//! clearing it destroys every object. Meshes are referenced through a
//! [`MeshHandle`] into an arena owned by the renderer.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec3;

use crate::light::PointLight;
use crate::transform::Transform;

/// Unique, monotonically increasing object identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an immutable mesh in the renderer's mesh arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) u32);

impl MeshHandle {
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Draw category. Render systems match on this to pick a pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ObjectKind {
    /// Lit mesh drawn with the main pipeline.
    Standard,
    /// Environment cube drawn at the far plane behind everything else.
    Skybox,
    /// Small emissive mesh standing in for a point light.
    LightMarker(PointLight),
    /// Mesh that samples the captured environment instead of being lit.
    Reflective,
}

impl ObjectKind {
    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::Standard => "standard",
            ObjectKind::Skybox => "skybox",
            ObjectKind::LightMarker(_) => "light-marker",
            ObjectKind::Reflective => "reflective",
        }
    }
}

/// An application entity that render systems may draw.
#[derive(Clone, Debug)]
pub struct RenderableObject {
    id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub mesh: Option<MeshHandle>,
    pub transform: Transform,
    /// Base colour multiplied into the vertex colour.
    pub color: Vec3,
    /// Cleared instead of removing the object when it should not draw.
    pub render: bool,
}

impl RenderableObject {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn with_mesh(mut self, mesh: MeshHandle) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// True when a render system should issue a draw for this object.
    #[inline]
    pub fn is_drawable(&self) -> bool {
        self.render && self.mesh.is_some()
    }
}

/// Hands out objects with consecutive identifiers.
#[derive(Debug, Default)]
pub struct ObjectFactory {
    next: u32,
}

impl ObjectFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: impl Into<String>, kind: ObjectKind) -> RenderableObject {
        let id = ObjectId(self.next);
        self.next += 1;
        RenderableObject {
            id,
            name: name.into(),
            kind,
            mesh: None,
            transform: Transform::default(),
            color: Vec3::ONE,
            render: true,
        }
    }
}

/// Objects keyed by id, iterated in creation order.
#[derive(Debug, Default)]
pub struct ObjectSet {
    objects: BTreeMap<ObjectId, RenderableObject>,
}

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `object` and returns its id. An object with the
    /// same id is replaced.
    pub fn insert(&mut self, object: RenderableObject) -> ObjectId {
        let id = object.id;
        self.objects.insert(id, object);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&RenderableObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut RenderableObject> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<RenderableObject> {
        self.objects.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderableObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RenderableObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

impl<'a> IntoIterator for &'a ObjectSet {
    type Item = &'a RenderableObject;
    type IntoIter = std::collections::btree_map::Values<'a, ObjectId, RenderableObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_ids_are_monotonic() {
        let mut factory = ObjectFactory::new();
        let a = factory.create("a", ObjectKind::Standard);
        let b = factory.create("b", ObjectKind::Skybox);
        let c = factory.create("c", ObjectKind::Standard);
        assert!(a.id() < b.id() && b.id() < c.id());
        assert_eq!(c.id().get(), 2);
    }

    #[test]
    fn test_new_objects_render_without_mesh() {
        let mut factory = ObjectFactory::new();
        let object = factory.create("empty", ObjectKind::Standard);
        assert!(object.render);
        assert!(!object.is_drawable());
        assert!(object.with_mesh(MeshHandle::from_index(0)).is_drawable());
    }

    #[test]
    fn test_set_iterates_in_creation_order() {
        let mut factory = ObjectFactory::new();
        let mut set = ObjectSet::new();
        let names = ["first", "second", "third"];
        let ids: Vec<_> = names
            .iter()
            .map(|name| set.insert(factory.create(*name, ObjectKind::Standard)))
            .collect();

        let seen: Vec<_> = set.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(seen, names);

        set.remove(ids[1]);
        assert_eq!(set.len(), 2);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ObjectKind::Skybox.label(), "skybox");
        assert_eq!(
            ObjectKind::LightMarker(PointLight::default()).label(),
            "light-marker"
        );
    }
}
