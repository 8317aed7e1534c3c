use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use imagetarget::UvRect;

use crate::graph::ShaderGraph;
use crate::SceneError;

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    /// Materials without a node graph are skipped by the patcher.
    pub use_nodes: bool,
    pub graph: ShaderGraph,
}

impl Material {
    pub fn new(name: impl Into<String>, graph: ShaderGraph) -> Self {
        Self {
            name: name.into(),
            use_nodes: true,
            graph,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Mesh,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSlot {
    pub material: Option<String>,
    /// Footprint of the faces using this slot in the shared UV layout.
    pub uv: UvRect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    pub selected: bool,
    pub slots: Vec<MaterialSlot>,
}

impl SceneObject {
    pub fn mesh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Mesh,
            selected: true,
            slots: Vec::new(),
        }
    }

    pub fn with_slot(mut self, material: Option<&str>, uv: UvRect) -> Self {
        self.slots.push(MaterialSlot {
            material: material.map(str::to_string),
            uv,
        });
        self
    }

    pub fn is_mesh(&self) -> bool {
        self.kind == ObjectKind::Mesh
    }
}

/// Materials, objects, and the object selection a bake run operates on.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    project: Option<PathBuf>,
    materials: BTreeMap<String, Material>,
    objects: Vec<SceneObject>,
    active_object: Option<String>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Option<PathBuf>) -> Self {
        self.project = project;
        self
    }

    /// Path of the saved project file; `None` for an unsaved project.
    pub fn project(&self) -> Option<&Path> {
        self.project.as_deref()
    }

    pub fn add_material(&mut self, material: Material) {
        self.materials.insert(material.name.clone(), material);
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn material_mut(&mut self, name: &str) -> Option<&mut Material> {
        self.materials.get_mut(name)
    }

    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.values()
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|object| object.name == name)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn active_object(&self) -> Option<&str> {
        self.active_object.as_deref()
    }

    pub fn set_active_object(&mut self, name: Option<&str>) -> Result<(), SceneError> {
        if let Some(name) = name {
            if self.object(name).is_none() {
                return Err(SceneError::UnknownObject(name.to_string()));
            }
        }
        self.active_object = name.map(str::to_string);
        Ok(())
    }

    /// Makes `name` the only selected object and the active one.
    pub fn isolate(&mut self, name: &str) -> Result<(), SceneError> {
        if self.object(name).is_none() {
            return Err(SceneError::UnknownObject(name.to_string()));
        }
        for object in &mut self.objects {
            object.selected = object.name == name;
        }
        self.active_object = Some(name.to_string());
        Ok(())
    }

    /// Distinct node-based materials referenced by the object's slots, in slot
    /// order.
    pub fn node_materials_of(&self, object: &str) -> Result<Vec<String>, SceneError> {
        let object = self
            .object(object)
            .ok_or_else(|| SceneError::UnknownObject(object.to_string()))?;
        let mut names: Vec<String> = Vec::new();
        for slot in &object.slots {
            let Some(name) = slot.material.as_deref() else {
                continue;
            };
            let Some(material) = self.materials.get(name) else {
                continue;
            };
            if material.use_nodes && !names.iter().any(|seen| seen == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        scene.add_material(Material::new("Wood", ShaderGraph::new()));
        let mut flat = Material::new("Flat", ShaderGraph::new());
        flat.use_nodes = false;
        scene.add_material(flat);
        scene.add_object(
            SceneObject::mesh("Crate")
                .with_slot(Some("Wood"), UvRect::new(0.0, 0.0, 0.5, 1.0))
                .with_slot(Some("Flat"), UvRect::new(0.5, 0.0, 1.0, 1.0))
                .with_slot(Some("Wood"), UvRect::FULL)
                .with_slot(None, UvRect::FULL),
        );
        scene.add_object(SceneObject::mesh("Barrel"));
        scene.add_object(SceneObject {
            name: "Sun".into(),
            kind: ObjectKind::Other("LIGHT".into()),
            selected: true,
            slots: Vec::new(),
        });
        scene
    }

    #[test]
    fn isolate_selects_exactly_one_object() {
        let mut scene = scene();
        scene.isolate("Barrel").unwrap();
        assert_eq!(scene.active_object(), Some("Barrel"));
        let selected: Vec<_> = scene
            .objects()
            .iter()
            .filter(|object| object.selected)
            .map(|object| object.name.as_str())
            .collect();
        assert_eq!(selected, ["Barrel"]);
        assert!(matches!(
            scene.isolate("Ghost"),
            Err(SceneError::UnknownObject(_))
        ));
    }

    #[test]
    fn node_materials_are_distinct_and_node_based() {
        assert_eq!(scene().node_materials_of("Crate").unwrap(), ["Wood"]);
        assert!(scene().node_materials_of("Barrel").unwrap().is_empty());
    }
}
