//! TOML description of a scene, so bakes can run without a live host session.
//!
//! ```toml
//! project = "props/crate_set.blend"
//!
//! [[materials]]
//! name = "Wood"
//!
//! [[materials.nodes]]
//! name = "Principled BSDF"
//! type = "principled"
//! inputs = { "Base Color" = [0.6, 0.4, 0.2, 1.0], Roughness = 0.7 }
//!
//! [[materials.nodes]]
//! name = "Material Output"
//! type = "output"
//!
//! [[materials.links]]
//! from = "Principled BSDF:BSDF"
//! to = "Material Output:Surface"
//!
//! [[objects]]
//! name = "Crate"
//! slots = [{ material = "Wood", uv = [0.0, 0.0, 0.5, 1.0] }]
//! ```
//!
//! Links name sockets as `"<node name>:<socket>"`. Node types are
//! `principled`, `output`, `emission`, `image`, `rgb`, `value`; any other type
//! string is kept as an opaque node whose sockets come from `inputs` and
//! `outputs`.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use imagetarget::UvRect;
use serde::Deserialize;

use crate::graph::{NodeKind, ShaderGraph, SocketRef, SocketValue};
use crate::scene::{Material, MaterialSlot, ObjectKind, Scene, SceneObject};
use crate::SceneError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SceneDescription {
    #[serde(default)]
    project: Option<PathBuf>,
    #[serde(default)]
    active: Option<String>,
    #[serde(default)]
    materials: Vec<MaterialDescription>,
    #[serde(default)]
    objects: Vec<ObjectDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MaterialDescription {
    name: String,
    #[serde(default = "default_true")]
    use_nodes: bool,
    #[serde(default)]
    nodes: Vec<NodeDescription>,
    #[serde(default)]
    links: Vec<LinkDescription>,
    #[serde(default)]
    active: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDescription {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    selected: bool,
    #[serde(default)]
    inputs: BTreeMap<String, SocketValue>,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    color: Option<[f32; 4]>,
    #[serde(default)]
    value: Option<f32>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkDescription {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectDescription {
    name: String,
    #[serde(rename = "type", default = "default_object_type")]
    kind: String,
    #[serde(default = "default_true")]
    selected: bool,
    #[serde(default)]
    slots: Vec<SlotDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlotDescription {
    #[serde(default)]
    material: Option<String>,
    #[serde(default)]
    uv: UvRect,
}

fn default_true() -> bool {
    true
}

fn default_object_type() -> String {
    "mesh".to_string()
}

impl Scene {
    pub fn from_toml_str(input: &str) -> Result<Self, SceneError> {
        let description: SceneDescription = toml::from_str(input)?;
        description.build()
    }

    /// Loads a scene file. A relative `project` path is taken relative to the
    /// scene file's directory.
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let raw = fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut description: SceneDescription = toml::from_str(&raw)?;
        if let (Some(project), Some(dir)) = (description.project.as_mut(), path.parent()) {
            if project.is_relative() {
                *project = dir.join(&*project);
            }
        }
        description.build()
    }
}

impl SceneDescription {
    fn build(self) -> Result<Scene, SceneError> {
        let mut scene = Scene::new().with_project(self.project);

        for material in self.materials {
            if scene.material(&material.name).is_some() {
                return Err(SceneError::Invalid(format!(
                    "material '{}' is defined twice",
                    material.name
                )));
            }
            scene.add_material(material.build()?);
        }

        for object in self.objects {
            if scene.object(&object.name).is_some() {
                return Err(SceneError::Invalid(format!(
                    "object '{}' is defined twice",
                    object.name
                )));
            }
            for slot in &object.slots {
                if let Some(name) = &slot.material {
                    if scene.material(name).is_none() {
                        return Err(SceneError::Invalid(format!(
                            "object '{}' references unknown material '{name}'",
                            object.name
                        )));
                    }
                }
            }
            let kind = if object.kind.eq_ignore_ascii_case("mesh") {
                ObjectKind::Mesh
            } else {
                ObjectKind::Other(object.kind.to_ascii_uppercase())
            };
            scene.add_object(SceneObject {
                name: object.name,
                kind,
                selected: object.selected,
                slots: object
                    .slots
                    .into_iter()
                    .map(|slot| MaterialSlot {
                        material: slot.material,
                        uv: slot.uv,
                    })
                    .collect(),
            });
        }

        scene.set_active_object(self.active.as_deref())?;
        Ok(scene)
    }
}

impl MaterialDescription {
    fn build(self) -> Result<Material, SceneError> {
        let material_name = self.name;
        let invalid =
            |detail: String| SceneError::Invalid(format!("material '{material_name}': {detail}"));
        let mut graph = ShaderGraph::new();

        for node in self.nodes {
            if graph.find_by_name(&node.name).is_some() {
                return Err(invalid(format!("node '{}' is defined twice", node.name)));
            }
            let kind = match node.kind.to_ascii_lowercase().as_str() {
                "principled" | "bsdf_principled" => NodeKind::PrincipledBsdf,
                "output" | "output_material" => NodeKind::MaterialOutput,
                "emission" => NodeKind::Emission,
                "image" | "tex_image" => NodeKind::ImageTexture { image: node.image },
                "rgb" => NodeKind::Rgb {
                    color: node.color.unwrap_or([1.0, 1.0, 1.0, 1.0]),
                },
                "value" => NodeKind::Value {
                    value: node.value.unwrap_or(0.0),
                },
                _ => NodeKind::Other(node.kind.to_ascii_uppercase()),
            };
            let opaque = matches!(kind, NodeKind::Other(_));
            let id = graph.add_named_node(node.name.clone(), kind);
            let Some(created) = graph.node_mut(id) else {
                return Err(invalid(format!("node '{}' was not created", node.name)));
            };
            for output in &node.outputs {
                created.add_output(output);
            }
            for (socket, value) in node.inputs {
                if opaque {
                    created.add_input(&socket, Some(value));
                } else {
                    created
                        .set_default(&socket, value)
                        .map_err(|err| invalid(format!("node '{}': {err}", node.name)))?;
                }
            }
            created.selected = node.selected;
        }

        for link in self.links {
            let from = parse_socket(&graph, &link.from).map_err(&invalid)?;
            let to = parse_socket(&graph, &link.to).map_err(&invalid)?;
            if graph.is_linked(&to) {
                return Err(invalid(format!("input '{}' is linked twice", link.to)));
            }
            graph
                .link(from, to)
                .map_err(|err| invalid(format!("link {} -> {}: {err}", link.from, link.to)))?;
        }

        if let Some(active) = self.active {
            let id = graph
                .find_by_name(&active)
                .ok_or_else(|| invalid(format!("active node '{active}' does not exist")))?;
            graph
                .set_active(Some(id))
                .map_err(|err| invalid(err.to_string()))?;
        }

        Ok(Material {
            name: material_name.clone(),
            use_nodes: self.use_nodes,
            graph,
        })
    }
}

fn parse_socket(graph: &ShaderGraph, raw: &str) -> Result<SocketRef, String> {
    let (node, socket) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("socket reference '{raw}' must look like 'Node:Socket'"))?;
    let id = graph
        .find_by_name(node.trim())
        .ok_or_else(|| format!("socket reference '{raw}' names unknown node '{node}'"))?;
    Ok(SocketRef::new(id, socket.trim()))
}
