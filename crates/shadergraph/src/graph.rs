//! In-memory node graph for a single material: nodes with named input and
//! output sockets, directed links from outputs to inputs, and the selection /
//! active-node state the host's bake primitive keys off.
//!
//! Types:
//!
//! - `NodeId` is a monotonically allocated handle; ids are never reused within
//!   a graph, so removing inserted nodes restores the exact original id set.
//! - `NodeKind` names the node types the patcher and reference engine
//!   understand; anything else is carried as `Other`.
//! - `SocketValue` is an unlinked input's default (scalar, vector, or colour).
//! - `SocketRef` and `Link` describe graph edges.
//! - `Topology` is a comparable snapshot of nodes and links.
//!
//! Invariant: at most one link terminates at any input socket. `link` replaces
//! an existing link into the same input.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {node} has no input socket '{socket}'")]
    UnknownInput { node: NodeId, socket: String },
    #[error("node {node} has no output socket '{socket}'")]
    UnknownOutput { node: NodeId, socket: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SocketValue {
    Scalar(f32),
    Vector([f32; 3]),
    Color([f32; 4]),
}

impl SocketValue {
    pub fn as_rgb(&self) -> [f32; 3] {
        match *self {
            SocketValue::Scalar(v) => [v, v, v],
            SocketValue::Vector(v) => v,
            SocketValue::Color([r, g, b, _]) => [r, g, b],
        }
    }

    pub fn as_scalar(&self) -> f32 {
        match *self {
            SocketValue::Scalar(v) => v,
            SocketValue::Vector([x, y, z]) | SocketValue::Color([x, y, z, _]) => {
                (x + y + z) / 3.0
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    PrincipledBsdf,
    MaterialOutput,
    Emission,
    ImageTexture { image: Option<String> },
    Rgb { color: [f32; 4] },
    Value { value: f32 },
    Other(String),
}

impl NodeKind {
    pub fn type_name(&self) -> &str {
        match self {
            NodeKind::PrincipledBsdf => "BSDF_PRINCIPLED",
            NodeKind::MaterialOutput => "OUTPUT_MATERIAL",
            NodeKind::Emission => "EMISSION",
            NodeKind::ImageTexture { .. } => "TEX_IMAGE",
            NodeKind::Rgb { .. } => "RGB",
            NodeKind::Value { .. } => "VALUE",
            NodeKind::Other(name) => name,
        }
    }

    fn label(&self) -> &str {
        match self {
            NodeKind::PrincipledBsdf => "Principled BSDF",
            NodeKind::MaterialOutput => "Material Output",
            NodeKind::Emission => "Emission",
            NodeKind::ImageTexture { .. } => "Image Texture",
            NodeKind::Rgb { .. } => "RGB",
            NodeKind::Value { .. } => "Value",
            NodeKind::Other(name) => name,
        }
    }

    fn default_inputs(&self) -> Vec<InputSocket> {
        use SocketValue::{Color, Scalar};
        let sockets: &[(&str, Option<SocketValue>)] = match self {
            NodeKind::PrincipledBsdf => &[
                ("Base Color", Some(Color([0.8, 0.8, 0.8, 1.0]))),
                ("Metallic", Some(Scalar(0.0))),
                ("Roughness", Some(Scalar(0.5))),
                ("IOR", Some(Scalar(1.5))),
                ("Alpha", Some(Scalar(1.0))),
                ("Normal", None),
                ("Specular IOR Level", Some(Scalar(0.5))),
                ("Emission Color", Some(Color([1.0, 1.0, 1.0, 1.0]))),
                ("Emission Strength", Some(Scalar(0.0))),
            ],
            NodeKind::MaterialOutput => &[
                ("Surface", None),
                ("Volume", None),
                ("Displacement", None),
            ],
            NodeKind::Emission => &[
                ("Color", Some(Color([1.0, 1.0, 1.0, 1.0]))),
                ("Strength", Some(Scalar(1.0))),
            ],
            NodeKind::ImageTexture { .. } => &[("Vector", None)],
            NodeKind::Rgb { .. } | NodeKind::Value { .. } | NodeKind::Other(_) => &[],
        };
        sockets
            .iter()
            .map(|(name, default)| InputSocket {
                name: (*name).to_string(),
                default: *default,
            })
            .collect()
    }

    fn default_outputs(&self) -> Vec<String> {
        let outputs: &[&str] = match self {
            NodeKind::PrincipledBsdf => &["BSDF"],
            NodeKind::MaterialOutput => &[],
            NodeKind::Emission => &["Emission"],
            NodeKind::ImageTexture { .. } => &["Color", "Alpha"],
            NodeKind::Rgb { .. } => &["Color"],
            NodeKind::Value { .. } => &["Value"],
            NodeKind::Other(_) => &[],
        };
        outputs.iter().map(|name| (*name).to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSocket {
    pub name: String,
    pub default: Option<SocketValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    inputs: Vec<InputSocket>,
    outputs: Vec<String>,
    pub selected: bool,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn inputs(&self) -> &[InputSocket] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&InputSocket> {
        self.inputs.iter().find(|socket| socket.name == name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|output| output == name)
    }

    pub fn set_default(&mut self, socket: &str, value: SocketValue) -> Result<(), GraphError> {
        let id = self.id;
        let input = self
            .inputs
            .iter_mut()
            .find(|input| input.name == socket)
            .ok_or_else(|| GraphError::UnknownInput {
                node: id,
                socket: socket.to_string(),
            })?;
        input.default = Some(value);
        Ok(())
    }

    /// Declares an extra socket, used for node types the graph has no schema for.
    pub fn add_input(&mut self, name: &str, default: Option<SocketValue>) {
        if self.input(name).is_none() {
            self.inputs.push(InputSocket {
                name: name.to_string(),
                default,
            });
        }
    }

    pub fn add_output(&mut self, name: &str) {
        if !self.has_output(name) {
            self.outputs.push(name.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketRef {
    pub node: NodeId,
    pub socket: String,
}

impl SocketRef {
    pub fn new(node: NodeId, socket: impl Into<String>) -> Self {
        Self {
            node,
            socket: socket.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    pub from: SocketRef,
    pub to: SocketRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub id: NodeId,
    pub kind: NodeKind,
    pub defaults: Vec<(String, Option<SocketValue>)>,
}

/// Comparable view of a graph's nodes, socket defaults, and links.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub nodes: Vec<NodeSummary>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default)]
pub struct ShaderGraph {
    nodes: BTreeMap<NodeId, Node>,
    links: Vec<Link>,
    active: Option<NodeId>,
    next_id: u64,
}

impl ShaderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let name = kind.label().to_string();
        self.add_named_node(name, kind)
    }

    pub fn add_named_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let node = Node {
            id,
            name: name.into(),
            inputs: kind.default_inputs(),
            outputs: kind.default_outputs(),
            kind,
            selected: false,
        };
        self.nodes.insert(id, node);
        id
    }

    /// Removes a node together with every link touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        self.links
            .retain(|link| link.from.node != id && link.to.node != id);
        if self.active == Some(id) {
            self.active = None;
        }
        Some(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| node.name == name)
            .map(Node::id)
    }

    /// First node (in creation order) matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| predicate(&node.kind))
            .map(Node::id)
    }

    pub fn principled(&self) -> Option<NodeId> {
        self.find(|kind| matches!(kind, NodeKind::PrincipledBsdf))
    }

    pub fn material_output(&self) -> Option<NodeId> {
        self.find(|kind| matches!(kind, NodeKind::MaterialOutput))
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Connects `from` (an output) to `to` (an input), returning the link it
    /// displaced, if any.
    pub fn link(&mut self, from: SocketRef, to: SocketRef) -> Result<Option<Link>, GraphError> {
        let source = self
            .nodes
            .get(&from.node)
            .ok_or(GraphError::UnknownNode(from.node))?;
        if !source.has_output(&from.socket) {
            return Err(GraphError::UnknownOutput {
                node: from.node,
                socket: from.socket,
            });
        }
        let target = self
            .nodes
            .get(&to.node)
            .ok_or(GraphError::UnknownNode(to.node))?;
        if target.input(&to.socket).is_none() {
            return Err(GraphError::UnknownInput {
                node: to.node,
                socket: to.socket,
            });
        }

        let displaced = self.unlink_input(&to);
        self.links.push(Link { from, to });
        Ok(displaced)
    }

    pub fn unlink_input(&mut self, to: &SocketRef) -> Option<Link> {
        let index = self.links.iter().position(|link| &link.to == to)?;
        Some(self.links.remove(index))
    }

    /// The output socket currently feeding `to`, if linked.
    pub fn source_of(&self, to: &SocketRef) -> Option<&SocketRef> {
        self.links
            .iter()
            .find(|link| &link.to == to)
            .map(|link| &link.from)
    }

    pub fn is_linked(&self, to: &SocketRef) -> bool {
        self.source_of(to).is_some()
    }

    pub fn deselect_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.selected = false;
        }
    }

    pub fn set_selected(&mut self, id: NodeId, selected: bool) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))?;
        node.selected = selected;
        Ok(())
    }

    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| node.selected)
            .map(Node::id)
            .collect()
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn set_active(&mut self, id: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(id) = id {
            if !self.contains(id) {
                return Err(GraphError::UnknownNode(id));
            }
        }
        self.active = id;
        Ok(())
    }

    pub fn topology(&self) -> Topology {
        let nodes = self
            .nodes
            .values()
            .map(|node| NodeSummary {
                id: node.id,
                kind: node.kind.clone(),
                defaults: node
                    .inputs
                    .iter()
                    .map(|input| (input.name.clone(), input.default))
                    .collect(),
            })
            .collect();
        let mut links = self.links.clone();
        links.sort();
        Topology { nodes, links }
    }
}
