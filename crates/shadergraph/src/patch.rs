//! Temporarily rewrites a material so a single channel reaches the output
//! node's `Surface` as emission, and puts it back afterwards.
//!
//! `patch` deselects every node, inserts an image-texture node bound to the
//! bake target as the sole selected and active node, and routes the channel
//! (or its fallback constant) through a fresh emission node into `Surface`.
//! The returned `PatchRecord` holds everything `restore` needs to undo it:
//! the inserted node ids, the original `Surface` source, and the prior
//! selection. Restoring a record twice is a no-op.
//!
//! A material that cannot be patched is still deselected, so a bake never
//! sees one of its own images as active. Its prior selection comes back in a
//! `SelectionRecord` for [`reinstate`].
use imagetarget::ImageTarget;
use tracing::{debug, warn};

use crate::channel::{ChannelSpec, FallbackPolicy};
use crate::graph::{GraphError, NodeId, NodeKind, ShaderGraph, SocketRef, SocketValue};
use crate::scene::Material;

const SURFACE: &str = "Surface";
const FLAT_NORMAL: [f32; 4] = [0.5, 0.5, 1.0, 1.0];
const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("material '{material}' lost its {node} node while patched")]
    MissingNode {
        material: String,
        node: &'static str,
    },
    #[error("nodes inserted into material '{0}' vanished before restore")]
    InsertedNodesMissing(String),
    #[error("original surface source of material '{0}' no longer exists")]
    OriginalSourceMissing(String),
    #[error("record for material '{record}' applied to material '{material}'")]
    WrongMaterial { record: String, material: String },
    #[error("graph edit failed in material '{material}': {source}")]
    Graph {
        material: String,
        #[source]
        source: GraphError,
    },
}

/// State of the sampled channel's input socket before patching.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelInput {
    Linked(SocketRef),
    /// Unlinked; `None` when the socket carries no default value.
    Default(Option<SocketValue>),
    /// The principal node has no socket of that name.
    MissingSocket,
}

impl ChannelInput {
    fn default_value(&self) -> Option<SocketValue> {
        match self {
            ChannelInput::Default(value) => *value,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotNodeBased,
    MissingPrincipled,
    MissingOutput,
}

/// Node selection a material had before the patcher cleared it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRecord {
    material: String,
    nodes: Vec<NodeId>,
    active: Option<NodeId>,
}

impl SelectionRecord {
    fn capture(material: &str, graph: &ShaderGraph) -> Self {
        Self {
            material: material.to_string(),
            nodes: graph.selected_nodes(),
            active: graph.active(),
        }
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }
}

#[derive(Debug)]
pub enum PatchOutcome {
    Patched(PatchRecord),
    /// The material cannot be baked. A node-based material is left with no
    /// selected or active node until [`reinstate`] is called with the held
    /// selection, so the bake cannot write into one of its own images.
    Skipped(SkipReason, Option<SelectionRecord>),
}

#[derive(Debug)]
pub struct PatchRecord {
    material: String,
    image_node: NodeId,
    emission_node: NodeId,
    principled_node: NodeId,
    output_node: NodeId,
    original_surface: Option<SocketRef>,
    channel_input: ChannelInput,
    selection: SelectionRecord,
    restored: bool,
}

impl PatchRecord {
    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn image_node(&self) -> NodeId {
        self.image_node
    }

    pub fn emission_node(&self) -> NodeId {
        self.emission_node
    }

    pub fn original_surface(&self) -> Option<&SocketRef> {
        self.original_surface.as_ref()
    }

    pub fn channel_input(&self) -> &ChannelInput {
        &self.channel_input
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }
}

pub fn patch(
    material: &mut Material,
    channel: &ChannelSpec,
    target: &ImageTarget,
) -> Result<PatchOutcome, PatchError> {
    if !material.use_nodes {
        debug!(material = %material.name, "material has no node graph; skipping");
        return Ok(PatchOutcome::Skipped(SkipReason::NotNodeBased, None));
    }

    let name = material.name.clone();
    let graph = &mut material.graph;
    let selection = SelectionRecord::capture(&name, graph);

    graph.deselect_all();
    let (principled_node, output_node) = match (graph.principled(), graph.material_output()) {
        (Some(principled), Some(output)) => (principled, output),
        (principled, _) => {
            let reason = if principled.is_none() {
                SkipReason::MissingPrincipled
            } else {
                SkipReason::MissingOutput
            };
            warn!(material = %name, ?reason, "material lacks principled or output node; skipping");
            graph
                .set_active(None)
                .map_err(|source| graph_error(&name, source))?;
            return Ok(PatchOutcome::Skipped(reason, Some(selection)));
        }
    };

    let image_node = graph.add_node(NodeKind::ImageTexture {
        image: Some(target.name().to_string()),
    });
    graph
        .set_selected(image_node, true)
        .and_then(|_| graph.set_active(Some(image_node)))
        .map_err(|source| graph_error(&name, source))?;

    let surface = SocketRef::new(output_node, SURFACE);
    let original_surface = graph.source_of(&surface).cloned();

    let channel_socket = SocketRef::new(principled_node, channel.target_socket);
    let channel_input = match graph.source_of(&channel_socket) {
        Some(source) => ChannelInput::Linked(source.clone()),
        None => match graph
            .node(principled_node)
            .and_then(|node| node.input(channel.target_socket))
        {
            Some(input) => ChannelInput::Default(input.default),
            None => ChannelInput::MissingSocket,
        },
    };

    let emission_node = graph.add_node(NodeKind::Emission);
    let record = PatchRecord {
        material: name.clone(),
        image_node,
        emission_node,
        principled_node,
        output_node,
        original_surface,
        channel_input,
        selection,
        restored: false,
    };

    if let Err(source) = wire_emission(graph, &record, channel.fallback) {
        graph.remove_node(emission_node);
        graph.remove_node(image_node);
        if let Some(original) = record.original_surface.clone() {
            let _ = graph.link(original, surface);
        }
        reselect(graph, &record.selection);
        return Err(graph_error(&name, source));
    }

    debug!(
        material = %name,
        channel = channel.id,
        image = target.name(),
        linked = matches!(record.channel_input, ChannelInput::Linked(_)),
        "patched material for bake"
    );
    Ok(PatchOutcome::Patched(record))
}

fn wire_emission(
    graph: &mut ShaderGraph,
    record: &PatchRecord,
    fallback: FallbackPolicy,
) -> Result<(), GraphError> {
    let emission = record.emission_node;
    let (color, strength) = match &record.channel_input {
        ChannelInput::Linked(source) => {
            graph.link(source.clone(), SocketRef::new(emission, "Color"))?;
            (None, 1.0)
        }
        unlinked => {
            let default = unlinked.default_value();
            match fallback {
                FallbackPolicy::ConstantColor => {
                    let [r, g, b] = default.map(|value| value.as_rgb()).unwrap_or([1.0; 3]);
                    (Some([r, g, b, 1.0]), 1.0)
                }
                FallbackPolicy::ConstantScalar => (
                    Some(WHITE),
                    default.map(|value| value.as_scalar()).unwrap_or(1.0),
                ),
                FallbackPolicy::FlatNormal => (Some(FLAT_NORMAL), 1.0),
            }
        }
    };

    let node = graph
        .node_mut(emission)
        .ok_or(GraphError::UnknownNode(emission))?;
    if let Some(color) = color {
        node.set_default("Color", SocketValue::Color(color))?;
    }
    node.set_default("Strength", SocketValue::Scalar(strength))?;

    graph.link(
        SocketRef::new(emission, "Emission"),
        SocketRef::new(record.output_node, SURFACE),
    )?;
    Ok(())
}

/// Undoes a patch. Whatever inserted nodes are still present are removed and
/// the prior selection comes back even when the graph was damaged while
/// patched; the damage is then reported as an error. The record is spent
/// either way.
pub fn restore(material: &mut Material, record: &mut PatchRecord) -> Result<(), PatchError> {
    if record.restored {
        return Ok(());
    }
    if material.name != record.material {
        return Err(PatchError::WrongMaterial {
            record: record.material.clone(),
            material: material.name.clone(),
        });
    }

    let name = material.name.clone();
    let graph = &mut material.graph;
    let mut damage: Option<PatchError> = None;
    if !graph.contains(record.output_node) {
        damage = Some(PatchError::MissingNode {
            material: name.clone(),
            node: "output",
        });
    } else if !graph.contains(record.principled_node) {
        damage = Some(PatchError::MissingNode {
            material: name.clone(),
            node: "principled",
        });
    } else if !graph.contains(record.image_node) || !graph.contains(record.emission_node) {
        damage = Some(PatchError::InsertedNodesMissing(name.clone()));
    }

    let surface = SocketRef::new(record.output_node, SURFACE);
    graph.unlink_input(&surface);
    graph.remove_node(record.emission_node);
    graph.remove_node(record.image_node);
    if let Some(original) = record.original_surface.clone() {
        if !graph.contains(original.node) {
            damage.get_or_insert_with(|| PatchError::OriginalSourceMissing(name.clone()));
        } else if graph.contains(record.output_node) {
            if let Err(source) = graph.link(original, surface) {
                damage.get_or_insert_with(|| graph_error(&name, source));
            }
        }
    }
    reselect(graph, &record.selection);
    record.restored = true;

    match damage {
        Some(err) => {
            warn!(material = %name, error = %err, "restored damaged material");
            Err(err)
        }
        None => {
            debug!(material = %name, "restored material after bake");
            Ok(())
        }
    }
}

/// Gives a skipped material back the selection it had before `patch`.
pub fn reinstate(material: &mut Material, selection: &SelectionRecord) -> Result<(), PatchError> {
    if material.name != selection.material {
        return Err(PatchError::WrongMaterial {
            record: selection.material.clone(),
            material: material.name.clone(),
        });
    }
    reselect(&mut material.graph, selection);
    Ok(())
}

fn reselect(graph: &mut ShaderGraph, selection: &SelectionRecord) {
    graph.deselect_all();
    for id in &selection.nodes {
        let _ = graph.set_selected(*id, true);
    }
    let active = selection.active.filter(|id| graph.contains(*id));
    let _ = graph.set_active(active);
}

fn graph_error(material: &str, source: GraphError) -> PatchError {
    PatchError::Graph {
        material: material.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::lookup;
    use crate::graph::Topology;
    use imagetarget::{ColorSpace, ImageTargetManager, OutputDirResolver};

    fn images() -> ImageTargetManager {
        let mut images = ImageTargetManager::new(OutputDirResolver::new("/"));
        images
            .create_target("bake", 4, 4, ColorSpace::LinearColor)
            .unwrap();
        images
    }

    /// Principled -> Output, a noise texture feeding Roughness, and an
    /// unrelated pre-existing image node that starts out active.
    fn wood() -> (Material, NodeId, NodeId, NodeId) {
        let mut graph = ShaderGraph::new();
        let bsdf = graph.add_node(NodeKind::PrincipledBsdf);
        let output = graph.add_node(NodeKind::MaterialOutput);
        let noise = graph.add_named_node("Noise", NodeKind::Other("TEX_NOISE".into()));
        graph.node_mut(noise).unwrap().add_output("Fac");
        let existing = graph.add_node(NodeKind::ImageTexture {
            image: Some("wood_diffuse".into()),
        });
        graph
            .link(SocketRef::new(bsdf, "BSDF"), SocketRef::new(output, "Surface"))
            .unwrap();
        graph
            .link(SocketRef::new(noise, "Fac"), SocketRef::new(bsdf, "Roughness"))
            .unwrap();
        graph
            .link(SocketRef::new(existing, "Color"), SocketRef::new(bsdf, "Base Color"))
            .unwrap();
        graph
            .node_mut(bsdf)
            .unwrap()
            .set_default("Metallic", SocketValue::Scalar(0.25))
            .unwrap();
        graph.set_selected(existing, true).unwrap();
        graph.set_active(Some(existing)).unwrap();
        (Material::new("Wood", graph), bsdf, output, noise)
    }

    fn patched(material: &mut Material, channel: &str) -> PatchRecord {
        let images = images();
        let target = images.get("bake").unwrap();
        match patch(material, lookup(channel).unwrap(), target).unwrap() {
            PatchOutcome::Patched(record) => record,
            PatchOutcome::Skipped(reason, _) => panic!("unexpected skip: {reason:?}"),
        }
    }

    fn emission_defaults(material: &Material, record: &PatchRecord) -> (SocketValue, SocketValue) {
        let node = material.graph.node(record.emission_node()).unwrap();
        (
            node.input("Color").unwrap().default.unwrap(),
            node.input("Strength").unwrap().default.unwrap(),
        )
    }

    #[test]
    fn round_trip_restores_topology_for_every_channel() {
        for spec in crate::channel::CHANNELS.iter() {
            let (mut material, ..) = wood();
            let before: Topology = material.graph.topology();
            let selection = material.graph.selected_nodes();
            let active = material.graph.active();

            let mut record = patched(&mut material, spec.id);
            assert_ne!(material.graph.topology(), before);
            restore(&mut material, &mut record).unwrap();

            assert_eq!(material.graph.topology(), before, "channel {}", spec.id);
            assert_eq!(material.graph.selected_nodes(), selection);
            assert_eq!(material.graph.active(), active);
        }
    }

    #[test]
    fn single_image_node_is_selected_and_active() {
        let (mut material, ..) = wood();
        let extra = material.graph.add_node(NodeKind::ImageTexture { image: None });
        material.graph.set_selected(extra, true).unwrap();

        let record = patched(&mut material, "Roughness");
        let selected_images: Vec<NodeId> = material
            .graph
            .nodes()
            .filter(|node| node.selected && matches!(node.kind, NodeKind::ImageTexture { .. }))
            .map(|node| node.id())
            .collect();
        assert_eq!(selected_images, [record.image_node()]);
        assert_eq!(material.graph.active(), Some(record.image_node()));
        assert_eq!(
            material.graph.node(record.image_node()).unwrap().kind,
            NodeKind::ImageTexture {
                image: Some("bake".into())
            }
        );
    }

    #[test]
    fn linked_channel_is_routed_into_emission() {
        let (mut material, _, output, noise) = wood();
        let record = patched(&mut material, "Roughness");
        let emission = record.emission_node();

        assert_eq!(
            record.channel_input(),
            &ChannelInput::Linked(SocketRef::new(noise, "Fac"))
        );
        assert_eq!(
            material.graph.source_of(&SocketRef::new(emission, "Color")),
            Some(&SocketRef::new(noise, "Fac"))
        );
        assert_eq!(
            material.graph.source_of(&SocketRef::new(output, "Surface")),
            Some(&SocketRef::new(emission, "Emission"))
        );
        let (_, strength) = emission_defaults(&material, &record);
        assert_eq!(strength, SocketValue::Scalar(1.0));
    }

    #[test]
    fn constant_scalar_fallback_uses_default_as_strength() {
        let (mut material, ..) = wood();
        let record = patched(&mut material, "Metallic");
        assert_eq!(
            emission_defaults(&material, &record),
            (SocketValue::Color(WHITE), SocketValue::Scalar(0.25))
        );
    }

    #[test]
    fn constant_color_fallback_forces_opaque_alpha() {
        let (mut material, bsdf, ..) = wood();
        let existing = material
            .graph
            .find(|kind| matches!(kind, NodeKind::ImageTexture { .. }))
            .unwrap();
        material.graph.remove_node(existing);
        material
            .graph
            .node_mut(bsdf)
            .unwrap()
            .set_default("Base Color", SocketValue::Color([0.2, 0.4, 0.6, 0.3]))
            .unwrap();
        let record = patched(&mut material, "Base Color");
        assert_eq!(
            emission_defaults(&material, &record),
            (
                SocketValue::Color([0.2, 0.4, 0.6, 1.0]),
                SocketValue::Scalar(1.0)
            )
        );
    }

    #[test]
    fn flat_normal_fallback_for_unlinked_normal() {
        let (mut material, ..) = wood();
        let record = patched(&mut material, "Normal");
        assert_eq!(record.channel_input(), &ChannelInput::Default(None));
        assert_eq!(
            emission_defaults(&material, &record),
            (SocketValue::Color(FLAT_NORMAL), SocketValue::Scalar(1.0))
        );
    }

    #[test]
    fn absent_default_falls_back_to_white_and_unit_strength() {
        let images = images();
        let target = images.get("bake").unwrap();
        let no_default = ChannelSpec {
            id: "Normal Strength",
            key: "normal_strength",
            target_socket: "Normal",
            bake_kind: crate::channel::BakeKind::EmissionOverride,
            color_space: ColorSpace::NonColorData,
            fallback: FallbackPolicy::ConstantScalar,
            enabled_by_default: false,
        };
        let missing_socket = ChannelSpec {
            id: "Sheen",
            key: "sheen",
            target_socket: "Sheen Tint",
            fallback: FallbackPolicy::ConstantColor,
            ..no_default.clone()
        };

        for spec in [&no_default, &missing_socket] {
            let (mut material, ..) = wood();
            let PatchOutcome::Patched(record) = patch(&mut material, spec, target).unwrap() else {
                panic!("expected patch for {}", spec.id);
            };
            assert_eq!(
                emission_defaults(&material, &record),
                (SocketValue::Color(WHITE), SocketValue::Scalar(1.0)),
                "channel {}",
                spec.id
            );
        }
    }

    #[test]
    fn unsurfaced_output_is_left_unlinked_after_restore() {
        let mut graph = ShaderGraph::new();
        graph.add_node(NodeKind::PrincipledBsdf);
        let output = graph.add_node(NodeKind::MaterialOutput);
        let mut material = Material::new("Bare", graph);
        let before = material.graph.topology();

        let mut record = patched(&mut material, "Roughness");
        assert!(record.original_surface().is_none());
        restore(&mut material, &mut record).unwrap();

        assert!(!material.graph.is_linked(&SocketRef::new(output, "Surface")));
        assert_eq!(material.graph.topology(), before);
    }

    #[test]
    fn restore_twice_is_a_no_op() {
        let (mut material, ..) = wood();
        let mut record = patched(&mut material, "Roughness");
        restore(&mut material, &mut record).unwrap();
        let after_first = material.graph.topology();
        restore(&mut material, &mut record).unwrap();
        assert_eq!(material.graph.topology(), after_first);
        assert!(record.is_restored());
    }

    #[test]
    fn restore_cleans_up_after_vanished_nodes() {
        let (mut material, _, output, _) = wood();
        let before = material.graph.topology();
        let mut record = patched(&mut material, "Roughness");
        material.graph.remove_node(record.emission_node());
        let err = restore(&mut material, &mut record).unwrap_err();
        assert!(matches!(err, PatchError::InsertedNodesMissing(_)));
        assert!(record.is_restored());
        assert!(!material.graph.contains(record.image_node()));
        assert_eq!(material.graph.topology(), before);
        assert!(material.graph.is_linked(&SocketRef::new(output, "Surface")));
    }

    #[test]
    fn restore_removes_inserted_nodes_when_surface_source_is_gone() {
        let mut graph = ShaderGraph::new();
        graph.add_node(NodeKind::PrincipledBsdf);
        let output = graph.add_node(NodeKind::MaterialOutput);
        let mix = graph.add_named_node("M", NodeKind::Other("MIX_SHADER".into()));
        graph.node_mut(mix).unwrap().add_output("Shader");
        graph
            .link(SocketRef::new(mix, "Shader"), SocketRef::new(output, "Surface"))
            .unwrap();
        let mut material = Material::new("Layered", graph);

        let mut record = patched(&mut material, "Roughness");
        material.graph.remove_node(mix);
        let err = restore(&mut material, &mut record).unwrap_err();

        assert!(matches!(err, PatchError::OriginalSourceMissing(_)));
        assert!(!material.graph.contains(record.emission_node()));
        assert!(!material.graph.contains(record.image_node()));
        assert_eq!(material.graph.source_of(&SocketRef::new(output, "Surface")), None);
        assert!(restore(&mut material, &mut record).is_ok());
    }

    #[test]
    fn restore_survives_selection_changes_during_bake() {
        let (mut material, ..) = wood();
        let before = material.graph.topology();
        let mut record = patched(&mut material, "Roughness");
        material.graph.deselect_all();
        material.graph.set_active(None).unwrap();
        restore(&mut material, &mut record).unwrap();
        assert_eq!(material.graph.topology(), before);
    }

    #[test]
    fn skips_materials_without_principled_or_output() {
        let mut graph = ShaderGraph::new();
        graph.add_node(NodeKind::MaterialOutput);
        let mut material = Material::new("Emissive", graph);
        let before = material.graph.topology();
        let images = images();
        let outcome = patch(
            &mut material,
            lookup("Roughness").unwrap(),
            images.get("bake").unwrap(),
        )
        .unwrap();
        assert!(matches!(
            outcome,
            PatchOutcome::Skipped(SkipReason::MissingPrincipled, Some(_))
        ));
        assert_eq!(material.graph.topology(), before);

        material.use_nodes = false;
        let outcome = patch(
            &mut material,
            lookup("Roughness").unwrap(),
            images.get("bake").unwrap(),
        )
        .unwrap();
        assert!(matches!(
            outcome,
            PatchOutcome::Skipped(SkipReason::NotNodeBased, None)
        ));
    }

    #[test]
    fn skipped_material_stays_deselected_until_reinstated() {
        let mut graph = ShaderGraph::new();
        graph.add_node(NodeKind::MaterialOutput);
        let decal = graph.add_node(NodeKind::ImageTexture {
            image: Some("decal_diffuse".into()),
        });
        graph.set_selected(decal, true).unwrap();
        graph.set_active(Some(decal)).unwrap();
        let mut material = Material::new("Decal", graph);

        let images = images();
        let outcome = patch(
            &mut material,
            lookup("Roughness").unwrap(),
            images.get("bake").unwrap(),
        )
        .unwrap();
        let PatchOutcome::Skipped(SkipReason::MissingPrincipled, Some(selection)) = outcome else {
            panic!("expected skip with held selection");
        };
        assert!(material.graph.selected_nodes().is_empty());
        assert_eq!(material.graph.active(), None);

        reinstate(&mut material, &selection).unwrap();
        assert_eq!(material.graph.selected_nodes(), [decal]);
        assert_eq!(material.graph.active(), Some(decal));

        let mut other = Material::new("Wood", ShaderGraph::new());
        assert!(matches!(
            reinstate(&mut other, &selection),
            Err(PatchError::WrongMaterial { .. })
        ));
    }

    #[test]
    fn restore_rejects_foreign_material() {
        let (mut material, ..) = wood();
        let mut record = patched(&mut material, "Roughness");
        let mut other = Material::new("Metal", ShaderGraph::new());
        assert!(matches!(
            restore(&mut other, &mut record),
            Err(PatchError::WrongMaterial { .. })
        ));
    }
}
