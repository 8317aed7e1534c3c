use imagetarget::ImageTargetManager;
use shadergraph::{
    BakeKind, Material, Node, NodeKind, Scene, ShaderGraph, SocketRef, SocketValue,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeMode {
    /// Capture whatever reaches `Surface` as emitted colour.
    Emission,
    /// Tangent-space normal capture.
    Normal,
}

impl From<BakeKind> for BakeMode {
    fn from(kind: BakeKind) -> Self {
        match kind {
            BakeKind::EmissionOverride => BakeMode::Emission,
            BakeKind::SurfaceNormal => BakeMode::Normal,
        }
    }
}

/// One invocation of the bake primitive: the active object and what to capture.
#[derive(Debug, Clone, Copy)]
pub struct BakeRequest<'a> {
    pub object: &'a str,
    pub mode: BakeMode,
}

#[derive(Debug, thiserror::Error)]
pub enum BakeEngineError {
    #[error("cannot bake material '{material}': {detail}")]
    Unsupported { material: String, detail: String },
    #[error("material '{material}' targets image '{image}' which is not allocated")]
    MissingTarget { material: String, image: String },
    #[error("object '{0}' is not in the scene")]
    UnknownObject(String),
    #[error("bake failed: {0}")]
    Failed(String),
}

/// The host's bake primitive. Implementations write into the image bound to the
/// active image node of each material on the active object.
pub trait BakeEngine {
    fn bake(
        &mut self,
        scene: &Scene,
        request: &BakeRequest<'_>,
        images: &mut ImageTargetManager,
    ) -> Result<(), BakeEngineError>;
}

/// CPU stand-in for a render engine.
///
/// Evaluates the emission shader wired into each material's `Surface` (a
/// constant, or an RGB / Value node upstream of `Color` and `Strength`) and
/// fills the material slot's UV rectangle in the active image with the result.
/// Anything else upstream is reported as [`BakeEngineError::Unsupported`].
#[derive(Debug, Default)]
pub struct UvFillEngine {
    bakes: usize,
}

impl UvFillEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bake calls served so far.
    pub fn bakes(&self) -> usize {
        self.bakes
    }
}

impl BakeEngine for UvFillEngine {
    fn bake(
        &mut self,
        scene: &Scene,
        request: &BakeRequest<'_>,
        images: &mut ImageTargetManager,
    ) -> Result<(), BakeEngineError> {
        self.bakes += 1;
        let object = scene
            .object(request.object)
            .ok_or_else(|| BakeEngineError::UnknownObject(request.object.to_string()))?;

        for slot in &object.slots {
            let Some(material) = slot.material.as_deref().and_then(|name| scene.material(name))
            else {
                continue;
            };
            let Some(image) = active_image(material) else {
                debug!(material = %material.name, "no active image node; slot left untouched");
                continue;
            };
            let color = evaluate_surface(material)?;
            let target = images
                .get_mut(image)
                .ok_or_else(|| BakeEngineError::MissingTarget {
                    material: material.name.clone(),
                    image: image.to_string(),
                })?;
            let written = target.fill_region(slot.uv, color);
            debug!(
                object = request.object,
                material = %material.name,
                image,
                pixels = written,
                mode = ?request.mode,
                "filled slot"
            );
        }
        Ok(())
    }
}

fn active_image(material: &Material) -> Option<&str> {
    if !material.use_nodes {
        return None;
    }
    let graph = &material.graph;
    match &graph.node(graph.active()?)?.kind {
        NodeKind::ImageTexture { image } => image.as_deref(),
        _ => None,
    }
}

fn evaluate_surface(material: &Material) -> Result<[f32; 4], BakeEngineError> {
    let unsupported = |detail: String| BakeEngineError::Unsupported {
        material: material.name.clone(),
        detail,
    };
    let graph = &material.graph;
    let output = graph
        .material_output()
        .ok_or_else(|| unsupported("no material output node".into()))?;
    let source = graph
        .source_of(&SocketRef::new(output, "Surface"))
        .ok_or_else(|| unsupported("nothing is wired into Surface".into()))?;
    let shader = graph
        .node(source.node)
        .ok_or_else(|| unsupported(format!("surface source {} does not exist", source.node)))?;
    if shader.kind != NodeKind::Emission {
        return Err(unsupported(format!(
            "surface shader {} cannot be evaluated",
            shader.kind.type_name()
        )));
    }

    let [r, g, b] = input_value(graph, shader, "Color")
        .map_err(&unsupported)?
        .as_rgb();
    let strength = input_value(graph, shader, "Strength")
        .map_err(&unsupported)?
        .as_scalar();
    Ok([r * strength, g * strength, b * strength, 1.0])
}

fn input_value(graph: &ShaderGraph, node: &Node, socket: &str) -> Result<SocketValue, String> {
    let Some(from) = graph.source_of(&SocketRef::new(node.id(), socket)) else {
        return Ok(node
            .input(socket)
            .and_then(|input| input.default)
            .unwrap_or(SocketValue::Scalar(1.0)));
    };
    let upstream = graph
        .node(from.node)
        .ok_or_else(|| format!("{socket} is linked from missing node {}", from.node))?;
    match &upstream.kind {
        NodeKind::Rgb { color } => Ok(SocketValue::Color(*color)),
        NodeKind::Value { value } => Ok(SocketValue::Scalar(*value)),
        other => Err(format!(
            "{socket} is driven by {} which cannot be evaluated",
            other.type_name()
        )),
    }
}
