use imagetarget::ColorSpace;

/// How the host engine should capture a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeKind {
    /// Capture whatever is wired into the surface as self-lit colour.
    EmissionOverride,
    /// Dedicated tangent-space normal capture.
    SurfaceNormal,
}

/// What to emit when the channel's socket has no upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    ConstantColor,
    ConstantScalar,
    FlatNormal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub id: &'static str,
    pub key: &'static str,
    pub target_socket: &'static str,
    pub bake_kind: BakeKind,
    pub color_space: ColorSpace,
    pub fallback: FallbackPolicy,
    pub enabled_by_default: bool,
}

pub static CHANNELS: [ChannelSpec; 6] = [
    ChannelSpec {
        id: "Base Color",
        key: "base_color",
        target_socket: "Base Color",
        bake_kind: BakeKind::EmissionOverride,
        color_space: ColorSpace::LinearColor,
        fallback: FallbackPolicy::ConstantColor,
        enabled_by_default: true,
    },
    ChannelSpec {
        id: "Roughness",
        key: "roughness",
        target_socket: "Roughness",
        bake_kind: BakeKind::EmissionOverride,
        color_space: ColorSpace::NonColorData,
        fallback: FallbackPolicy::ConstantScalar,
        enabled_by_default: true,
    },
    ChannelSpec {
        id: "Metallic",
        key: "metallic",
        target_socket: "Metallic",
        bake_kind: BakeKind::EmissionOverride,
        color_space: ColorSpace::NonColorData,
        fallback: FallbackPolicy::ConstantScalar,
        enabled_by_default: true,
    },
    ChannelSpec {
        id: "Specular",
        key: "specular",
        target_socket: "Specular IOR Level",
        bake_kind: BakeKind::EmissionOverride,
        color_space: ColorSpace::NonColorData,
        fallback: FallbackPolicy::ConstantScalar,
        enabled_by_default: true,
    },
    ChannelSpec {
        id: "Alpha",
        key: "alpha",
        target_socket: "Alpha",
        bake_kind: BakeKind::EmissionOverride,
        color_space: ColorSpace::LinearColor,
        fallback: FallbackPolicy::ConstantScalar,
        enabled_by_default: false,
    },
    ChannelSpec {
        id: "Normal",
        key: "normal",
        target_socket: "Normal",
        bake_kind: BakeKind::SurfaceNormal,
        // Normals are vectors; an sRGB curve would skew the neutral 0.5 encoding.
        color_space: ColorSpace::NonColorData,
        fallback: FallbackPolicy::FlatNormal,
        enabled_by_default: true,
    },
];

/// Looks a channel up by display id (`Base Color`) or key (`base_color`),
/// ignoring case.
pub fn lookup(name: &str) -> Option<&'static ChannelSpec> {
    let trimmed = name.trim();
    CHANNELS.iter().find(|spec| {
        spec.id.eq_ignore_ascii_case(trimmed) || spec.key.eq_ignore_ascii_case(trimmed)
    })
}

pub fn default_channels() -> impl Iterator<Item = &'static ChannelSpec> {
    CHANNELS.iter().filter(|spec| spec.enabled_by_default)
}
