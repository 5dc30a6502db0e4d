///Shape of a texture resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TextureKind {
    Texture1D,
    Texture2D,
    Texture3D,
}

///Concrete shader-visible color formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ColorFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Rgba32Uint,
}

impl ColorFormat {
    pub fn bytes_per_texel(&self) -> u64 {
        match self {
            ColorFormat::R8Unorm => 1,
            ColorFormat::Rg8Unorm => 2,
            ColorFormat::Rgba8Unorm | ColorFormat::Bgra8Unorm => 4,
            ColorFormat::R16Float => 2,
            ColorFormat::Rg16Float => 4,
            ColorFormat::Rgba16Float => 8,
            ColorFormat::R32Float | ColorFormat::R32Uint => 4,
            ColorFormat::Rg32Float => 8,
            ColorFormat::Rgba32Float | ColorFormat::Rgba32Uint => 16,
        }
    }
}

///Typeless storage formats. Resources created with one of these must be given a concrete
/// [ColorFormat] at every scheduled use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TypelessFormat {
    R8,
    Rg8,
    Rgba8,
    R16,
    Rg16,
    Rgba16,
    R32,
    Rg32,
    Rgba32,
}

impl TypelessFormat {
    pub fn bytes_per_texel(&self) -> u64 {
        match self {
            TypelessFormat::R8 => 1,
            TypelessFormat::Rg8 | TypelessFormat::R16 => 2,
            TypelessFormat::Rgba8 | TypelessFormat::Rg16 | TypelessFormat::R32 => 4,
            TypelessFormat::Rgba16 | TypelessFormat::Rg32 => 8,
            TypelessFormat::Rgba32 => 16,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DepthStencilFormat {
    Depth24Stencil8,
    Depth32Float,
}

impl DepthStencilFormat {
    pub fn bytes_per_texel(&self) -> u64 {
        4
    }
}

///Data type of a texture: either concretely typed, typeless (reinterpreted per use), or a
/// depth-stencil format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FormatVariant {
    Color(ColorFormat),
    Typeless(TypelessFormat),
    DepthStencil(DepthStencilFormat),
}

impl FormatVariant {
    pub fn bytes_per_texel(&self) -> u64 {
        match self {
            FormatVariant::Color(f) => f.bytes_per_texel(),
            FormatVariant::Typeless(f) => f.bytes_per_texel(),
            FormatVariant::DepthStencil(f) => f.bytes_per_texel(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Dimensions {
    pub width: u64,
    pub height: u64,
    pub depth: u64,
}

impl Dimensions {
    pub fn new_2d(width: u64, height: u64) -> Self {
        Dimensions {
            width,
            height,
            depth: 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

///What a resource fundamentally is. Buffers have exactly one subresource, textures one per mip
/// level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResourceKind {
    Texture(TextureKind),
    Buffer,
}

///Full description of a schedulable resource: kind, data type, dimensions and mip count.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ResourceFormat {
    pub kind: ResourceKind,
    pub data_type: FormatVariant,
    pub dimensions: Dimensions,
    pub mip_count: u32,
}

impl ResourceFormat {
    pub fn subresource_count(&self) -> u32 {
        match self.kind {
            ResourceKind::Texture(_) => self.mip_count.max(1),
            ResourceKind::Buffer => 1,
        }
    }

    pub fn is_typeless(&self) -> bool {
        matches!(self.data_type, FormatVariant::Typeless(_))
    }

    pub fn is_depth_stencil(&self) -> bool {
        matches!(self.data_type, FormatVariant::DepthStencil(_))
    }

    ///Total memory footprint over all mips, used by the aliasing memory planner.
    pub fn footprint(&self) -> u64 {
        match self.kind {
            ResourceKind::Buffer => {
                self.dimensions.width * self.data_type.bytes_per_texel().max(1)
            }
            ResourceKind::Texture(_) => {
                let mut total = 0;
                let mut w = self.dimensions.width.max(1);
                let mut h = self.dimensions.height.max(1);
                let mut d = self.dimensions.depth.max(1);
                for _ in 0..self.subresource_count() {
                    total += w * h * d * self.data_type.bytes_per_texel();
                    w = (w / 2).max(1);
                    h = (h / 2).max(1);
                    d = (d / 2).max(1);
                }
                total
            }
        }
    }
}

///Properties of a buffer resource.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BufferProperties {
    pub size: u64,
    pub stride: u64,
}

///Memory heap a buffer lives in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HeapKind {
    Default,
    Upload,
    Readback,
}
