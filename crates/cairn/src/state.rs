use bitflags::bitflags;

bitflags! {
    ///Combined state a resource (or single subresource) can be in on the GPU. The scheduler
    /// treats the mask as opaque apart from the read/write classification below; states are
    /// freely OR-able.
    pub struct ResourceState: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_ACCESS = 1 << 6;
        const PIXEL_SHADER_ACCESS = 1 << 7;
        const INDIRECT_ARGUMENT = 1 << 8;
        const COPY_DEST = 1 << 9;
        const COPY_SOURCE = 1 << 10;
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 11;
        const PRESENT = 1 << 12;

        const ANY_SHADER_ACCESS =
            Self::NON_PIXEL_SHADER_ACCESS.bits | Self::PIXEL_SHADER_ACCESS.bits;
    }
}

impl ResourceState {
    ///The implicit state of a resource nothing has touched yet.
    pub const COMMON: ResourceState = ResourceState::empty();

    const WRITE_STATES: ResourceState = ResourceState::from_bits_truncate(
        Self::RENDER_TARGET.bits
            | Self::UNORDERED_ACCESS.bits
            | Self::DEPTH_WRITE.bits
            | Self::COPY_DEST.bits,
    );

    ///True if no bit of the mask implies GPU writes. [COMMON](Self::COMMON) counts as read only.
    pub fn is_read_only(&self) -> bool {
        !self.intersects(Self::WRITE_STATES)
    }
}

bitflags! {
    ///Access modes a pass requested for a subresource. Unlike [ResourceState] this records the
    /// *binding* intention (descriptor kind), which resource providers validate against at
    /// render time.
    pub struct AccessFlags: u16 {
        const TEXTURE_RT = 1 << 0;
        const TEXTURE_DS = 1 << 1;
        const TEXTURE_SR = 1 << 2;
        const TEXTURE_UA = 1 << 3;
        const BUFFER_CB = 1 << 4;
        const BUFFER_SR = 1 << 5;
        const BUFFER_UA = 1 << 6;
    }
}
