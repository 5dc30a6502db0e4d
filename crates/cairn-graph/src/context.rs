use cairn::backend::GraphicsBackend;
use cairn::state::AccessFlags;
use cairn::Name;

use crate::graph::Node;
use crate::pass::{PipelineStateCache, PipelineStateDesc};
use crate::resources::{BufferKey, ResourceStore, TextureKey};

///Looks up resources for a rendering pass, validating that they were actually scheduled with
/// the requested access mode. Violations are programming errors and only checked in debug
/// builds; release builds trust the declarations.
pub struct ResourceProvider<'a> {
    store: &'a ResourceStore,
    node: &'a Node,
}

impl<'a> ResourceProvider<'a> {
    pub(crate) fn new(store: &'a ResourceStore, node: &'a Node) -> Self {
        ResourceProvider { store, node }
    }

    ///The pass graph node currently rendering.
    pub fn current_pass_node(&self) -> &Node {
        self.node
    }

    ///A texture scheduled for shader reads in this pass.
    pub fn readable_texture(&self, resource: impl Into<Name>, mip: u32) -> Option<TextureKey> {
        self.texture_with_access(resource.into(), mip, AccessFlags::TEXTURE_SR)
    }

    ///A texture scheduled for unordered access writes in this pass.
    pub fn writable_texture(&self, resource: impl Into<Name>, mip: u32) -> Option<TextureKey> {
        self.texture_with_access(resource.into(), mip, AccessFlags::TEXTURE_UA)
    }

    pub fn buffer(&self, resource: impl Into<Name>) -> Option<BufferKey> {
        let resource = resource.into();
        let entry = self.store.get(resource)?;
        debug_assert!(
            entry
                .scheduling_info
                .info_for_pass(self.node.metadata().name)
                .is_some(),
            "resource {resource} was not scheduled for pass {}",
            self.node.metadata().name
        );
        entry.buffer
    }

    pub fn texture_format(
        &self,
        resource: impl Into<Name>,
    ) -> Option<&cairn::format::ResourceFormat> {
        self.store
            .get(resource.into())
            .map(|entry| entry.scheduling_info.format())
    }

    fn texture_with_access(
        &self,
        resource: Name,
        mip: u32,
        access: AccessFlags,
    ) -> Option<TextureKey> {
        let entry = self.store.get(resource)?;
        let pass = self.node.metadata().name;

        debug_assert!(
            mip < entry.scheduling_info.subresource_count(),
            "subresource index {mip} out of range for {resource}"
        );

        let scheduled = entry
            .scheduling_info
            .info_for_pass(pass)
            .and_then(|info| info.subresource_infos.get(mip as usize).copied().flatten());
        debug_assert!(
            scheduled.is_some(),
            "resource {resource} mip {mip} was not scheduled for pass {pass}"
        );
        debug_assert!(
            scheduled.map_or(false, |info| info.access_flags.intersects(access)),
            "resource {resource} was not scheduled with access {access:?} in pass {pass}"
        );

        entry.texture
    }
}

///Byte-level updater for the pass' root constants, uploaded before the frame's batches run.
pub struct ConstantsUpdater<'a> {
    data: &'a mut Vec<u8>,
}

impl<'a> ConstantsUpdater<'a> {
    pub(crate) fn new(data: &'a mut Vec<u8>) -> Self {
        ConstantsUpdater { data }
    }

    ///Replaces the pass constants with `bytes`.
    pub fn update(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

///Everything a pass body gets while recording: the command list to record into, resource
/// lookups, its constants and the current frame number.
pub struct RenderContext<'a, B: GraphicsBackend> {
    pub cmd: &'a mut B::CommandList,
    pub resources: ResourceProvider<'a>,
    pub constants: ConstantsUpdater<'a>,
    pub frame_number: u64,
    pipeline_states: &'a PipelineStateCache,
}

impl<'a, B: GraphicsBackend> RenderContext<'a, B> {
    pub(crate) fn new(
        cmd: &'a mut B::CommandList,
        resources: ResourceProvider<'a>,
        constants: ConstantsUpdater<'a>,
        frame_number: u64,
        pipeline_states: &'a PipelineStateCache,
    ) -> Self {
        RenderContext {
            cmd,
            resources,
            constants,
            frame_number,
            pipeline_states,
        }
    }

    ///Looks up a pipeline state declared during `setup_pipeline_states`.
    pub fn pipeline_state(&self, name: impl Into<Name>) -> Option<&PipelineStateDesc> {
        self.pipeline_states.get(name.into())
    }
}
