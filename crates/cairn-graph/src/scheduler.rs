use cairn::backend::QueueIndex;
use cairn::format::{
    BufferProperties, ClearValue, ColorFormat, DepthStencilFormat, Dimensions, FormatVariant,
    HeapKind, ResourceFormat, ResourceKind, TextureKind, TypelessFormat,
};
use cairn::state::{AccessFlags, ResourceState};
use cairn::Name;
use thiserror::Error;

use crate::engine::RenderSurface;
use crate::graph::{GraphError, NodeIndex, PassGraph};
use crate::resources::{ResourceStore, SchedulingInfo, SubresourceInfo};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Pass {pass} schedules resource {resource} more than once")]
    ResourceScheduledTwice { pass: Name, resource: Name },

    #[error("Resource {resource} is typeless, pass {pass} must supply a concrete shader visible format")]
    TypelessFormatMissing { pass: Name, resource: Name },

    #[error("Pass {pass} supplies a concrete format for non-typeless resource {resource}")]
    FormatRedefinition { pass: Name, resource: Name },

    #[error("Pass {pass} schedules {resource} as an incompatible resource kind")]
    KindMismatch { pass: Name, resource: Name },

    #[error("Resource {0} was never declared")]
    UnknownResource(Name),

    #[error("Pass {pass} declares resource {resource} with zero subresources")]
    ZeroSubresources { pass: Name, resource: Name },
}

///Read intent for [ResourceScheduler::read_buffer].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BufferReadKind {
    Constant,
    ShaderResource,
}

///Properties of a texture created through the scheduler. Unset fields fall back to the default
/// render surface description.
#[derive(Clone, Default, Debug)]
pub struct NewTextureProperties {
    pub kind: Option<TextureKind>,
    pub dimensions: Option<Dimensions>,
    pub shader_visible_format: Option<ColorFormat>,
    ///Creating a typeless texture forces every later use to pick a concrete format.
    pub typeless_format: Option<TypelessFormat>,
    pub clear_value: Option<ClearValue>,
    pub mip_count: Option<u32>,
    ///Keeps the resource readable in later frames; disables memory aliasing for it.
    pub cross_frame_read: bool,
}

#[derive(Clone, Default, Debug)]
pub struct NewDepthStencilProperties {
    pub format: Option<DepthStencilFormat>,
    pub dimensions: Option<Dimensions>,
    pub mip_count: Option<u32>,
    pub cross_frame_read: bool,
}

#[derive(Clone, Debug)]
pub struct NewBufferProperties {
    pub size: u64,
    pub stride: u64,
    pub cross_frame_read: bool,
}

///One scheduling mutation applied to a resource's [SchedulingInfo]. Keeping these as plain data
/// makes the whole set of mutations the front-end can perform enumerable and testable.
#[derive(Clone, Debug)]
pub enum ScheduleAction {
    NewRenderTarget {
        pass: Name,
        can_be_aliased: bool,
        shader_visible_format: Option<ColorFormat>,
    },
    NewDepthStencil {
        pass: Name,
        can_be_aliased: bool,
    },
    NewTexture {
        pass: Name,
        can_be_aliased: bool,
        shader_visible_format: Option<ColorFormat>,
    },
    NewBuffer {
        pass: Name,
        can_be_aliased: bool,
    },
    UseRenderTarget {
        pass: Name,
        mips: Vec<u32>,
        concrete_format: Option<ColorFormat>,
    },
    UseDepthStencil {
        pass: Name,
    },
    ReadTexture {
        pass: Name,
        mips: Vec<u32>,
        concrete_format: Option<ColorFormat>,
    },
    WriteTexture {
        pass: Name,
        mips: Vec<u32>,
        concrete_format: Option<ColorFormat>,
    },
    ReadBuffer {
        pass: Name,
        kind: BufferReadKind,
    },
    WriteBuffer {
        pass: Name,
    },
}

impl ScheduleAction {
    pub(crate) fn apply(&self, info: &mut SchedulingInfo) -> Result<(), ScheduleError> {
        let resource = info.resource_name();
        match self {
            ScheduleAction::NewRenderTarget {
                pass,
                can_be_aliased,
                shader_visible_format,
            } => {
                info.can_be_aliased = *can_be_aliased;
                let shader_visible_format = *shader_visible_format;
                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state: ResourceState::RENDER_TARGET,
                    shader_visible_format,
                    access_flags: AccessFlags::TEXTURE_RT,
                });
                Ok(())
            }
            ScheduleAction::NewDepthStencil {
                pass,
                can_be_aliased,
            } => {
                info.can_be_aliased = *can_be_aliased;
                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state: ResourceState::DEPTH_WRITE,
                    shader_visible_format: None,
                    access_flags: AccessFlags::TEXTURE_DS,
                });
                Ok(())
            }
            ScheduleAction::NewTexture {
                pass,
                can_be_aliased,
                shader_visible_format,
            } => {
                info.can_be_aliased = *can_be_aliased;
                let shader_visible_format = *shader_visible_format;
                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state: ResourceState::UNORDERED_ACCESS,
                    shader_visible_format,
                    access_flags: AccessFlags::TEXTURE_UA,
                });
                Ok(())
            }
            ScheduleAction::NewBuffer {
                pass,
                can_be_aliased,
            } => {
                info.can_be_aliased = *can_be_aliased;
                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state: ResourceState::UNORDERED_ACCESS,
                    shader_visible_format: None,
                    access_flags: AccessFlags::BUFFER_UA,
                });
                Ok(())
            }
            ScheduleAction::UseRenderTarget {
                pass,
                mips,
                concrete_format,
            } => {
                let is_typeless = info.format().is_typeless();
                if concrete_format.is_none() && is_typeless {
                    return Err(ScheduleError::TypelessFormatMissing {
                        pass: *pass,
                        resource,
                    });
                }
                if concrete_format.is_some() && !is_typeless {
                    return Err(ScheduleError::FormatRedefinition {
                        pass: *pass,
                        resource,
                    });
                }

                let shader_visible_format = is_typeless.then(|| concrete_format.unwrap());
                let pass_info = info.allocate_info_for_pass(*pass);
                for mip in mips {
                    pass_info.subresource_infos[*mip as usize] = Some(SubresourceInfo {
                        requested_state: ResourceState::RENDER_TARGET,
                        shader_visible_format,
                        access_flags: AccessFlags::TEXTURE_RT,
                    });
                }
                Ok(())
            }
            ScheduleAction::UseDepthStencil { pass } => {
                if !info.format().is_depth_stencil() {
                    return Err(ScheduleError::KindMismatch {
                        pass: *pass,
                        resource,
                    });
                }

                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state: ResourceState::DEPTH_WRITE,
                    shader_visible_format: None,
                    access_flags: AccessFlags::TEXTURE_DS,
                });
                Ok(())
            }
            ScheduleAction::ReadTexture {
                pass,
                mips,
                concrete_format,
            } => {
                let is_typeless = info.format().is_typeless();
                if concrete_format.is_none() && is_typeless {
                    return Err(ScheduleError::TypelessFormatMissing {
                        pass: *pass,
                        resource,
                    });
                }

                let mut requested_state = ResourceState::ANY_SHADER_ACCESS;
                if info.format().is_depth_stencil() {
                    requested_state |= ResourceState::DEPTH_READ;
                }

                let shader_visible_format = is_typeless.then(|| concrete_format.unwrap());
                let pass_info = info.allocate_info_for_pass(*pass);
                for mip in mips {
                    pass_info.subresource_infos[*mip as usize] = Some(SubresourceInfo {
                        requested_state,
                        shader_visible_format,
                        access_flags: AccessFlags::TEXTURE_SR,
                    });
                }
                Ok(())
            }
            ScheduleAction::WriteTexture {
                pass,
                mips,
                concrete_format,
            } => {
                let is_typeless = info.format().is_typeless();
                if concrete_format.is_none() && is_typeless {
                    return Err(ScheduleError::TypelessFormatMissing {
                        pass: *pass,
                        resource,
                    });
                }
                if concrete_format.is_some() && !is_typeless {
                    return Err(ScheduleError::FormatRedefinition {
                        pass: *pass,
                        resource,
                    });
                }

                let shader_visible_format = is_typeless.then(|| concrete_format.unwrap());
                let pass_info = info.allocate_info_for_pass(*pass);
                for mip in mips {
                    pass_info.subresource_infos[*mip as usize] = Some(SubresourceInfo {
                        requested_state: ResourceState::UNORDERED_ACCESS,
                        shader_visible_format,
                        access_flags: AccessFlags::TEXTURE_UA,
                    });
                }
                Ok(())
            }
            ScheduleAction::ReadBuffer { pass, kind } => {
                let (requested_state, access_flags) = match kind {
                    BufferReadKind::Constant => (
                        ResourceState::VERTEX_AND_CONSTANT_BUFFER,
                        AccessFlags::BUFFER_CB,
                    ),
                    BufferReadKind::ShaderResource => {
                        (ResourceState::ANY_SHADER_ACCESS, AccessFlags::BUFFER_SR)
                    }
                };

                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state,
                    shader_visible_format: None,
                    access_flags,
                });
                Ok(())
            }
            ScheduleAction::WriteBuffer { pass } => {
                let pass_info = info.allocate_info_for_pass(*pass);
                pass_info.subresource_infos[0] = Some(SubresourceInfo {
                    requested_state: ResourceState::UNORDERED_ACCESS,
                    shader_visible_format: None,
                    access_flags: AccessFlags::BUFFER_UA,
                });
                Ok(())
            }
        }
    }
}

///The declarative per-pass scheduling front-end. One instance is handed to each pass'
/// `schedule_resources` every frame; every call records the dependency on the pass' graph node
/// and queues the matching store mutation.
pub struct ResourceScheduler<'a> {
    graph: &'a mut PassGraph,
    store: &'a mut ResourceStore,
    default_surface: &'a RenderSurface,
    current_node: NodeIndex,
}

impl<'a> ResourceScheduler<'a> {
    pub(crate) fn new(
        graph: &'a mut PassGraph,
        store: &'a mut ResourceStore,
        default_surface: &'a RenderSurface,
        current_node: NodeIndex,
    ) -> Self {
        ResourceScheduler {
            graph,
            store,
            default_surface,
            current_node,
        }
    }

    fn pass_name(&self) -> Name {
        self.graph.node(self.current_node).metadata().name
    }

    fn ensure_single_schedule(&self, resource: Name) -> Result<(), ScheduleError> {
        if self
            .graph
            .node(self.current_node)
            .all_resources()
            .contains(&resource)
        {
            return Err(ScheduleError::ResourceScheduledTwice {
                pass: self.pass_name(),
                resource,
            });
        }
        Ok(())
    }

    ///Expands an empty mip list to the resource's full subresource range.
    fn expand_mips(&self, resource: Name, mips: &[u32]) -> Result<Vec<u32>, ScheduleError> {
        let count = self.store.subresource_count(resource)?;
        if mips.is_empty() {
            return Ok((0..count).collect());
        }
        debug_assert!(
            mips.iter().all(|mip| *mip < count),
            "subresource index out of range for {resource}"
        );
        Ok(mips.to_vec())
    }

    ///Creates a render target written by the current pass.
    pub fn new_render_target(
        &mut self,
        resource: impl Into<Name>,
        properties: Option<NewTextureProperties>,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let (format, clear_value, shader_visible_format, can_be_aliased) =
            self.fill_texture_defaults(resource, pass, properties)?;

        self.graph
            .add_write_dependency(self.current_node, resource, &[0])?;
        self.store.queue_texture_allocation(
            resource,
            format,
            Some(clear_value),
            ScheduleAction::NewRenderTarget {
                pass,
                can_be_aliased,
                shader_visible_format,
            },
        )
    }

    ///Creates a depth stencil target written by the current pass.
    pub fn new_depth_stencil(
        &mut self,
        resource: impl Into<Name>,
        properties: Option<NewDepthStencilProperties>,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let properties = properties.unwrap_or_default();
        if properties.mip_count == Some(0) {
            return Err(ScheduleError::ZeroSubresources { pass, resource });
        }

        let format = ResourceFormat {
            kind: ResourceKind::Texture(TextureKind::Texture2D),
            data_type: FormatVariant::DepthStencil(
                properties
                    .format
                    .unwrap_or(self.default_surface.depth_stencil_format),
            ),
            dimensions: properties
                .dimensions
                .unwrap_or(self.default_surface.dimensions),
            mip_count: properties.mip_count.unwrap_or(1),
        };

        self.graph
            .add_write_dependency(self.current_node, resource, &[0])?;
        self.store.queue_texture_allocation(
            resource,
            format,
            Some(ClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0,
            }),
            ScheduleAction::NewDepthStencil {
                pass,
                can_be_aliased: !properties.cross_frame_read,
            },
        )
    }

    ///Creates a writable (unordered access) texture written by the current pass.
    pub fn new_texture(
        &mut self,
        resource: impl Into<Name>,
        properties: Option<NewTextureProperties>,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let (format, clear_value, shader_visible_format, can_be_aliased) =
            self.fill_texture_defaults(resource, pass, properties)?;

        self.graph
            .add_write_dependency(self.current_node, resource, &[0])?;
        self.store.queue_texture_allocation(
            resource,
            format,
            Some(clear_value),
            ScheduleAction::NewTexture {
                pass,
                can_be_aliased,
                shader_visible_format,
            },
        )
    }

    ///Creates a storage buffer written by the current pass.
    pub fn new_buffer(
        &mut self,
        resource: impl Into<Name>,
        properties: NewBufferProperties,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let format = ResourceFormat {
            kind: ResourceKind::Buffer,
            data_type: FormatVariant::Typeless(TypelessFormat::R8),
            dimensions: Dimensions {
                width: properties.size,
                height: 1,
                depth: 1,
            },
            mip_count: 1,
        };

        self.graph
            .add_write_dependency(self.current_node, resource, &[0])?;
        self.store.queue_buffer_allocation(
            resource,
            format,
            BufferProperties {
                size: properties.size,
                stride: properties.stride,
            },
            HeapKind::Default,
            ScheduleAction::NewBuffer {
                pass,
                can_be_aliased: !properties.cross_frame_read,
            },
        )
    }

    ///Write dependency on an existing render target.
    pub fn use_render_target(
        &mut self,
        resource: impl Into<Name>,
        mips: &[u32],
        concrete_format: Option<ColorFormat>,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let mips = self.expand_mips(resource, mips)?;
        self.graph
            .add_write_dependency(self.current_node, resource, &mips)?;
        self.store.queue_resource_usage(
            resource,
            ScheduleAction::UseRenderTarget {
                pass,
                mips,
                concrete_format,
            },
        )
    }

    ///Write dependency on an existing depth stencil target.
    pub fn use_depth_stencil(&mut self, resource: impl Into<Name>) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        self.graph
            .add_write_dependency(self.current_node, resource, &[0])?;
        self.store
            .queue_resource_usage(resource, ScheduleAction::UseDepthStencil { pass })
    }

    ///Read dependency on a texture. Reading a depth stencil additionally requests the depth
    /// read state.
    pub fn read_texture(
        &mut self,
        resource: impl Into<Name>,
        mips: &[u32],
        concrete_format: Option<ColorFormat>,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let mips = self.expand_mips(resource, mips)?;
        self.graph
            .add_read_dependency(self.current_node, resource, &mips);
        self.store.queue_resource_usage(
            resource,
            ScheduleAction::ReadTexture {
                pass,
                mips,
                concrete_format,
            },
        )
    }

    ///Unordered-access write dependency on a texture.
    pub fn write_texture(
        &mut self,
        resource: impl Into<Name>,
        mips: &[u32],
        concrete_format: Option<ColorFormat>,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        let mips = self.expand_mips(resource, mips)?;
        self.graph
            .add_write_dependency(self.current_node, resource, &mips)?;
        self.store.queue_resource_usage(
            resource,
            ScheduleAction::WriteTexture {
                pass,
                mips,
                concrete_format,
            },
        )
    }

    pub fn read_buffer(
        &mut self,
        resource: impl Into<Name>,
        kind: BufferReadKind,
    ) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        self.graph
            .add_read_dependency(self.current_node, resource, &[0]);
        self.store
            .queue_resource_usage(resource, ScheduleAction::ReadBuffer { pass, kind })
    }

    pub fn write_buffer(&mut self, resource: impl Into<Name>) -> Result<(), ScheduleError> {
        let resource = resource.into();
        let pass = self.pass_name();
        self.ensure_single_schedule(resource)?;

        self.graph
            .add_write_dependency(self.current_node, resource, &[0])?;
        self.store
            .queue_resource_usage(resource, ScheduleAction::WriteBuffer { pass })
    }

    ///Moves the current pass to the given queue for this frame.
    pub fn execute_on_queue(&mut self, queue: QueueIndex) {
        self.graph.set_queue_index(self.current_node, queue);
    }

    ///Marks the current pass as a ray tracing user, synchronizing it with acceleration
    /// structure builds.
    pub fn use_ray_tracing(&mut self) {
        self.graph.set_uses_ray_tracing(self.current_node);
    }

    fn fill_texture_defaults(
        &self,
        resource: Name,
        pass: Name,
        properties: Option<NewTextureProperties>,
    ) -> Result<(ResourceFormat, ClearValue, Option<ColorFormat>, bool), ScheduleError> {
        let properties = properties.unwrap_or_default();
        if properties.mip_count == Some(0) {
            return Err(ScheduleError::ZeroSubresources { pass, resource });
        }

        let shader_visible = properties
            .shader_visible_format
            .unwrap_or(self.default_surface.color_format);
        let data_type = match properties.typeless_format {
            Some(typeless) => FormatVariant::Typeless(typeless),
            None => FormatVariant::Color(shader_visible),
        };

        let format = ResourceFormat {
            kind: ResourceKind::Texture(properties.kind.unwrap_or(TextureKind::Texture2D)),
            data_type,
            dimensions: properties
                .dimensions
                .unwrap_or(self.default_surface.dimensions),
            mip_count: properties.mip_count.unwrap_or(1),
        };

        let clear_value = properties
            .clear_value
            .unwrap_or(ClearValue::Color([0.0, 0.0, 0.0, 1.0]));

        //The stored shader visible format only matters for typeless resources.
        let shader_visible_format = properties.typeless_format.map(|_| shader_visible);

        Ok((
            format,
            clear_value,
            shader_visible_format,
            !properties.cross_frame_read,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RenderSurface;
    use crate::pass::{PassMetadata, PassPurpose};

    struct Fixture {
        graph: PassGraph,
        store: ResourceStore,
        surface: RenderSurface,
    }

    impl Fixture {
        fn new(passes: &[&str]) -> Self {
            let mut graph = PassGraph::new();
            for pass in passes {
                graph
                    .add_pass(PassMetadata::new(*pass, PassPurpose::Default))
                    .unwrap();
            }
            Fixture {
                graph,
                store: ResourceStore::new(),
                surface: RenderSurface {
                    color_format: ColorFormat::Rgba16Float,
                    depth_stencil_format: DepthStencilFormat::Depth32Float,
                    dimensions: Dimensions::new_2d(1920, 1080),
                },
            }
        }

        fn scheduler(&mut self, node: NodeIndex) -> ResourceScheduler<'_> {
            ResourceScheduler::new(&mut self.graph, &mut self.store, &self.surface, node)
        }
    }

    #[test]
    fn typeless_read_without_concrete_format_fails() {
        let mut fixture = Fixture::new(&["Producer", "Consumer"]);

        fixture
            .scheduler(0)
            .new_texture(
                "X",
                Some(NewTextureProperties {
                    typeless_format: Some(TypelessFormat::Rgba8),
                    ..NewTextureProperties::default()
                }),
            )
            .unwrap();

        let err = fixture
            .scheduler(1)
            .read_texture("X", &[], None)
            .unwrap_err();
        match err {
            ScheduleError::TypelessFormatMissing { pass, resource } => {
                assert_eq!(pass, Name::new("Consumer"));
                assert_eq!(resource, Name::new("X"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        //With a concrete format the same read is fine.
        fixture
            .scheduler(1)
            .read_texture("X", &[], Some(ColorFormat::Rgba8Unorm))
            .unwrap();
    }

    #[test]
    fn concrete_format_on_typed_resource_fails() {
        let mut fixture = Fixture::new(&["Producer", "Consumer"]);

        fixture.scheduler(0).new_render_target("RT", None).unwrap();
        let err = fixture
            .scheduler(1)
            .use_render_target("RT", &[0], Some(ColorFormat::Rgba8Unorm))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::FormatRedefinition { .. }));
    }

    #[test]
    fn scheduling_a_resource_twice_in_one_pass_fails() {
        let mut fixture = Fixture::new(&["Producer"]);

        let mut scheduler = fixture.scheduler(0);
        scheduler.new_render_target("RT", None).unwrap();
        let err = scheduler.read_texture("RT", &[], None).unwrap_err();
        assert!(matches!(err, ScheduleError::ResourceScheduledTwice { .. }));
    }

    #[test]
    fn empty_mip_list_expands_to_full_range() {
        let mut fixture = Fixture::new(&["Producer", "Consumer"]);

        fixture
            .scheduler(0)
            .new_texture(
                "Chain",
                Some(NewTextureProperties {
                    mip_count: Some(4),
                    ..NewTextureProperties::default()
                }),
            )
            .unwrap();
        fixture.scheduler(1).read_texture("Chain", &[], None).unwrap();

        let node = fixture.graph.node(1);
        assert_eq!(node.read_subresources().len(), 4);

        let info = &fixture.store.get(Name::new("Chain")).unwrap().scheduling_info;
        let pass_info = info.info_for_pass(Name::new("Consumer")).unwrap();
        assert!(pass_info.subresource_infos.iter().all(|sub| sub.is_some()));
    }

    #[test]
    fn depth_stencil_reads_request_depth_read_state() {
        let mut fixture = Fixture::new(&["Prepass", "Lighting"]);

        fixture.scheduler(0).new_depth_stencil("Depth", None).unwrap();
        fixture
            .scheduler(1)
            .read_texture("Depth", &[0], None)
            .unwrap();

        let info = &fixture.store.get(Name::new("Depth")).unwrap().scheduling_info;
        let sub = info
            .info_for_pass(Name::new("Lighting"))
            .unwrap()
            .subresource_infos[0]
            .unwrap();
        assert!(sub.requested_state.contains(ResourceState::DEPTH_READ));
        assert!(sub
            .requested_state
            .contains(ResourceState::ANY_SHADER_ACCESS));
    }

    #[test]
    fn use_depth_stencil_on_color_texture_fails() {
        let mut fixture = Fixture::new(&["Producer", "Consumer"]);

        fixture.scheduler(0).new_render_target("RT", None).unwrap();
        let err = fixture.scheduler(1).use_depth_stencil("RT").unwrap_err();
        assert!(matches!(err, ScheduleError::KindMismatch { .. }));
    }

    #[test]
    fn cross_frame_read_disables_aliasing() {
        let mut fixture = Fixture::new(&["Producer"]);

        fixture
            .scheduler(0)
            .new_texture(
                "History",
                Some(NewTextureProperties {
                    cross_frame_read: true,
                    ..NewTextureProperties::default()
                }),
            )
            .unwrap();

        let info = &fixture
            .store
            .get(Name::new("History"))
            .unwrap()
            .scheduling_info;
        assert!(!info.can_be_aliased);
    }

    #[test]
    fn queue_and_ray_tracing_markers() {
        let mut fixture = Fixture::new(&["Async"]);

        let mut scheduler = fixture.scheduler(0);
        scheduler.execute_on_queue(1);
        scheduler.use_ray_tracing();

        assert_eq!(fixture.graph.node(0).queue_index(), 1);
        assert!(fixture.graph.node(0).uses_ray_tracing());
    }

    #[test]
    fn buffers_schedule_reads_and_writes() {
        let mut fixture = Fixture::new(&["Producer", "Consumer"]);

        fixture
            .scheduler(0)
            .new_buffer(
                "Particles",
                NewBufferProperties {
                    size: 65536,
                    stride: 16,
                    cross_frame_read: false,
                },
            )
            .unwrap();
        fixture
            .scheduler(1)
            .read_buffer("Particles", BufferReadKind::ShaderResource)
            .unwrap();

        let info = &fixture
            .store
            .get(Name::new("Particles"))
            .unwrap()
            .scheduling_info;
        let producer = info.info_for_pass(Name::new("Producer")).unwrap();
        assert!(producer.subresource_infos[0]
            .unwrap()
            .access_flags
            .contains(AccessFlags::BUFFER_UA));
        let consumer = info.info_for_pass(Name::new("Consumer")).unwrap();
        assert_eq!(
            consumer.subresource_infos[0].unwrap().requested_state,
            ResourceState::ANY_SHADER_ACCESS
        );
    }
}
