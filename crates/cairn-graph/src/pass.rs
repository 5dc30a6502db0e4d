use cairn::backend::GraphicsBackend;
use cairn::Name;
use fxhash::FxHashMap;

use crate::context::RenderContext;
use crate::scheduler::{ResourceScheduler, ScheduleError};

///Broad classification of a pass, used by tooling and queue heuristics. Extend as needed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PassPurpose {
    Default,
    AsyncCompute,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PassMetadata {
    pub name: Name,
    pub purpose: PassPurpose,
}

impl PassMetadata {
    pub fn new(name: impl Into<Name>, purpose: PassPurpose) -> Self {
        PassMetadata {
            name: name.into(),
            purpose,
        }
    }
}

///Description of a pipeline state a pass wants available at render time. Shader compilation is
/// the backend layer's business, the scheduler only tracks the named descriptions.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PipelineStateDesc {
    Graphics {
        vertex_shader: String,
        pixel_shader: Option<String>,
    },
    Compute {
        shader: String,
    },
    RayTracing {
        ray_generation_shader: String,
    },
}

#[derive(Default)]
pub struct PipelineStateCache {
    states: FxHashMap<Name, PipelineStateDesc>,
}

impl PipelineStateCache {
    pub fn get(&self, name: Name) -> Option<&PipelineStateDesc> {
        self.states.get(&name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

///Handed to each pass once at registration so it can declare the pipeline states it applies by
/// name during rendering.
pub struct PipelineStateCreator<'a> {
    pub(crate) cache: &'a mut PipelineStateCache,
}

impl<'a> PipelineStateCreator<'a> {
    pub fn create_graphics_state(
        &mut self,
        name: impl Into<Name>,
        vertex_shader: impl Into<String>,
        pixel_shader: Option<String>,
    ) {
        self.cache.states.insert(
            name.into(),
            PipelineStateDesc::Graphics {
                vertex_shader: vertex_shader.into(),
                pixel_shader,
            },
        );
    }

    pub fn create_compute_state(&mut self, name: impl Into<Name>, shader: impl Into<String>) {
        self.cache.states.insert(
            name.into(),
            PipelineStateDesc::Compute {
                shader: shader.into(),
            },
        );
    }

    pub fn create_ray_tracing_state(
        &mut self,
        name: impl Into<Name>,
        ray_generation_shader: impl Into<String>,
    ) {
        self.cache.states.insert(
            name.into(),
            PipelineStateDesc::RayTracing {
                ray_generation_shader: ray_generation_shader.into(),
            },
        );
    }
}

///A render pass. Registered once, then driven every frame: `schedule_resources` declares the
/// frame's reads and writes before the graph is built, `render` records the pass body into the
/// command list the batch builder hands it.
pub trait RenderPass<B: GraphicsBackend> {
    fn metadata(&self) -> PassMetadata;

    ///Called once when the pass is added. Declare pipeline states here.
    fn setup_pipeline_states(&mut self, _creator: &mut PipelineStateCreator<'_>) {}

    ///Called once per frame before the graph is built. Must declare every resource the pass
    /// touches.
    fn schedule_resources(&mut self, scheduler: &mut ResourceScheduler<'_>)
        -> Result<(), ScheduleError>;

    ///Called during batch recording.
    fn render(&mut self, _context: &mut RenderContext<'_, B>) {}
}
