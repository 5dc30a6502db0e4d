use ahash::AHashMap;
use cairn::backend::GraphicsBackend;
use cairn::format::{ColorFormat, DepthStencilFormat, Dimensions};
use cairn::Name;

use crate::batch::BatchBuilder;
use crate::context::{ConstantsUpdater, RenderContext, ResourceProvider};
use crate::executor::Executor;
use crate::graph::{NodeIndex, PassGraph};
use crate::pass::{PipelineStateCache, PipelineStateCreator, RenderPass};
use crate::planner::TransitionPlanner;
use crate::resources::ResourceStore;
use crate::scheduler::ResourceScheduler;
use crate::CairnError;

///Defaults a pass inherits when it creates a texture without explicit properties.
#[derive(Clone, Copy, Debug)]
pub struct RenderSurface {
    pub color_format: ColorFormat,
    pub depth_stencil_format: DepthStencilFormat,
    pub dimensions: Dimensions,
}

///Main interface. Owns the backend, the resource store and the pass graph, and drives the
/// schedule -> build -> plan -> batch -> execute pipeline once per frame.
pub struct Cairn<B: GraphicsBackend> {
    backend: B,
    graph: PassGraph,
    store: ResourceStore,
    planner: TransitionPlanner,
    passes: Vec<Box<dyn RenderPass<B>>>,
    pipeline_states: PipelineStateCache,
    pass_constants: Vec<Vec<u8>>,
    default_surface: RenderSurface,
    frame_number: u64,
}

impl<B: GraphicsBackend> Cairn<B> {
    pub fn new(backend: B, default_surface: RenderSurface) -> Self {
        Cairn {
            backend,
            graph: PassGraph::new(),
            store: ResourceStore::new(),
            planner: TransitionPlanner::new(),
            passes: Vec::new(),
            pipeline_states: PipelineStateCache::default(),
            pass_constants: Vec::new(),
            default_surface,
            frame_number: 0,
        }
    }

    ///Registers a pass. Order of registration is the order passes are scheduled in each frame.
    pub fn add_pass(&mut self, mut pass: Box<dyn RenderPass<B>>) -> Result<(), CairnError> {
        let node = self.graph.add_pass(pass.metadata())?;
        debug_assert_eq!(node, self.passes.len());

        pass.setup_pipeline_states(&mut PipelineStateCreator {
            cache: &mut self.pipeline_states,
        });

        self.passes.push(pass);
        self.pass_constants.push(Vec::new());
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn graph(&self) -> &PassGraph {
        &self.graph
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ResourceStore {
        &mut self.store
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    ///Builds and executes one frame from scratch: every pass re-declares its resources, the
    /// graph is rebuilt, transitions are planned, batches recorded and submitted.
    pub fn render_frame(&mut self) -> Result<(), CairnError> {
        self.frame_number += 1;
        let frame_number = self.frame_number;

        self.graph.clear();
        self.store.begin_frame(frame_number);

        #[cfg(feature = "logging")]
        log::trace!("Scheduling frame {}", frame_number);

        for index in 0..self.passes.len() {
            let mut scheduler = ResourceScheduler::new(
                &mut self.graph,
                &mut self.store,
                &self.default_surface,
                index,
            );
            self.passes[index].schedule_resources(&mut scheduler)?;
        }

        self.graph.build()?;

        let first_users: AHashMap<Name, Name> = self
            .graph
            .resource_usage_timelines()
            .iter()
            .map(|(resource, timeline)| {
                let node = self.graph.node_at_global_index(timeline.0);
                (*resource, self.graph.node(node).metadata().name)
            })
            .collect();
        let timelines = self.graph.resource_usage_timelines().clone();
        self.store.finish_scheduling(&timelines, &first_users)?;
        self.store.allocate();

        self.planner.reset();
        let mut plans = Vec::with_capacity(self.graph.dependency_levels().len());
        for level in self.graph.dependency_levels() {
            plans.push(
                self.planner
                    .plan_level(&self.backend, &self.graph, &self.store, level)?,
            );
        }

        let Self {
            backend,
            graph,
            store,
            passes,
            pass_constants,
            pipeline_states,
            ..
        } = self;

        let mut builder = BatchBuilder::new(backend, graph);
        builder.pre_frame(graph.first_ray_tracing_node().is_some())?;

        let mut record = |node_index: NodeIndex, cmd: &mut B::CommandList| {
            let node = graph.node(node_index);
            let provider = ResourceProvider::new(store, node);
            let constants = ConstantsUpdater::new(&mut pass_constants[node_index]);
            let mut context =
                RenderContext::new(cmd, provider, constants, frame_number, pipeline_states);
            passes[node_index].render(&mut context);
            Ok(())
        };

        for (level, plan) in graph.dependency_levels().iter().zip(&plans) {
            builder.build_level(level, plan, &mut record)?;
        }

        let frame = builder.finish();
        Executor::execute(backend, frame)?;

        store.end_frame(frame_number);
        Ok(())
    }
}
