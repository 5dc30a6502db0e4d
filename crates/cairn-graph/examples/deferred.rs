//!Wires a small deferred pipeline through the graph: geometry buffer fill, an async-compute
//! ambient occlusion pass, lighting and a post process, then prints what each frame submits.

use cairn::backend::{
    CommandList, FenceSignal, FenceWait, GraphicsBackend, QueueIndex, Submission,
};
use cairn::barrier::BarrierCollection;
use cairn::format::{ColorFormat, DepthStencilFormat, Dimensions};
use cairn::BackendError;
use cairn_graph::pass::{PassMetadata, PassPurpose, PipelineStateCreator};
use cairn_graph::scheduler::{NewTextureProperties, ResourceScheduler, ScheduleError};
use cairn_graph::{Cairn, RenderContext, RenderPass, RenderSurface};

struct PrintList {
    name: String,
    barrier_count: usize,
}

impl CommandList for PrintList {
    fn record_barriers(&mut self, barriers: &BarrierCollection) {
        self.barrier_count += barriers.len();
    }
}

///Backend that executes nothing and narrates every submission instead.
#[derive(Default)]
struct PrintBackend {
    allocated_lists: u64,
    fences: u64,
}

impl GraphicsBackend for PrintBackend {
    type CommandList = PrintList;
    type Fence = u64;

    fn allocate_graphics_command_list(&mut self) -> Result<PrintList, BackendError> {
        self.allocated_lists += 1;
        Ok(PrintList {
            name: format!("graphics#{}", self.allocated_lists),
            barrier_count: 0,
        })
    }

    fn allocate_compute_command_list(&mut self) -> Result<PrintList, BackendError> {
        self.allocated_lists += 1;
        Ok(PrintList {
            name: format!("compute#{}", self.allocated_lists),
            barrier_count: 0,
        })
    }

    fn create_fence(&mut self) -> Result<u64, BackendError> {
        self.fences += 1;
        Ok(self.fences)
    }

    fn query_fence(&self, _fence: &u64) -> u64 {
        u64::MAX
    }

    fn is_transition_supported_on_queue(
        &self,
        queue: QueueIndex,
        before: cairn::state::ResourceState,
        _after: cairn::state::ResourceState,
    ) -> bool {
        //The compute queue cannot leave render-target or depth states.
        queue == 0
            || !before.intersects(
                cairn::state::ResourceState::RENDER_TARGET | cairn::state::ResourceState::DEPTH_WRITE,
            )
    }

    fn submit(
        &mut self,
        queue: QueueIndex,
        submission: Submission<PrintList, u64>,
    ) -> Result<(), BackendError> {
        let lists: Vec<String> = submission
            .command_lists
            .iter()
            .map(|list| format!("{}({} barriers)", list.name, list.barrier_count))
            .collect();
        let waits: Vec<String> = submission
            .wait_fences
            .iter()
            .map(|FenceWait { fence, value }| format!("fence{fence}>={value}"))
            .collect();
        let signal = submission
            .signal_fence
            .map(|FenceSignal { fence, value }| format!("fence{fence}:={value}"))
            .unwrap_or_else(|| "-".into());

        println!("queue {queue}: [{}] waits {waits:?} signal {signal}", lists.join(", "));
        Ok(())
    }
}

struct GBufferPass;

impl RenderPass<PrintBackend> for GBufferPass {
    fn metadata(&self) -> PassMetadata {
        PassMetadata::new("GBuffer", PassPurpose::Default)
    }

    fn setup_pipeline_states(&mut self, creator: &mut PipelineStateCreator<'_>) {
        creator.create_graphics_state("GBufferState", "gbuffer_vs", Some("gbuffer_ps".into()));
    }

    fn schedule_resources(
        &mut self,
        scheduler: &mut ResourceScheduler<'_>,
    ) -> Result<(), ScheduleError> {
        scheduler.new_render_target("Albedo", None)?;
        scheduler.new_render_target(
            "Normals",
            Some(NewTextureProperties {
                shader_visible_format: Some(ColorFormat::Rgba16Float),
                ..NewTextureProperties::default()
            }),
        )?;
        scheduler.new_depth_stencil("Depth", None)
    }

    fn render(&mut self, context: &mut RenderContext<'_, PrintBackend>) {
        assert!(context.pipeline_state("GBufferState").is_some());
    }
}

struct AmbientOcclusionPass;

impl RenderPass<PrintBackend> for AmbientOcclusionPass {
    fn metadata(&self) -> PassMetadata {
        PassMetadata::new("AmbientOcclusion", PassPurpose::AsyncCompute)
    }

    fn schedule_resources(
        &mut self,
        scheduler: &mut ResourceScheduler<'_>,
    ) -> Result<(), ScheduleError> {
        scheduler.execute_on_queue(1);
        scheduler.read_texture("Normals", &[0], None)?;
        scheduler.new_texture("Occlusion", None)
    }
}

struct LightingPass;

impl RenderPass<PrintBackend> for LightingPass {
    fn metadata(&self) -> PassMetadata {
        PassMetadata::new("Lighting", PassPurpose::Default)
    }

    fn schedule_resources(
        &mut self,
        scheduler: &mut ResourceScheduler<'_>,
    ) -> Result<(), ScheduleError> {
        scheduler.read_texture("Albedo", &[0], None)?;
        scheduler.read_texture("Depth", &[0], None)?;
        scheduler.read_texture("Occlusion", &[0], None)?;
        scheduler.new_render_target("Lit", None)
    }

    fn render(&mut self, context: &mut RenderContext<'_, PrintBackend>) {
        context
            .constants
            .update(&context.frame_number.to_le_bytes());
    }
}

struct PostProcessPass;

impl RenderPass<PrintBackend> for PostProcessPass {
    fn metadata(&self) -> PassMetadata {
        PassMetadata::new("PostProcess", PassPurpose::Default)
    }

    fn schedule_resources(
        &mut self,
        scheduler: &mut ResourceScheduler<'_>,
    ) -> Result<(), ScheduleError> {
        scheduler.read_texture("Lit", &[0], None)?;
        scheduler.new_render_target("Output", None)
    }
}

fn main() {
    let surface = RenderSurface {
        color_format: ColorFormat::Rgba8Unorm,
        depth_stencil_format: DepthStencilFormat::Depth32Float,
        dimensions: Dimensions::new_2d(1920, 1080),
    };

    let mut engine = Cairn::new(PrintBackend::default(), surface);
    engine.add_pass(Box::new(GBufferPass)).unwrap();
    engine.add_pass(Box::new(AmbientOcclusionPass)).unwrap();
    engine.add_pass(Box::new(LightingPass)).unwrap();
    engine.add_pass(Box::new(PostProcessPass)).unwrap();

    for frame in 0..2 {
        println!("--- frame {frame} ---");
        engine.render_frame().unwrap();
    }
}
