//!Shared test harness: a mock backend recording every allocation, barrier and submission, plus
//! a small rig wiring graph, store and scheduler together the way the engine does.

use ahash::AHashMap;
use cairn::backend::{
    CommandList, FenceSignal, FenceWait, GraphicsBackend, QueueIndex, Submission,
};
use cairn::barrier::{Barrier, BarrierCollection};
use cairn::format::{ColorFormat, DepthStencilFormat, Dimensions};
use cairn::state::ResourceState;
use cairn::{BackendError, Name};

use crate::engine::RenderSurface;
use crate::graph::{NodeIndex, PassGraph};
use crate::pass::{PassMetadata, PassPurpose};
use crate::resources::ResourceStore;
use crate::scheduler::{ResourceScheduler, ScheduleError};
use crate::CairnError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ListKind {
    Graphics,
    Compute,
}

pub(crate) struct MockList {
    pub id: u64,
    pub kind: ListKind,
    pub barriers: Vec<Barrier>,
}

impl CommandList for MockList {
    fn record_barriers(&mut self, barriers: &BarrierCollection) {
        self.barriers.extend(barriers.iter().copied());
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct MockFence(pub u64);

pub(crate) struct MockSubmission {
    pub queue: QueueIndex,
    pub lists: Vec<MockList>,
    pub waits: Vec<FenceWait<MockFence>>,
    pub signal: Option<FenceSignal<MockFence>>,
}

#[derive(Default)]
pub(crate) struct MockBackend {
    ///(queue, state mask): a transition whose before or after state intersects the mask is
    /// unsupported on that queue.
    pub unsupported_transitions: Vec<(QueueIndex, ResourceState)>,
    pub submissions: Vec<MockSubmission>,
    pub(crate) next_list: u64,
    pub(crate) next_fence: u64,
}

impl MockBackend {
    pub fn reject_on_queue(queue: QueueIndex, states: ResourceState) -> Self {
        MockBackend {
            unsupported_transitions: vec![(queue, states)],
            ..MockBackend::default()
        }
    }

    pub fn signals(&self) -> Vec<&MockSubmission> {
        self.submissions
            .iter()
            .filter(|submission| submission.signal.is_some())
            .collect()
    }

    pub fn total_waits(&self) -> usize {
        self.submissions
            .iter()
            .map(|submission| submission.waits.len())
            .sum()
    }
}

impl GraphicsBackend for MockBackend {
    type CommandList = MockList;
    type Fence = MockFence;

    fn allocate_graphics_command_list(&mut self) -> Result<MockList, BackendError> {
        self.next_list += 1;
        Ok(MockList {
            id: self.next_list,
            kind: ListKind::Graphics,
            barriers: Vec::new(),
        })
    }

    fn allocate_compute_command_list(&mut self) -> Result<MockList, BackendError> {
        self.next_list += 1;
        Ok(MockList {
            id: self.next_list,
            kind: ListKind::Compute,
            barriers: Vec::new(),
        })
    }

    fn create_fence(&mut self) -> Result<MockFence, BackendError> {
        self.next_fence += 1;
        Ok(MockFence(self.next_fence))
    }

    fn query_fence(&self, _fence: &MockFence) -> u64 {
        u64::MAX
    }

    fn is_transition_supported_on_queue(
        &self,
        queue: QueueIndex,
        before: ResourceState,
        after: ResourceState,
    ) -> bool {
        !self
            .unsupported_transitions
            .iter()
            .any(|(q, mask)| *q == queue && (before | after).intersects(*mask))
    }

    fn submit(
        &mut self,
        queue: QueueIndex,
        submission: Submission<MockList, MockFence>,
    ) -> Result<(), BackendError> {
        self.submissions.push(MockSubmission {
            queue,
            lists: submission.command_lists,
            waits: submission.wait_fences.into_vec(),
            signal: submission.signal_fence,
        });
        Ok(())
    }
}

pub(crate) fn test_surface() -> RenderSurface {
    RenderSurface {
        color_format: ColorFormat::Rgba16Float,
        depth_stencil_format: DepthStencilFormat::Depth32Float,
        dimensions: Dimensions::new_2d(1280, 720),
    }
}

///Graph + store + defaults wired like the engine does per frame, without a backend.
pub(crate) struct Rig {
    pub graph: PassGraph,
    pub store: ResourceStore,
    pub surface: RenderSurface,
}

impl Rig {
    pub fn new() -> Self {
        Rig {
            graph: PassGraph::new(),
            store: ResourceStore::new(),
            surface: test_surface(),
        }
    }

    pub fn add_pass(&mut self, name: &str) -> NodeIndex {
        self.graph
            .add_pass(PassMetadata::new(name, PassPurpose::Default))
            .unwrap()
    }

    pub fn schedule(
        &mut self,
        node: NodeIndex,
        declare: impl FnOnce(&mut ResourceScheduler<'_>) -> Result<(), ScheduleError>,
    ) -> Result<(), ScheduleError> {
        let mut scheduler =
            ResourceScheduler::new(&mut self.graph, &mut self.store, &self.surface, node);
        declare(&mut scheduler)
    }

    ///Builds the graph and finalizes scheduling, mirroring the engine's frame preparation.
    pub fn build(&mut self) -> Result<(), CairnError> {
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
        Ok(())
    }
}
