use std::fmt::Debug;
use std::hash::Hash;

use smallvec::SmallVec;

use crate::barrier::BarrierCollection;
use crate::error::BackendError;
use crate::state::ResourceState;

///Index of a device queue. Queue 0 is the graphics queue and the most capable one, higher
/// indices are compute/copy queues with shrinking capability sets.
pub type QueueIndex = u32;

///A command list handle the scheduler records barriers into. Pass bodies receive the same list
/// to record their actual work.
pub trait CommandList {
    fn record_barriers(&mut self, barriers: &BarrierCollection);
}

///A wait on `fence` reaching `value` before a submission may start.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FenceWait<F> {
    pub fence: F,
    pub value: u64,
}

///Signals `fence` to `value` once a submission finished.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FenceSignal<F> {
    pub fence: F,
    pub value: u64,
}

///One queue submission: command lists executing in order, gated by fence waits, optionally
/// signaling a fence at the end.
pub struct Submission<C, F> {
    pub command_lists: Vec<C>,
    pub wait_fences: SmallVec<[FenceWait<F>; 4]>,
    pub signal_fence: Option<FenceSignal<F>>,
}

///Capability set the scheduler needs from a concrete GPU layer. The scheduler never sees
/// devices, heaps or descriptors, only these operations.
pub trait GraphicsBackend {
    type CommandList: CommandList;
    type Fence: Clone + Eq + Hash + Debug;

    fn allocate_graphics_command_list(&mut self) -> Result<Self::CommandList, BackendError>;
    fn allocate_compute_command_list(&mut self) -> Result<Self::CommandList, BackendError>;

    fn create_fence(&mut self) -> Result<Self::Fence, BackendError>;

    ///Last value the fence was observed to have completed.
    fn query_fence(&self, fence: &Self::Fence) -> u64;

    ///Whether `queue` can legally record a state transition from `before` to `after`. Compute
    /// queues typically reject render-target and depth transitions.
    fn is_transition_supported_on_queue(
        &self,
        queue: QueueIndex,
        before: ResourceState,
        after: ResourceState,
    ) -> bool;

    fn submit(
        &mut self,
        queue: QueueIndex,
        submission: Submission<Self::CommandList, Self::Fence>,
    ) -> Result<(), BackendError>;
}
