use smallvec::SmallVec;

use crate::name::{Name, SubresourceId};
use crate::state::ResourceState;

///Which half of a split barrier a transition represents. `Full` transitions block until done,
/// the `Begin`/`End` pair lets the GPU overlap the transition with work recorded in between.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BarrierPhase {
    Full,
    Begin,
    End,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct TransitionBarrier {
    pub subresource: SubresourceId,
    pub before: ResourceState,
    pub after: ResourceState,
    pub phase: BarrierPhase,
}

///Marks the point where the memory of `before` is reused by `after`. `before` is `None` when the
/// heap region was not previously occupied.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct AliasingBarrier {
    pub before: Option<Name>,
    pub after: Name,
}

///Flushes pending unordered-access writes to `resource` before the next dispatch reads them.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct UavBarrier {
    pub resource: Name,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Barrier {
    Transition(TransitionBarrier),
    Aliasing(AliasingBarrier),
    Uav(UavBarrier),
}

///Collection of barriers recorded as one batch into a command list. Per-pass barrier counts
/// are small, so the collection stays inline until it grows past a handful of entries.
#[derive(Clone, Default, Debug)]
pub struct BarrierCollection {
    barriers: SmallVec<[Barrier; 4]>,
}

impl BarrierCollection {
    pub fn add_transition(&mut self, barrier: TransitionBarrier) {
        self.barriers.push(Barrier::Transition(barrier));
    }

    pub fn add_aliasing(&mut self, barrier: AliasingBarrier) {
        self.barriers.push(Barrier::Aliasing(barrier));
    }

    pub fn add_uav(&mut self, barrier: UavBarrier) {
        self.barriers.push(Barrier::Uav(barrier));
    }

    pub fn has_barriers(&self) -> bool {
        !self.barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Barrier> {
        self.barriers.iter()
    }
}

impl Extend<Barrier> for BarrierCollection {
    fn extend<T: IntoIterator<Item = Barrier>>(&mut self, iter: T) {
        self.barriers.extend(iter)
    }
}
