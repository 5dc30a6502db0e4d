use cairn::backend::{CommandList, FenceSignal, FenceWait, GraphicsBackend, QueueIndex};
use cairn::barrier::{BarrierCollection, BarrierPhase, TransitionBarrier};
use cairn::SubresourceId;
use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::graph::{DependencyLevel, NodeIndex, PassGraph};
use crate::planner::LevelPlan;
use crate::CairnError;

///The queue acceleration structure builds run on.
const RTAS_BUILD_QUEUE: QueueIndex = 1;

///One submission-to-be on a queue: command lists plus the fences gating and concluding them.
pub struct CommandListBatch<C, F> {
    pub queue: QueueIndex,
    pub command_lists: Vec<C>,
    pub fences_to_wait: SmallVec<[FenceWait<F>; 4]>,
    pub fence_to_signal: Option<FenceSignal<F>>,
}

///All batches of a frame, outer index = dependency level (preceded by the pre-frame batches).
pub struct FrameBatches<C, F> {
    pub levels: Vec<Vec<CommandListBatch<C, F>>>,
}

///Where a subresource's latest transition was recorded: which command list inside which batch of
/// which level, and on which queue. Begin halves of split barriers are appended there.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct ListRef {
    level: usize,
    batch: usize,
    list: usize,
    queue: QueueIndex,
    node: NodeIndex,
}

///Assembles per-queue command-list batches for each dependency level: a transitions list and a
/// work list per pass, an extra rerouted-transitions list on the competent queue when needed,
/// and the fence wiring between queues.
pub struct BatchBuilder<'a, B: GraphicsBackend> {
    backend: &'a mut B,
    graph: &'a PassGraph,

    levels: Vec<Vec<CommandListBatch<B::CommandList, B::Fence>>>,

    fences: FxHashMap<QueueIndex, (B::Fence, u64)>,
    ///For every node that signals: the wait consumers add to their batch.
    node_signals: FxHashMap<NodeIndex, FenceWait<B::Fence>>,

    prev_transitions: FxHashMap<SubresourceId, ListRef>,
    begin_barriers: FxHashMap<ListRef, BarrierCollection>,

    upload_wait: Option<FenceWait<B::Fence>>,
    queues_waiting_on_upload: FxHashSet<QueueIndex>,
    rtas_wait: Option<FenceWait<B::Fence>>,
}

impl<'a, B: GraphicsBackend> BatchBuilder<'a, B> {
    pub fn new(backend: &'a mut B, graph: &'a PassGraph) -> Self {
        BatchBuilder {
            backend,
            graph,
            levels: Vec::new(),
            fences: FxHashMap::default(),
            node_signals: FxHashMap::default(),
            prev_transitions: FxHashMap::default(),
            begin_barriers: FxHashMap::default(),
            upload_wait: None,
            queues_waiting_on_upload: FxHashSet::default(),
            rtas_wait: None,
        }
    }

    ///Records the pre-frame submissions: the uploads list on the graphics queue and, when ray
    /// tracing is used this frame, the acceleration structure builds list on the compute queue.
    pub fn pre_frame(&mut self, uses_ray_tracing: bool) -> Result<(), CairnError> {
        let mut batches = Vec::new();

        let upload_list = self.allocate_list(0)?;
        let signal = self.next_signal(0)?;
        self.upload_wait = Some(FenceWait {
            fence: signal.fence.clone(),
            value: signal.value,
        });
        batches.push(CommandListBatch {
            queue: 0,
            command_lists: vec![upload_list],
            fences_to_wait: SmallVec::new(),
            fence_to_signal: Some(signal),
        });

        if uses_ray_tracing {
            let rtas_list = self.allocate_list(RTAS_BUILD_QUEUE)?;
            let signal = self.next_signal(RTAS_BUILD_QUEUE)?;
            self.rtas_wait = Some(FenceWait {
                fence: signal.fence.clone(),
                value: signal.value,
            });
            batches.push(CommandListBatch {
                queue: RTAS_BUILD_QUEUE,
                command_lists: vec![rtas_list],
                fences_to_wait: SmallVec::new(),
                fence_to_signal: Some(signal),
            });
        }

        self.levels.push(batches);
        Ok(())
    }

    pub fn build_level<R>(
        &mut self,
        level: &DependencyLevel,
        plan: &LevelPlan,
        record: &mut R,
    ) -> Result<(), CairnError>
    where
        R: FnMut(NodeIndex, &mut B::CommandList) -> Result<(), CairnError>,
    {
        let level_index = self.levels.len();
        let mut batches: Vec<CommandListBatch<B::CommandList, B::Fence>> = Vec::new();

        let reroute_wait = if let Some(target) = plan.reroute_target {
            Some(self.build_reroute_batch(level, plan, target, level_index, &mut batches)?)
        } else {
            None
        };

        for queue in 0..self.graph.queue_count() {
            let nodes = level.nodes_for_queue(queue);
            if nodes.is_empty() {
                continue;
            }

            let mut batch = self.new_batch(queue);
            //Queues whose transitions ran on the competent queue wait for them; the competent
            // queue itself is ordered implicitly.
            if plan.rerouted_queues.contains(&queue) && plan.reroute_target != Some(queue) {
                if let Some(wait) = &reroute_wait {
                    push_wait(&mut batch.fences_to_wait, wait.clone());
                }
            }

            for &node_index in nodes {
                let mut waits: SmallVec<[FenceWait<B::Fence>; 4]> = SmallVec::new();
                for &dependency in self.graph.node(node_index).nodes_to_sync_with() {
                    if self.graph.node(dependency).queue_index() == queue {
                        continue;
                    }
                    if let Some(wait) = self.node_signals.get(&dependency) {
                        push_wait(&mut waits, wait.clone());
                    } else {
                        debug_assert!(false, "cross-queue dependency without a signal");
                    }
                }
                if self.graph.first_ray_tracing_node() == Some(node_index) {
                    if let Some(wait) = &self.rtas_wait {
                        if queue != RTAS_BUILD_QUEUE {
                            push_wait(&mut waits, wait.clone());
                        }
                    }
                }

                //A wait can only happen at submission start; nodes that wait open a new batch
                // unless the current one is still empty.
                if !waits.is_empty() && !batch.command_lists.is_empty() {
                    batches.push(batch);
                    batch = self.new_batch(queue);
                }
                for wait in waits {
                    push_wait(&mut batch.fences_to_wait, wait);
                }

                //Transitions list for this pass. When the queue got rerouted the transitions
                // already live on the competent queue, only aliasing and UAV flushes stay local.
                let mut collection = BarrierCollection::default();
                for (owner, barrier) in &plan.aliasing {
                    if *owner == node_index {
                        collection.add_aliasing(*barrier);
                    }
                }
                if !plan.is_node_rerouted(self.graph, node_index) {
                    let list_ref = ListRef {
                        level: level_index,
                        batch: batches.len(),
                        list: batch.command_lists.len(),
                        queue,
                        node: node_index,
                    };
                    for transition in plan.transitions_for_node(node_index) {
                        self.add_transition(&mut collection, transition.subresource, |phase| {
                            TransitionBarrier {
                                subresource: transition.subresource,
                                before: transition.before,
                                after: transition.after,
                                phase,
                            }
                        });
                        self.prev_transitions.insert(transition.subresource, list_ref);
                    }
                }
                for (owner, barrier) in &plan.uav {
                    if *owner == node_index {
                        collection.add_uav(*barrier);
                    }
                }

                if collection.has_barriers() {
                    let mut transitions_list = self.allocate_list(queue)?;
                    transitions_list.record_barriers(&collection);
                    batch.command_lists.push(transitions_list);
                }

                let mut work_list = self.allocate_list(queue)?;
                record(node_index, &mut work_list)?;
                batch.command_lists.push(work_list);

                if self.graph.node(node_index).sync_signal_required() {
                    if batch.fence_to_signal.is_none() {
                        batch.fence_to_signal = Some(self.next_signal(queue)?);
                    }
                    let signal = batch.fence_to_signal.as_ref().unwrap();
                    self.node_signals.insert(
                        node_index,
                        FenceWait {
                            fence: signal.fence.clone(),
                            value: signal.value,
                        },
                    );
                }
            }

            if !batch.command_lists.is_empty()
                || !batch.fences_to_wait.is_empty()
                || batch.fence_to_signal.is_some()
            {
                batches.push(batch);
            }
        }

        self.levels.push(batches);
        Ok(())
    }

    ///Appends the collected begin halves of split barriers into the batches where the matching
    /// subresources were last transitioned, then hands out the frame's batches.
    pub fn finish(mut self) -> FrameBatches<B::CommandList, B::Fence> {
        for (list_ref, collection) in self.begin_barriers.drain() {
            self.levels[list_ref.level][list_ref.batch].command_lists[list_ref.list]
                .record_barriers(&collection);
        }

        FrameBatches {
            levels: self.levels,
        }
    }

    fn build_reroute_batch(
        &mut self,
        level: &DependencyLevel,
        plan: &LevelPlan,
        target: QueueIndex,
        level_index: usize,
        batches: &mut Vec<CommandListBatch<B::CommandList, B::Fence>>,
    ) -> Result<FenceWait<B::Fence>, CairnError> {
        let mut batch = self.new_batch(target);
        let mut collection = BarrierCollection::default();

        //The rerouted transitions inherit the data dependencies of the passes they were lifted
        // from: their producers on other queues must have signaled first.
        for &node_index in level.nodes() {
            if !plan.is_node_rerouted(self.graph, node_index) {
                continue;
            }
            for &dependency in self.graph.node(node_index).nodes_to_sync_with() {
                if self.graph.node(dependency).queue_index() == target {
                    continue;
                }
                if let Some(wait) = self.node_signals.get(&dependency) {
                    push_wait(&mut batch.fences_to_wait, wait.clone());
                }
            }
        }

        let list_ref = ListRef {
            level: level_index,
            batch: batches.len(),
            list: 0,
            queue: target,
            node: usize::MAX,
        };
        for transition in plan.rerouted_transitions(self.graph) {
            //If the subresource last transitioned on a foreign queue, that queue's progress
            // gates the rerouted list as well.
            if let Some(prev) = self.prev_transitions.get(&transition.subresource) {
                if prev.queue != target {
                    if let Some(wait) = self.node_signals.get(&prev.node) {
                        push_wait(&mut batch.fences_to_wait, wait.clone());
                    }
                }
            }
            collection.add_transition(TransitionBarrier {
                subresource: transition.subresource,
                before: transition.before,
                after: transition.after,
                phase: BarrierPhase::Full,
            });
            self.prev_transitions.insert(transition.subresource, list_ref);
        }

        let mut list = self.allocate_list(target)?;
        list.record_barriers(&collection);
        batch.command_lists.push(list);

        let signal = self.next_signal(target)?;
        let wait = FenceWait {
            fence: signal.fence.clone(),
            value: signal.value,
        };
        batch.fence_to_signal = Some(signal);
        batches.push(batch);

        Ok(wait)
    }

    ///Splits a transition when the subresource's previous transition landed in an earlier
    /// batch: the begin half goes back there, only the end half blocks here.
    fn add_transition(
        &mut self,
        collection: &mut BarrierCollection,
        subresource: SubresourceId,
        make: impl Fn(BarrierPhase) -> TransitionBarrier,
    ) {
        match self.prev_transitions.get(&subresource) {
            Some(prev) => {
                self.begin_barriers
                    .entry(*prev)
                    .or_default()
                    .add_transition(make(BarrierPhase::Begin));
                collection.add_transition(make(BarrierPhase::End));
            }
            None => collection.add_transition(make(BarrierPhase::Full)),
        }
    }

    fn new_batch(&mut self, queue: QueueIndex) -> CommandListBatch<B::CommandList, B::Fence> {
        let mut fences_to_wait = SmallVec::new();

        //Pass constants and other uploads land before anything else; every queue gates its
        // first batch of the frame on them, except the upload queue itself which is ordered
        // implicitly.
        if queue != 0 && !self.queues_waiting_on_upload.contains(&queue) {
            if let Some(wait) = &self.upload_wait {
                fences_to_wait.push(wait.clone());
                self.queues_waiting_on_upload.insert(queue);
            }
        }

        CommandListBatch {
            queue,
            command_lists: Vec::new(),
            fences_to_wait,
            fence_to_signal: None,
        }
    }

    fn allocate_list(&mut self, queue: QueueIndex) -> Result<B::CommandList, CairnError> {
        //Queue 0 is the graphics queue, everything else records compute lists.
        let list = if queue == 0 {
            self.backend.allocate_graphics_command_list()?
        } else {
            self.backend.allocate_compute_command_list()?
        };
        Ok(list)
    }

    fn next_signal(&mut self, queue: QueueIndex) -> Result<FenceSignal<B::Fence>, CairnError> {
        if !self.fences.contains_key(&queue) {
            let fence = self.backend.create_fence()?;
            self.fences.insert(queue, (fence, 0));
        }
        let (fence, value) = self.fences.get_mut(&queue).unwrap();
        *value += 1;
        Ok(FenceSignal {
            fence: fence.clone(),
            value: *value,
        })
    }

}

///Adds `wait`, keeping at most one entry per fence (the largest value wins).
fn push_wait<F: Clone + Eq>(waits: &mut SmallVec<[FenceWait<F>; 4]>, wait: FenceWait<F>) {
    for existing in waits.iter_mut() {
        if existing.fence == wait.fence {
            existing.value = existing.value.max(wait.value);
            return;
        }
    }
    waits.push(wait);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::TransitionPlanner;
    use crate::testing::{MockBackend, Rig};
    use cairn::barrier::Barrier;
    use cairn::state::ResourceState;
    use cairn::Name;

    fn build_frame(
        rig: &Rig,
        backend: &mut MockBackend,
    ) -> FrameBatches<crate::testing::MockList, crate::testing::MockFence> {
        let mut planner = TransitionPlanner::new();
        let plans: Vec<_> = rig
            .graph
            .dependency_levels()
            .iter()
            .map(|level| {
                planner
                    .plan_level(backend, &rig.graph, &rig.store, level)
                    .unwrap()
            })
            .collect();

        let mut builder = BatchBuilder::new(backend, &rig.graph);
        let mut record = |_node: NodeIndex, _list: &mut crate::testing::MockList| Ok(());
        for (level, plan) in rig.graph.dependency_levels().iter().zip(&plans) {
            builder.build_level(level, plan, &mut record).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn single_pass_is_one_batch_without_fences() {
        let mut rig = Rig::new();
        let a = rig.add_pass("Only");
        rig.schedule(a, |s| s.new_render_target("Out", None)).unwrap();
        rig.build().unwrap();

        let mut backend = MockBackend::default();
        let frame = build_frame(&rig, &mut backend);

        let batches: Vec<_> = frame.levels.iter().flatten().collect();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].fences_to_wait.is_empty());
        assert!(batches[0].fence_to_signal.is_none());
    }

    #[test]
    fn same_queue_chain_needs_no_fences() {
        let mut rig = Rig::new();
        let a = rig.add_pass("A");
        let b = rig.add_pass("B");
        rig.schedule(a, |s| s.new_render_target("R", None)).unwrap();
        rig.schedule(b, |s| {
            s.read_texture("R", &[0], None)?;
            s.new_render_target("S", None)
        })
        .unwrap();
        rig.build().unwrap();

        let mut backend = MockBackend::default();
        let frame = build_frame(&rig, &mut backend);

        for batch in frame.levels.iter().flatten() {
            assert!(batch.fences_to_wait.is_empty());
            assert!(batch.fence_to_signal.is_none());
        }
    }

    #[test]
    fn cross_queue_chain_signals_and_waits_once() {
        let mut rig = Rig::new();
        let a = rig.add_pass("A");
        let b = rig.add_pass("B");
        rig.schedule(a, |s| s.new_texture("R", None)).unwrap();
        rig.schedule(b, |s| {
            s.execute_on_queue(1);
            s.read_texture("R", &[0], None)?;
            s.new_texture("S", None)
        })
        .unwrap();
        rig.build().unwrap();

        let mut backend = MockBackend::default();
        let frame = build_frame(&rig, &mut backend);

        let signals: Vec<_> = frame
            .levels
            .iter()
            .flatten()
            .filter(|batch| batch.fence_to_signal.is_some())
            .collect();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].queue, 0);

        let waiters: Vec<_> = frame
            .levels
            .iter()
            .flatten()
            .filter(|batch| !batch.fences_to_wait.is_empty())
            .collect();
        assert_eq!(waiters.len(), 1);
        assert_eq!(waiters[0].queue, 1);
        let signal = signals[0].fence_to_signal.as_ref().unwrap();
        assert!(waiters[0]
            .fences_to_wait
            .iter()
            .any(|wait| wait.fence == signal.fence && wait.value == signal.value));
    }

    #[test]
    fn diamond_emits_expected_fence_wiring() {
        let mut rig = Rig::new();
        let a = rig.add_pass("A");
        let b = rig.add_pass("B");
        let c = rig.add_pass("C");
        let d = rig.add_pass("D");
        rig.schedule(a, |s| s.new_texture("R", None)).unwrap();
        rig.schedule(b, |s| {
            s.execute_on_queue(1);
            s.read_texture("R", &[0], None)?;
            s.new_texture("S", None)
        })
        .unwrap();
        rig.schedule(c, |s| {
            s.read_texture("R", &[0], None)?;
            s.new_texture("T", None)
        })
        .unwrap();
        rig.schedule(d, |s| {
            s.read_texture("S", &[0], None)?;
            s.read_texture("T", &[0], None)?;
            s.new_texture("U", None)
        })
        .unwrap();
        rig.build().unwrap();

        let mut backend = MockBackend::default();
        let frame = build_frame(&rig, &mut backend);

        //Cross-queue retained syncs after culling: B -> A and D -> B. R is read by both queues
        //in the middle level, so its shared transition reroutes and adds one signal/wait pair
        //between the rerouting queue and the compute-side reader.
        let signal_count = frame
            .levels
            .iter()
            .flatten()
            .filter(|batch| batch.fence_to_signal.is_some())
            .count();
        assert!(signal_count >= 2, "A and B must signal, got {signal_count}");

        //D runs on queue 0 and only waits on B's queue-1 fence.
        let d_level = frame.levels.last().unwrap();
        assert_eq!(d_level.len(), 1);
        assert_eq!(d_level[0].queue, 0);
        assert_eq!(d_level[0].fences_to_wait.len(), 1);
    }

    #[test]
    fn rerouted_transitions_interpose_fences() {
        let mut rig = Rig::new();
        let a = rig.add_pass("Draw");
        let b = rig.add_pass("AsyncRead");
        rig.schedule(a, |s| s.new_render_target("Color", None)).unwrap();
        rig.schedule(b, |s| {
            s.execute_on_queue(1);
            s.read_texture("Color", &[0], None)?;
            s.new_texture("Out", None)
        })
        .unwrap();
        rig.build().unwrap();

        let mut backend = MockBackend::reject_on_queue(1, ResourceState::RENDER_TARGET);
        let frame = build_frame(&rig, &mut backend);

        //Level 1 holds the rerouted-transitions batch on queue 0 followed by B's batch on
        // queue 1 waiting on it.
        let level = &frame.levels[1];
        assert_eq!(level.len(), 2);
        assert_eq!(level[0].queue, 0);
        assert!(level[0].fence_to_signal.is_some());
        let color_transition = level[0].command_lists[0]
            .barriers
            .iter()
            .any(|barrier| matches!(barrier, Barrier::Transition(t) if t.subresource == SubresourceId::new(Name::new("Color"), 0)));
        assert!(color_transition);

        assert_eq!(level[1].queue, 1);
        let reroute_signal = level[0].fence_to_signal.as_ref().unwrap();
        assert!(level[1]
            .fences_to_wait
            .iter()
            .any(|wait| wait.fence == reroute_signal.fence && wait.value == reroute_signal.value));
    }

    #[test]
    fn distant_reuse_becomes_a_split_barrier() {
        let mut rig = Rig::new();
        let a = rig.add_pass("A");
        let b = rig.add_pass("B");
        let c = rig.add_pass("C");
        let d = rig.add_pass("D");
        rig.schedule(a, |s| {
            s.new_render_target("R", None)?;
            s.new_render_target("Chain0", None)
        })
        .unwrap();
        rig.schedule(b, |s| {
            s.read_texture("Chain0", &[0], None)?;
            s.new_render_target("Chain1", None)
        })
        .unwrap();
        rig.schedule(c, |s| {
            s.read_texture("Chain1", &[0], None)?;
            s.new_render_target("Chain2", None)
        })
        .unwrap();
        rig.schedule(d, |s| {
            s.read_texture("Chain2", &[0], None)?;
            s.read_texture("R", &[0], None)?;
            s.new_render_target("Final", None)
        })
        .unwrap();
        rig.build().unwrap();

        let mut backend = MockBackend::default();
        let frame = build_frame(&rig, &mut backend);

        let r = SubresourceId::new(Name::new("R"), 0);

        //A's transitions list ends with the begin half of R's render-target -> shader-read
        // transition; D's list carries the end half.
        let level0_barriers: Vec<_> = frame.levels[0]
            .iter()
            .flat_map(|batch| batch.command_lists.iter())
            .flat_map(|list| list.barriers.iter())
            .collect();
        assert!(level0_barriers.iter().any(|barrier| matches!(
            barrier,
            Barrier::Transition(t)
                if t.subresource == r
                    && t.phase == BarrierPhase::Begin
                    && t.before == ResourceState::RENDER_TARGET
                    && t.after == ResourceState::ANY_SHADER_ACCESS
        )));

        let level3_barriers: Vec<_> = frame.levels[3]
            .iter()
            .flat_map(|batch| batch.command_lists.iter())
            .flat_map(|list| list.barriers.iter())
            .collect();
        assert!(level3_barriers.iter().any(|barrier| matches!(
            barrier,
            Barrier::Transition(t) if t.subresource == r && t.phase == BarrierPhase::End
        )));
        //No full transition of R anywhere in between.
        for level in &frame.levels[1..3] {
            for batch in level {
                for list in &batch.command_lists {
                    assert!(list.barriers.iter().all(|barrier| !matches!(
                        barrier,
                        Barrier::Transition(t) if t.subresource == r
                    )));
                }
            }
        }
    }

    #[test]
    fn pre_frame_batches_gate_other_queues() {
        let mut rig = Rig::new();
        let a = rig.add_pass("Trace");
        rig.schedule(a, |s| {
            s.execute_on_queue(1);
            s.use_ray_tracing();
            s.new_texture("Lit", None)
        })
        .unwrap();
        rig.build().unwrap();

        let mut planner = TransitionPlanner::new();
        let mut backend = MockBackend::default();
        let plans: Vec<_> = rig
            .graph
            .dependency_levels()
            .iter()
            .map(|level| {
                planner
                    .plan_level(&backend, &rig.graph, &rig.store, level)
                    .unwrap()
            })
            .collect();

        let mut builder = BatchBuilder::new(&mut backend, &rig.graph);
        builder.pre_frame(true).unwrap();
        let mut record = |_n: NodeIndex, _l: &mut crate::testing::MockList| Ok(());
        for (level, plan) in rig.graph.dependency_levels().iter().zip(&plans) {
            builder.build_level(level, plan, &mut record).unwrap();
        }
        let frame = builder.finish();

        //Pre-frame level: upload batch on queue 0 plus the acceleration structure builds on
        // queue 1, which records a compute list.
        assert_eq!(frame.levels[0].len(), 2);
        assert_eq!(frame.levels[0][0].queue, 0);
        assert_eq!(frame.levels[0][1].queue, RTAS_BUILD_QUEUE);
        assert_eq!(
            frame.levels[0][1].command_lists[0].kind,
            crate::testing::ListKind::Compute
        );

        //The trace pass on queue 1 waits on the upload fence (cross-queue); acceleration
        // builds ran on its own queue so they are ordered implicitly.
        let trace_batch = &frame.levels[1][0];
        assert_eq!(trace_batch.queue, 1);
        let upload_signal = frame.levels[0][0].fence_to_signal.as_ref().unwrap();
        assert!(trace_batch
            .fences_to_wait
            .iter()
            .any(|wait| wait.fence == upload_signal.fence));
    }
}
