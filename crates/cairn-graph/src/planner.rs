use cairn::backend::{GraphicsBackend, QueueIndex};
use cairn::barrier::{AliasingBarrier, UavBarrier};
use cairn::state::ResourceState;
use cairn::SubresourceId;
use fxhash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::graph::{DependencyLevel, NodeIndex, PassGraph};
use crate::resources::ResourceStore;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "No queue can perform the transition of {subresource} from {before:?} to {after:?} in its dependency level"
    )]
    UnsupportedTransition {
        subresource: SubresourceId,
        before: ResourceState,
        after: ResourceState,
    },
}

///A state transition one node needs before its work runs.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PlannedTransition {
    pub node: NodeIndex,
    pub subresource: SubresourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

///Everything the batch builder needs to know about one dependency level.
pub struct LevelPlan {
    pub transitions: Vec<PlannedTransition>,
    pub aliasing: Vec<(NodeIndex, AliasingBarrier)>,
    pub uav: Vec<(NodeIndex, UavBarrier)>,
    ///Queues whose transitions must be recorded elsewhere this level.
    pub rerouted_queues: FxHashSet<QueueIndex>,
    ///The queue that takes over the rerouted transitions, if any are needed.
    pub reroute_target: Option<QueueIndex>,
}

impl LevelPlan {
    pub fn transitions_for_node(&self, node: NodeIndex) -> impl Iterator<Item = &PlannedTransition> {
        self.transitions
            .iter()
            .filter(move |transition| transition.node == node)
    }

    ///Transitions whose owning queue got rerouted this level.
    pub fn rerouted_transitions<'a>(
        &'a self,
        graph: &'a PassGraph,
    ) -> impl Iterator<Item = &'a PlannedTransition> {
        self.transitions.iter().filter(move |transition| {
            self.rerouted_queues
                .contains(&graph.node(transition.node).queue_index())
        })
    }

    pub fn is_node_rerouted(&self, graph: &PassGraph, node: NodeIndex) -> bool {
        self.rerouted_queues
            .contains(&graph.node(node).queue_index())
    }
}

///Walks dependency levels in order, diffing each touched subresource's requested state against
/// the tracked current state, and decides which queues need their transitions rerouted to a more
/// competent queue.
pub struct TransitionPlanner {
    subresource_states: FxHashMap<SubresourceId, ResourceState>,
}

impl Default for TransitionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionPlanner {
    pub fn new() -> Self {
        TransitionPlanner {
            subresource_states: FxHashMap::default(),
        }
    }

    ///Forgets all tracked subresource states. Call at frame start.
    pub fn reset(&mut self) {
        self.subresource_states.clear();
    }

    pub fn plan_level<B: GraphicsBackend>(
        &mut self,
        backend: &B,
        graph: &PassGraph,
        store: &ResourceStore,
        level: &DependencyLevel,
    ) -> Result<LevelPlan, PlanError> {
        let mut plan = LevelPlan {
            transitions: Vec::new(),
            aliasing: Vec::new(),
            uav: Vec::new(),
            rerouted_queues: FxHashSet::default(),
            reroute_target: None,
        };

        for &node_index in level.nodes() {
            let node = graph.node(node_index);
            let pass = node.metadata().name;

            for &resource in node.all_resources() {
                let Some(entry) = store.get(resource) else {
                    continue;
                };
                let info = &entry.scheduling_info;
                let Some(pass_info) = info.info_for_pass(pass) else {
                    continue;
                };

                //The aliasing barrier belongs to the pass where the resource's lifetime starts.
                if pass_info.needs_aliasing_barrier
                    && graph.resource_usage_timeline(resource).map(|t| t.0)
                        == Some(node.global_execution_index())
                {
                    plan.aliasing.push((
                        node_index,
                        AliasingBarrier {
                            before: store.aliased_predecessor(resource),
                            after: resource,
                        },
                    ));
                }

                for (subresource_index, subresource_info) in
                    pass_info.subresource_infos.iter().enumerate()
                {
                    let Some(subresource_info) = subresource_info else {
                        continue;
                    };
                    let subresource_index = subresource_index as u32;
                    let subresource = SubresourceId::new(resource, subresource_index);

                    //Readers all transition to the frame's combined read mask at once, writers
                    // to the single write state.
                    let after = if subresource_info.requested_state.is_read_only() {
                        info.combined_read_states(subresource_index)
                    } else {
                        info.write_state(subresource_index)
                    };

                    let before = self
                        .subresource_states
                        .get(&subresource)
                        .copied()
                        .unwrap_or(ResourceState::COMMON);

                    if before != after {
                        plan.transitions.push(PlannedTransition {
                            node: node_index,
                            subresource,
                            before,
                            after,
                        });
                        self.subresource_states.insert(subresource, after);
                    }
                }

                if pass_info.needs_uav_barrier {
                    plan.uav.push((node_index, UavBarrier { resource }));
                }
            }
        }

        //A queue needs rerouting if one of its transitions is illegal there, or if it takes
        // part in a multi-queue read (the shared transition must happen exactly once).
        for transition in &plan.transitions {
            let queue = graph.node(transition.node).queue_index();
            if !backend.is_transition_supported_on_queue(
                queue,
                transition.before,
                transition.after,
            ) {
                plan.rerouted_queues.insert(queue);
            }
        }
        for queue in level.queues_involved_in_cross_queue_reads() {
            plan.rerouted_queues.insert(*queue);
        }

        let rerouted: Vec<PlannedTransition> =
            plan.rerouted_transitions(graph).copied().collect();
        if rerouted.is_empty() {
            plan.rerouted_queues.clear();
            return Ok(plan);
        }

        let target = (0..graph.queue_count()).find(|candidate| {
            rerouted.iter().all(|transition| {
                backend.is_transition_supported_on_queue(
                    *candidate,
                    transition.before,
                    transition.after,
                )
            })
        });

        match target {
            Some(target) => {
                #[cfg(feature = "logging")]
                log::trace!(
                    "Level {}: rerouting transitions of queues {:?} to queue {}",
                    level.level_index(),
                    plan.rerouted_queues,
                    target
                );
                plan.reroute_target = Some(target);
                Ok(plan)
            }
            None => {
                let offending = rerouted
                    .iter()
                    .find(|transition| {
                        (0..graph.queue_count()).all(|queue| {
                            !backend.is_transition_supported_on_queue(
                                queue,
                                transition.before,
                                transition.after,
                            )
                        })
                    })
                    .unwrap_or(&rerouted[0]);
                Err(PlanError::UnsupportedTransition {
                    subresource: offending.subresource,
                    before: offending.before,
                    after: offending.after,
                })
            }
        }
    }
}
