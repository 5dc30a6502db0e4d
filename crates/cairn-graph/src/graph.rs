use cairn::backend::QueueIndex;
use cairn::{Name, SubresourceId};
use fxhash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};
use thiserror::Error;

use crate::pass::PassMetadata;

pub type NodeIndex = usize;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Render pass {0} is already added to the graph")]
    DuplicatePass(Name),

    #[error(
        "Circular dependency between render passes {pass_a} and {pass_b} over {resource}[{subresource}]"
    )]
    CircularDependency {
        pass_a: Name,
        pass_b: Name,
        resource: Name,
        subresource: u32,
    },

    #[error("Dependency level count exceeded the pass count, the pass graph contains a cycle")]
    CircularGraph,

    #[error(
        "{resource}[{subresource}] already has a write dependency from pass {first_writer}, second write scheduled by {second_writer}. Each subresource may be written once per frame."
    )]
    MultipleWriters {
        resource: Name,
        subresource: u32,
        first_writer: Name,
        second_writer: Name,
    },
}

///A single pass in the graph. Created once via [PassGraph::add_pass]; all other state is
/// per-frame and wiped by [PassGraph::clear].
pub struct Node {
    metadata: PassMetadata,
    pub(crate) queue_index: QueueIndex,
    pub(crate) uses_ray_tracing: bool,

    read_subresources: FxHashSet<SubresourceId>,
    written_subresources: FxHashSet<SubresourceId>,
    all_subresources: FxHashSet<SubresourceId>,
    all_resources: FxHashSet<Name>,

    ///Passes this node has to observe before running. Filled during level construction,
    /// shrunk to the minimal set by the synchronization culler.
    pub(crate) nodes_to_sync_with: Vec<NodeIndex>,
    ///Per queue: the largest queue-local execution index this node transitively synchronizes
    /// with, stored as index plus one. Zero marks a queue the node never synchronizes with.
    synchronization_index_set: SmallVec<[u64; 4]>,
    pub(crate) sync_signal_required: bool,

    global_execution_index: u64,
    local_to_dependency_level_execution_index: u64,
    local_to_queue_execution_index: u64,
    dependency_level_index: u64,
}

impl Node {
    fn new(metadata: PassMetadata) -> Self {
        Node {
            metadata,
            queue_index: 0,
            uses_ray_tracing: false,
            read_subresources: FxHashSet::default(),
            written_subresources: FxHashSet::default(),
            all_subresources: FxHashSet::default(),
            all_resources: FxHashSet::default(),
            nodes_to_sync_with: Vec::new(),
            synchronization_index_set: SmallVec::new(),
            sync_signal_required: false,
            global_execution_index: 0,
            local_to_dependency_level_execution_index: 0,
            local_to_queue_execution_index: 0,
            dependency_level_index: 0,
        }
    }

    fn clear(&mut self) {
        self.queue_index = 0;
        self.uses_ray_tracing = false;
        self.read_subresources.clear();
        self.written_subresources.clear();
        self.all_subresources.clear();
        self.all_resources.clear();
        self.nodes_to_sync_with.clear();
        self.synchronization_index_set.clear();
        self.sync_signal_required = false;
        self.global_execution_index = 0;
        self.local_to_dependency_level_execution_index = 0;
        self.local_to_queue_execution_index = 0;
        self.dependency_level_index = 0;
    }

    pub fn metadata(&self) -> &PassMetadata {
        &self.metadata
    }

    pub fn queue_index(&self) -> QueueIndex {
        self.queue_index
    }

    pub fn uses_ray_tracing(&self) -> bool {
        self.uses_ray_tracing
    }

    pub fn read_subresources(&self) -> &FxHashSet<SubresourceId> {
        &self.read_subresources
    }

    pub fn written_subresources(&self) -> &FxHashSet<SubresourceId> {
        &self.written_subresources
    }

    pub fn all_subresources(&self) -> &FxHashSet<SubresourceId> {
        &self.all_subresources
    }

    pub fn all_resources(&self) -> &FxHashSet<Name> {
        &self.all_resources
    }

    pub fn nodes_to_sync_with(&self) -> &[NodeIndex] {
        &self.nodes_to_sync_with
    }

    pub fn sync_signal_required(&self) -> bool {
        self.sync_signal_required
    }

    pub fn synchronization_index_set(&self) -> &[u64] {
        &self.synchronization_index_set
    }

    pub fn global_execution_index(&self) -> u64 {
        self.global_execution_index
    }

    pub fn local_to_dependency_level_execution_index(&self) -> u64 {
        self.local_to_dependency_level_execution_index
    }

    pub fn local_to_queue_execution_index(&self) -> u64 {
        self.local_to_queue_execution_index
    }

    pub fn dependency_level_index(&self) -> u64 {
        self.dependency_level_index
    }

    pub fn reads(&self, subresource: SubresourceId) -> bool {
        self.read_subresources.contains(&subresource)
    }

    pub fn writes(&self, subresource: SubresourceId) -> bool {
        self.written_subresources.contains(&subresource)
    }
}

///A set of passes that are mutually independent on their declared reads and writes, so they may
/// execute concurrently across queues.
pub struct DependencyLevel {
    level_index: u64,
    pub(crate) nodes: Vec<NodeIndex>,
    pub(crate) nodes_per_queue: Vec<Vec<NodeIndex>>,
    pub(crate) subresources_read_by_multiple_queues: FxHashSet<SubresourceId>,
    pub(crate) queues_involved_in_cross_queue_reads: FxHashSet<QueueIndex>,
}

impl DependencyLevel {
    fn new(level_index: u64) -> Self {
        DependencyLevel {
            level_index,
            nodes: Vec::new(),
            nodes_per_queue: Vec::new(),
            subresources_read_by_multiple_queues: FxHashSet::default(),
            queues_involved_in_cross_queue_reads: FxHashSet::default(),
        }
    }

    pub fn level_index(&self) -> u64 {
        self.level_index
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn nodes_for_queue(&self, queue: QueueIndex) -> &[NodeIndex] {
        self.nodes_per_queue
            .get(queue as usize)
            .map(|nodes| nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn subresources_read_by_multiple_queues(&self) -> &FxHashSet<SubresourceId> {
        &self.subresources_read_by_multiple_queues
    }

    pub fn queues_involved_in_cross_queue_reads(&self) -> &FxHashSet<QueueIndex> {
        &self.queues_involved_in_cross_queue_reads
    }
}

///The render-pass dependency graph. Owns all pass nodes in a dense arena; dependency levels and
/// sync lists reference nodes by index.
pub struct PassGraph {
    nodes: Vec<Node>,
    pass_registry: FxHashSet<Name>,
    ///Per frame: which pass wrote each subresource. Enforces the single-writer invariant and
    /// lets the error name both offenders.
    write_dependency_registry: FxHashMap<SubresourceId, Name>,

    dependency_levels: Vec<DependencyLevel>,
    resource_usage_timelines: FxHashMap<Name, (u64, u64)>,
    queue_node_counters: FxHashMap<QueueIndex, u64>,
    ordered_nodes: Vec<NodeIndex>,
    first_ray_tracing_node: Option<NodeIndex>,
    detected_queue_count: u32,
}

impl Default for PassGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PassGraph {
    pub fn new() -> Self {
        PassGraph {
            nodes: Vec::new(),
            pass_registry: FxHashSet::default(),
            write_dependency_registry: FxHashMap::default(),
            dependency_levels: Vec::new(),
            resource_usage_timelines: FxHashMap::default(),
            queue_node_counters: FxHashMap::default(),
            ordered_nodes: Vec::new(),
            first_ray_tracing_node: None,
            detected_queue_count: 1,
        }
    }

    pub fn add_pass(&mut self, metadata: PassMetadata) -> Result<NodeIndex, GraphError> {
        if !self.pass_registry.insert(metadata.name) {
            return Err(GraphError::DuplicatePass(metadata.name));
        }

        self.nodes.push(Node::new(metadata));
        Ok(self.nodes.len() - 1)
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_count_for_queue(&self, queue: QueueIndex) -> u64 {
        self.queue_node_counters.get(&queue).copied().unwrap_or(0)
    }

    pub fn dependency_levels(&self) -> &[DependencyLevel] {
        &self.dependency_levels
    }

    pub fn queue_count(&self) -> u32 {
        self.detected_queue_count
    }

    ///Nodes in global execution order.
    pub fn ordered_nodes(&self) -> &[NodeIndex] {
        &self.ordered_nodes
    }

    pub fn node_at_global_index(&self, global_index: u64) -> NodeIndex {
        self.ordered_nodes[global_index as usize]
    }

    pub fn first_ray_tracing_node(&self) -> Option<NodeIndex> {
        self.first_ray_tracing_node
    }

    pub fn resource_usage_timelines(&self) -> &FxHashMap<Name, (u64, u64)> {
        &self.resource_usage_timelines
    }

    pub fn resource_usage_timeline(&self, resource: Name) -> Option<(u64, u64)> {
        self.resource_usage_timelines.get(&resource).copied()
    }

    pub(crate) fn set_queue_index(&mut self, node: NodeIndex, queue: QueueIndex) {
        self.nodes[node].queue_index = queue;
    }

    pub(crate) fn set_uses_ray_tracing(&mut self, node: NodeIndex) {
        self.nodes[node].uses_ray_tracing = true;
    }

    pub(crate) fn add_read_dependency(
        &mut self,
        node: NodeIndex,
        resource: Name,
        subresources: &[u32],
    ) {
        let node = &mut self.nodes[node];
        for &index in subresources {
            let subresource = SubresourceId::new(resource, index);
            node.read_subresources.insert(subresource);
            node.all_subresources.insert(subresource);
        }
        node.all_resources.insert(resource);
    }

    pub(crate) fn add_write_dependency(
        &mut self,
        node: NodeIndex,
        resource: Name,
        subresources: &[u32],
    ) -> Result<(), GraphError> {
        let pass = self.nodes[node].metadata.name;
        for &index in subresources {
            let subresource = SubresourceId::new(resource, index);
            if let Some(first_writer) = self.write_dependency_registry.get(&subresource) {
                return Err(GraphError::MultipleWriters {
                    resource,
                    subresource: index,
                    first_writer: *first_writer,
                    second_writer: pass,
                });
            }
            self.write_dependency_registry.insert(subresource, pass);

            let node = &mut self.nodes[node];
            node.written_subresources.insert(subresource);
            node.all_subresources.insert(subresource);
        }
        self.nodes[node].all_resources.insert(resource);
        Ok(())
    }

    ///Builds the frame plan: dependency levels, execution indices and the minimal
    /// synchronization sets.
    pub fn build(&mut self) -> Result<(), GraphError> {
        self.build_dependency_levels()?;
        self.finalize_dependency_levels();
        self.cull_redundant_synchronizations();

        #[cfg(feature = "logging")]
        for level in &self.dependency_levels {
            log::trace!(
                "Level {}: {:?}",
                level.level_index,
                level
                    .nodes
                    .iter()
                    .map(|n| self.nodes[*n].metadata.name.as_str())
                    .collect::<Vec<_>>()
            );
        }

        Ok(())
    }

    ///Wipes all per-frame state. Registered passes stay.
    pub fn clear(&mut self) {
        self.write_dependency_registry.clear();
        self.dependency_levels.clear();
        self.resource_usage_timelines.clear();
        self.queue_node_counters.clear();
        self.ordered_nodes.clear();
        self.first_ray_tracing_node = None;
        self.detected_queue_count = 1;

        for node in &mut self.nodes {
            node.clear();
        }
    }

    fn build_dependency_levels(&mut self) -> Result<(), GraphError> {
        self.detected_queue_count = self
            .nodes
            .iter()
            .map(|node| node.queue_index + 1)
            .max()
            .unwrap_or(1);

        let mut base = DependencyLevel::new(0);
        base.nodes = (0..self.nodes.len()).collect();
        self.dependency_levels.push(base);

        let mut current = 0usize;
        loop {
            if self.dependency_levels.len() > self.nodes.len().max(1) {
                return Err(GraphError::CircularGraph);
            }

            let level_nodes = self.dependency_levels[current].nodes.clone();
            let mut moved: Vec<NodeIndex> = Vec::new();

            for &n in &level_nodes {
                let mut depends_on_level = false;

                for &m in &level_nodes {
                    if n == m {
                        continue;
                    }

                    //A node reading something another node in the same level writes depends on
                    // that node and has to move one level down.
                    let dependency = self.nodes[m]
                        .written_subresources
                        .iter()
                        .find(|sub| self.nodes[n].read_subresources.contains(*sub))
                        .copied();

                    let Some(subresource) = dependency else {
                        continue;
                    };

                    //The reverse edge existing at the same time means neither node can ever
                    // leave the other behind.
                    if self.nodes[n]
                        .written_subresources
                        .iter()
                        .any(|sub| self.nodes[m].read_subresources.contains(sub))
                    {
                        return Err(GraphError::CircularDependency {
                            pass_a: self.nodes[n].metadata.name,
                            pass_b: self.nodes[m].metadata.name,
                            resource: subresource.resource(),
                            subresource: subresource.index(),
                        });
                    }

                    if self.nodes[n].queue_index != self.nodes[m].queue_index {
                        self.nodes[m].sync_signal_required = true;
                    }

                    //Same-queue dependencies are recorded too, the synchronization culler uses
                    // them to detect indirect syncs.
                    self.nodes[n].nodes_to_sync_with.push(m);
                    depends_on_level = true;
                }

                if depends_on_level {
                    moved.push(n);
                }
            }

            if moved.is_empty() {
                break;
            }

            let moved_set: FxHashSet<NodeIndex> = moved.iter().copied().collect();
            self.dependency_levels[current]
                .nodes
                .retain(|node| !moved_set.contains(node));

            let mut next = DependencyLevel::new(self.dependency_levels.len() as u64);
            for &node in &moved {
                self.nodes[node].dependency_level_index += 1;
                next.nodes.push(node);
            }
            self.dependency_levels.push(next);
            current += 1;
        }

        Ok(())
    }

    fn finalize_dependency_levels(&mut self) {
        let Self {
            nodes,
            dependency_levels,
            resource_usage_timelines,
            queue_node_counters,
            ordered_nodes,
            first_ray_tracing_node,
            detected_queue_count,
            ..
        } = self;

        let mut global_execution_index = 0u64;
        let mut local_execution_index = 0u64;

        for level in dependency_levels.iter_mut() {
            let mut reading_queue_tracker: FxHashMap<SubresourceId, FxHashSet<QueueIndex>> =
                FxHashMap::default();
            level.nodes_per_queue = vec![Vec::new(); *detected_queue_count as usize];

            for &node_index in &level.nodes {
                let node = &mut nodes[node_index];

                for subresource in &node.read_subresources {
                    reading_queue_tracker
                        .entry(*subresource)
                        .or_default()
                        .insert(node.queue_index);
                }

                node.global_execution_index = global_execution_index;
                node.local_to_dependency_level_execution_index = local_execution_index;
                let queue_counter = queue_node_counters.entry(node.queue_index).or_insert(0);
                node.local_to_queue_execution_index = *queue_counter;
                *queue_counter += 1;

                ordered_nodes.push(node_index);
                level.nodes_per_queue[node.queue_index as usize].push(node_index);

                for subresource in &node.all_subresources {
                    resource_usage_timelines
                        .entry(subresource.resource())
                        .and_modify(|timeline| timeline.1 = global_execution_index)
                        .or_insert((global_execution_index, global_execution_index));
                }

                //First ray tracing user is the synchronization point for BVH builds.
                if node.uses_ray_tracing && first_ray_tracing_node.is_none() {
                    *first_ray_tracing_node = Some(node_index);
                }

                local_execution_index += 1;
                global_execution_index += 1;
            }

            for (subresource, queues) in reading_queue_tracker {
                if queues.len() > 1 {
                    for queue in &queues {
                        level.queues_involved_in_cross_queue_reads.insert(*queue);
                    }
                    level.subresources_read_by_multiple_queues.insert(subresource);
                }
            }

            local_execution_index = 0;
        }
    }

    ///Shrinks every node's `nodes_to_sync_with` to the smallest set that still covers all of
    /// its cross-queue dependencies, exploiting synchronizations that already happen
    /// transitively.
    pub(crate) fn cull_redundant_synchronizations(&mut self) {
        let queue_count = self.detected_queue_count as usize;

        for node in &mut self.nodes {
            node.synchronization_index_set = smallvec![0; queue_count];
        }

        for level_index in 0..self.dependency_levels.len() {
            let level_nodes = self.dependency_levels[level_index].nodes.clone();

            //First pass: keep only the closest dependency per queue and seed the SSIS from it.
            for &node_index in &level_nodes {
                let dependencies = self.nodes[node_index].nodes_to_sync_with.clone();

                let mut closest_per_queue: SmallVec<[Option<NodeIndex>; 4]> =
                    smallvec![None; queue_count];
                for dependency in dependencies {
                    let queue = self.nodes[dependency].queue_index as usize;
                    let index = self.nodes[dependency].local_to_queue_execution_index;
                    match closest_per_queue[queue] {
                        Some(closest)
                            if self.nodes[closest].local_to_queue_execution_index >= index => {}
                        _ => closest_per_queue[queue] = Some(dependency),
                    }
                }

                let own_queue = self.nodes[node_index].queue_index as usize;
                let own_index = self.nodes[node_index].local_to_queue_execution_index;

                //Entries hold the queue-local index plus one; zero means no synchronization
                // with that queue at all, so an unseeded entry can never claim coverage below.
                let mut retained = Vec::new();
                let mut index_set: SmallVec<[u64; 4]> = smallvec![0; queue_count];
                for closest in closest_per_queue.iter().flatten().copied() {
                    let queue = self.nodes[closest].queue_index as usize;
                    if queue != own_queue {
                        index_set[queue] = self.nodes[closest].local_to_queue_execution_index + 1;
                    }
                    retained.push(closest);
                }
                index_set[own_queue] = own_index + 1;

                let node = &mut self.nodes[node_index];
                node.nodes_to_sync_with = retained;
                node.synchronization_index_set = index_set;
            }

            //Second pass: greedily pick one dependency per iteration, the one whose SSIS
            // covers the most of the queues still in need of synchronization. A single retained
            // dependency often covers several queues through its own transitive syncs.
            for &node_index in &level_nodes {
                let dependencies = self.nodes[node_index].nodes_to_sync_with.clone();
                let own_queue = self.nodes[node_index].queue_index;

                let mut queues_to_sync_with: FxHashSet<QueueIndex> = dependencies
                    .iter()
                    .filter(|dep| self.nodes[**dep].queue_index != own_queue)
                    .map(|dep| self.nodes[*dep].queue_index)
                    .collect();

                let mut optimal: Vec<NodeIndex> = Vec::new();

                while !queues_to_sync_with.is_empty() {
                    let mut coverage: Vec<(NodeIndex, Vec<QueueIndex>)> = Vec::new();
                    let mut max_covered = 0usize;

                    for &dependency in &dependencies {
                        let covered: Vec<QueueIndex> = queues_to_sync_with
                            .iter()
                            .copied()
                            .filter(|queue| {
                                let claimed = self.nodes[dependency].synchronization_index_set
                                    [*queue as usize];
                                claimed > 0
                                    && claimed
                                        >= self.nodes[node_index].synchronization_index_set
                                            [*queue as usize]
                            })
                            .collect();

                        max_covered = max_covered.max(covered.len());
                        coverage.push((dependency, covered));
                    }

                    if max_covered == 0 {
                        break;
                    }

                    //Ties go to the earliest dependency in iteration order.
                    let Some((best, covered)) = coverage
                        .into_iter()
                        .find(|(_, covered)| covered.len() == max_covered)
                    else {
                        break;
                    };
                    if !optimal.contains(&best) {
                        optimal.push(best);
                    }
                    for queue in covered {
                        queues_to_sync_with.remove(&queue);
                    }
                }

                self.nodes[node_index].nodes_to_sync_with = optimal;
            }
        }
    }
}
