use ahash::AHashMap;
use cairn::backend::{GraphicsBackend, QueueIndex, Submission};
use cairn::BackendError;

use crate::batch::FrameBatches;

///Submits the frame's batches level by level. All cross-level and cross-queue ordering rides on
/// the fence waits and signals the batch builder attached; no global synchronization happens
/// here.
pub struct Executor;

impl Executor {
    pub fn execute<B: GraphicsBackend>(
        backend: &mut B,
        frame: FrameBatches<B::CommandList, B::Fence>,
    ) -> Result<(), BackendError> {
        let mut submissions_per_queue: AHashMap<QueueIndex, u64> = AHashMap::new();

        for level in frame.levels {
            for batch in level {
                *submissions_per_queue.entry(batch.queue).or_insert(0) += 1;

                #[cfg(feature = "logging")]
                log::trace!(
                    "Submitting {} lists on queue {} ({} waits, signal: {})",
                    batch.command_lists.len(),
                    batch.queue,
                    batch.fences_to_wait.len(),
                    batch.fence_to_signal.is_some()
                );

                backend.submit(
                    batch.queue,
                    Submission {
                        command_lists: batch.command_lists,
                        wait_fences: batch.fences_to_wait,
                        signal_fence: batch.fence_to_signal,
                    },
                )?;
            }
        }

        #[cfg(feature = "logging")]
        for (queue, count) in &submissions_per_queue {
            log::trace!("Queue {}: {} submissions this frame", queue, count);
        }
        let _ = submissions_per_queue;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchBuilder;
    use crate::graph::NodeIndex;
    use crate::planner::TransitionPlanner;
    use crate::testing::{MockBackend, MockList, Rig};

    #[test]
    fn batches_are_submitted_in_level_order() {
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
        let mut planner = TransitionPlanner::new();
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
        let mut record = |_n: NodeIndex, _l: &mut MockList| Ok(());
        for (level, plan) in rig.graph.dependency_levels().iter().zip(&plans) {
            builder.build_level(level, plan, &mut record).unwrap();
        }
        let frame = builder.finish();

        Executor::execute(&mut backend, frame).unwrap();

        assert_eq!(backend.submissions.len(), 2);
        assert_eq!(backend.submissions[0].queue, 0);
        assert_eq!(backend.submissions[1].queue, 1);
        //The cross-queue edge turned into exactly one signal and one wait.
        assert_eq!(backend.signals().len(), 1);
        assert_eq!(backend.total_waits(), 1);
    }
}
