//! # Cairn graph
//!
//! A declarative render-pass graph and multi-queue GPU command scheduler.
//!
//! Passes implement the [RenderPass](pass::RenderPass) trait and declare the resources they read
//! and write through a [ResourceScheduler](scheduler::ResourceScheduler) once per frame. From
//! those declarations the [PassGraph](graph::PassGraph) derives dependency levels (sets of
//! passes that may overlap across queues), culls redundant cross-queue synchronizations, the
//! [TransitionPlanner](planner::TransitionPlanner) computes per-subresource state transitions
//! and aliasing barriers, and the [BatchBuilder](batch::BatchBuilder) assembles per-queue
//! command-list batches tied together by fences, which the [Executor](executor::Executor)
//! finally submits through an abstract [GraphicsBackend](cairn::backend::GraphicsBackend).
//!
//! The [Cairn](engine::Cairn) type ties the phases together into a per-frame drive loop.

use thiserror::Error;

pub mod pass;
pub use pass::{PassMetadata, PassPurpose, RenderPass};

pub mod scheduler;
pub use scheduler::{ResourceScheduler, ScheduleError};

pub mod resources;
pub use resources::ResourceStore;

pub mod graph;
pub use graph::{GraphError, PassGraph};

pub mod planner;
pub use planner::{PlanError, TransitionPlanner};

pub mod batch;
pub mod executor;

pub mod context;
pub use context::{RenderContext, ResourceProvider};

pub mod engine;
pub use engine::{Cairn, RenderSurface};

#[cfg(test)]
pub(crate) mod testing;

///Top level error structure.
#[derive(Debug, Error)]
pub enum CairnError {
    #[error("anyhow")]
    Any(#[from] anyhow::Error),

    #[error("Backend error")]
    Backend(#[from] cairn::BackendError),

    #[error("Scheduling error")]
    Schedule(#[from] ScheduleError),

    #[error("Graph build error")]
    Graph(#[from] GraphError),

    #[error("Transition planning error")]
    Plan(#[from] PlanError),
}
