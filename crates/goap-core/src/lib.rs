//! Data model and authoring contracts for the tick-driven GOAP engine.
//!
//! This crate owns everything a domain author touches: conditions and the
//! fixed-capacity containers that hold them, the [`Domain`] knowledge
//! base, the composer/task contracts that game behaviors implement, and
//! the typed handle/arena primitives the runtime builds its records on.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod arena;
pub mod composer;
pub mod condition;
pub mod domain;
pub mod error;
pub mod handle;
pub mod list;
pub mod set;
pub mod status;
pub mod world;

pub use arena::Arena;
pub use composer::{
    AtomActionComposer, AtomTask, ConditionResolverComposer, DeferredOp, DeferredQueue,
    InstantResolver, ResolverTask,
};
pub use condition::{ActionId, Condition, ConditionId, DomainId};
pub use domain::{AtomActionSet, Domain, GoapAction};
pub use error::DomainError;
pub use handle::{
    AgentHandle, AtomHandle, AtomSetExecHandle, Handle, OnFailHandle, PlanExecHandle,
    RequestHandle, ResolverHandle, SearchHandle,
};
pub use list::{ConditionList, GoalList, TargetList};
pub use set::ConditionSet;
pub use status::{ActionStatus, PlanOutcome, RequestStatus};
pub use world::{AgentId, TickContext, WorldMut, WorldView};
