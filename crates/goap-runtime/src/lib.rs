//! Tick-driven backward-chaining GOAP planner and plan executor.
//!
//! Planning recursion is modeled as a persistent tree of search frames
//! advanced by a scheduler, not as native function recursion: resolvers
//! may take several ticks to answer, and many agents' searches interleave
//! within one tick. Execution mirrors the search side with per-action
//! atom walks and a reverse on-fail compensation walk.
//!
//! Stage order per tick: agents, resolvers, search, execution, atoms.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

mod exec;
mod records;
mod runtime;
mod search;

pub use runtime::{GoapRuntime, GoapRuntimeConfig, RecordCounts};
