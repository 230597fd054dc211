//! Umbrella crate that re-exports the `goap-*` building blocks.
//!
//! Intended as the convenient entrypoint for users: `goap::core` for the
//! data model and authoring contracts, `goap::runtime` for the engine,
//! `goap::tools` for tracing.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

#[cfg(feature = "core")]
#[cfg_attr(docsrs, doc(cfg(feature = "core")))]
pub use goap_core as core;

#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
pub use goap_runtime as runtime;

#[cfg(feature = "tools")]
#[cfg_attr(docsrs, doc(cfg(feature = "tools")))]
pub use goap_tools as tools;
