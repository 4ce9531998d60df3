//! Sparse binary feature representations with incremental feature
//! dependency discovery (iFDD).
//!
//! The crate is organised leaf first:
//!
//! - [`feature`] - feature ids, base sets and the feature catalogue
//! - [`discretization`] - the grid that maps continuous states to base
//!   features
//! - [`relevance`] - per-candidate TD error bookkeeping
//! - [`ifdd`] - the discovery engine and its configuration
//! - [`value_function`] - linear value functions whose weights grow with
//!   the catalogue
//! - [`representation`] - the interface a learner uses, with tabular,
//!   independent and iFDD implementations
//! - [`snapshot`] - serializable catalogue and weight state
//!
//! Nothing in this crate installs a `tracing` subscriber; discovery events
//! are emitted at `debug` and `trace` level for the embedding application to
//! collect.

pub use self::error::*;

pub mod discretization;
pub mod error;
pub mod feature;
pub mod ifdd;
pub mod relevance;
pub mod representation;
pub mod snapshot;
pub mod value_function;
