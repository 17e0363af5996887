//! buildenv-lib: core logic for the buildenv bootstrapper.
//!
//! This crate drives a fixed chain of native packages (b2, boost, fftw and
//! the spectra application) through an incremental
//! fetch/configure/build/install/pack pipeline:
//! - `pipeline`: the stage machine (ordering, staleness checks, idempotent
//!   re-execution)
//! - `rules`: per-package stage implementations and the package registry
//! - `state`: the persistent on-disk store that makes repeat runs cheap
//! - `source`, `process`: source trees and logged subprocess plumbing
//! - `archive`, `deps`: distributable packaging and its fail-closed
//!   dependency gate

pub mod archive;
pub mod config;
pub mod deps;
pub mod pipeline;
pub mod process;
pub mod rules;
pub mod source;
pub mod state;
pub mod target;
