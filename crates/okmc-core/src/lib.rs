//! # OKMC Core Library
//!
//! An object kinetic Monte Carlo engine for the long-timescale evolution of radiation-induced
//! point and extended defects in crystalline solids. Every defect is a discrete object that can
//! migrate, emit point defects, rotate, transform, or recombine with its neighbours, and the
//! simulation advances by committing one rate-weighted transition at a time.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless building blocks: the periodic simulation box, the
//!   defect state value, the [`core::model::PhysicalModel`] capability trait, the linked-cell
//!   grid, trap fields, descriptor and step/time I/O, and a reference model for bcc tungsten.
//!
//! - **[`engine`]: The Logic Core.** The stateful event loop. `DefectSystem` keeps the ensemble,
//!   the spatial index, the rate table, and the interaction-energy cache consistent through a
//!   small set of atomic mutations, and `KineticEngine` drives residence-time event selection on
//!   top of it.
//!
//! - **[`workflows`]: The Public API.** Complete annealing procedures (individual cascades and
//!   cumulative multi-cascade loading) built from the engine and core layers.

pub mod core;
pub mod engine;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testing;
