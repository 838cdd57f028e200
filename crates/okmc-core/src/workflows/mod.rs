//! # Workflows Module
//!
//! High-level annealing procedures built from the engine and core layers.
//!
//! ## Overview
//!
//! Workflows are the entry points most users need. Each one takes a physical model, an engine
//! configuration and a library of cascades, drives one or more [`KineticEngine`] runs to their
//! bounds, and reports progress and scheduled snapshots along the way.
//!
//! - **Individual annealing** ([`anneal::anneal_individual`]) anneals every cascade on its own
//!   in a fresh engine.
//! - **Cumulative annealing** ([`anneal::anneal_cumulative`]) keeps one engine and implants a
//!   randomly chosen cascade at a random offset before each new stage, modelling the build-up of
//!   damage under continued irradiation.
//!
//! [`KineticEngine`]: crate::engine::kinetic::KineticEngine

pub mod anneal;
