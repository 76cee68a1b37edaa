//! The `tracekin_core` crate simulates the time evolution of a
//! labeled/unlabeled ligand pair through a multi-compartment physiological
//! model, driven by a dosing schedule.
//!
//! Key components:
//! - **Compartment model**: classes, named offsets, and the structural body
//!   description ([`compartment`]), indexed by the [`registry`].
//! - **Assembly**: the dense linear transition matrix and the initial state
//!   vector ([`assembly`]).
//! - **Binding**: the saturable receptor-binding corrector ([`binding`])
//!   feeding the two right-hand-side strategies in [`rhs`].
//! - **Dosing**: injection profiles and the event state machine ([`dosing`]).
//! - **Integrators**: an adaptive embedded Runge-Kutta-Fehlberg scheme
//!   ([`adaptive`]) and a stiff BDF delegate ([`stiff`]), both producing a
//!   [`trajectory::SimulationResult`].

pub mod adaptive;
pub mod assembly;
pub mod binding;
pub mod compartment;
pub mod dosing;
pub mod error;
pub mod reference;
pub mod registry;
pub mod rhs;
pub mod stiff;
pub mod traits;
pub mod trajectory;
