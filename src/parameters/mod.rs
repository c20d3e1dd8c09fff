//! Specification of the fitted parameters and their mapping onto the single
//! vector the optimizers work on.
//!
//! Each dataset carries a [ParameterSet]. A parameter is either free (fitted
//! per dataset), shared (fitted once for all datasets that share it) or fixed.
//! The [ParameterLayout] turns the sets into the starting vector, its bounds
//! and the slot mapping used to [pack](ParameterLayout::pack) a vector back
//! into [PhysicalParameters](crate::model::PhysicalParameters) for each
//! dataset.
//!
//! The relaxation rates of the excited states fall back to the ground state
//! rates: `R1b` and `R1c` take the value of `R1` and `R2b` and `R2c` the value
//! of `R2`, unless they are given a nonzero fixed value or are fitted.
mod error;
mod grid;
mod layout;
mod name;
mod spec;


pub use error::{KeywordError, SetupError};
pub use grid::BruteGrid;
pub use layout::{ParameterLayout, Slot, VectorEntry};
pub use name::ParameterName;
pub use spec::{ParameterSet, ParameterSpec, Role, Sweep, SweepScale};
