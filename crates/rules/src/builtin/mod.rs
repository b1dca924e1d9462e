//! Built-in rule modules.
//!
//! Each module exposes a `rules()` factory returning its rule instances;
//! [`crate::discovery`] lists the modules and registers what they return.

pub mod macro_control;
pub mod nocturnal;
pub mod variability;

mod stats;
