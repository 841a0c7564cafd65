//! Configuration types
//!
//! Compile-time address map of the reserved page and the runtime wait
//! policies of the driver.

pub mod driver;
pub mod layout;

pub use driver::*;
pub use layout::*;
