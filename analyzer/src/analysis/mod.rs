//! Checks that produce errors and warnings rather than optimization facts

pub mod uninitialized;
pub mod validation;

pub use uninitialized::UninitializedWarning;
pub use validation::RequiredSwitch;
