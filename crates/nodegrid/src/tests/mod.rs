//! Test suites spanning several grid components.

mod session_behaviour;
pub(crate) mod support;
mod transparency;
