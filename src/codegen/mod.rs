//! Code-Generation Pipeline (spec component O): gap analysis → YAML+code
//! synthesis → sandboxed self-test → registration.

pub mod gap;
pub mod generator;
pub mod registration;
pub mod sandbox;

pub use gap::{GapAnalysis, GapAnalyzer, Language};
pub use generator::{GeneratedNode, Generator};
pub use registration::{RegistrationError, RegistrationService};
pub use sandbox::ReferenceSandbox;
