pub mod tor;

// Re-export common functions and types
pub use tor::{check_circuit, probe_endpoint, TorCheck};
