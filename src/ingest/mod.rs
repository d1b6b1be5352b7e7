mod write_coordinator;
pub use write_coordinator::*;
