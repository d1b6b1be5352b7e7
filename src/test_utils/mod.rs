//! the test_utils folder here shares fakes and builders between the unit
//! tests of different modules
mod mem_store;
mod samples;

pub use mem_store::*;
pub use samples::*;
