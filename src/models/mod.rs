pub mod regimen;

pub use regimen::*;
