pub mod csv;
pub mod dot;
pub mod json;
pub mod report;

pub use csv::*;
pub use dot::*;
pub use json::*;
pub use report::*;
