pub mod report;
pub mod session;

pub use report::*;
pub use session::*;
