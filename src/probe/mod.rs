pub mod correlate;
pub mod prober;
pub mod socket;
pub mod udp;

pub use correlate::*;
pub use prober::*;
pub use socket::*;
pub use udp::*;
