//! Background workers answering interval requests for one track (or a pair of
//! tracks) in FIFO order.

mod coverage_thread;
mod mapping_thread;
mod request_thread;

pub use coverage_thread::CoverageThread;
pub use mapping_thread::{MappingThread, MappingThreadAnalyses};
pub use request_thread::{LatestRequest, RequestHandler, RequestThread};
