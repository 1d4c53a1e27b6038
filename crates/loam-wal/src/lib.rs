//! Write-ahead log for LoamDB.
//!
//! Every page write is appended to the log as a PUT frame before it reaches
//! the data file; a COMMIT frame followed by fsync is the sole durability
//! boundary. Opening the log replays it, making crash recovery a scan.

mod frame;
mod log;

pub use frame::{Frame, FrameType, FRAME_TYPE_SIZE};
pub use log::Wal;
