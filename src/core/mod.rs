pub mod batch;
pub mod progress;
pub mod reroot;
pub mod transfer;
pub mod tree;

pub use batch::{transfer_batch, BatchSummary, TransferPair, TransferResult};
pub use progress::{CountingReader, Progress, ProgressSnapshot};
pub use reroot::{clean, relative, reroot};
pub use transfer::{transfer_file, Direction, TransferOptions, DEFAULT_BUFFER_SIZE};
pub use tree::{mirror_tree, MirrorOptions, TreeReport};
