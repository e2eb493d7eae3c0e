pub mod normalize;
pub mod partition;
pub mod reader;

pub use normalize::RecordNormalizer;
pub use partition::{PartitionFile, PartitionWriter};
pub use reader::read_csv;
