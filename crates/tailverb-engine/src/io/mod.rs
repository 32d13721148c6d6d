pub mod decoded;
pub mod reader;
pub mod source;
pub mod wav;
pub mod writer;

pub use reader::{AudioReader, Blocks};
pub use source::{FrameSource, MemorySource};
pub use writer::{AudioWriter, FrameSink, MemorySink};
