//! Fragmentation and chunking (§4.3, §4.4): splits argument byte streams into
//! checksummed, length-chunked fragments for the wire, and reassembles them on
//! the other end.

pub mod reader;
pub mod writer;

pub use reader::FragmentReader;
pub use writer::{EmittedFragment, FragmentWriter};
