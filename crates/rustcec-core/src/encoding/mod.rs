/// Zero-copy byte reader for decoding CEC frames.
pub mod reader;
/// Byte writer for encoding CEC frames into a caller-owned buffer.
pub mod writer;
