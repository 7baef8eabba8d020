//! # QFS Compressor
//!
//! Compression and expansion of QFS (also known as RefPack), the LZ77 scheme
//! used to pack records inside DBPF game archives, along with the checksum the
//! game uses to guard its records.
//!
//! * `qfs` has the encoder and decoder working on raw QFS streams
//! * `dbpf` adds the 4 byte length prefix that archive records carry
//! * `opcode` describes the wire format, it can be used to walk a stream by hand
//! * `crc` has the checksum
//!
//! The functions at the crate root are thin wrappers that take an explicit length
//! along with the buffer, for callers that hand us raw memory.

mod tools;
pub mod crc;
pub mod opcode;
pub mod qfs;
pub mod dbpf;

pub use tools::match_finder::{find_best_match,Match};

type DYNERR = Box<dyn std::error::Error>;

/// Codec Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("compressed stream ended unexpectedly")]
    UnexpectedEnd,
    #[error("back reference {offset} reaches behind the {produced} bytes produced so far")]
    BadOffset { offset: usize, produced: usize },
    #[error("header declares {declared} bytes but stream produces {produced}")]
    SizeMismatch { declared: usize, produced: usize },
    #[error("expected {expected} bytes but header declares {declared}")]
    HeaderMismatch { expected: usize, declared: usize },
    #[error("opcode fields out of range: {0:?}")]
    BadOpcode(opcode::Opcode),
    #[error("could not allocate {0} bytes")]
    OutOfMemory(usize),
    #[error("file too large")]
    FileTooLarge,
    #[error("length {length} exceeds buffer of {available} bytes")]
    LengthOutOfBounds { length: usize, available: usize }
}

impl Error {
    /// true if the error was caused by a malformed or truncated stream
    pub fn is_format_error(&self) -> bool {
        matches!(self,
            Error::FileFormatMismatch |
            Error::UnexpectedEnd |
            Error::BadOffset {..} |
            Error::SizeMismatch {..} |
            Error::HeaderMismatch {..} |
            Error::BadOpcode(_))
    }
}

fn bounded(buf: &[u8],length: usize) -> Result<&[u8],Error> {
    match buf.get(0..length) {
        Some(slice) => Ok(slice),
        None => Err(Error::LengthOutOfBounds { length, available: buf.len() })
    }
}

/// Compress the first `input_length` bytes of `input` into a QFS stream.
/// The length of the returned buffer is the compressed size.
pub fn compress(input: &[u8],input_length: usize) -> Result<Vec<u8>,Error> {
    qfs::compress_slice(bounded(input,input_length)?,&qfs::STD_OPTIONS)
}

/// Expand a QFS stream, reading no more than `compressed_length` bytes of `input`.
/// The length of the returned buffer is the size declared in the stream header.
pub fn decompress(input: &[u8],compressed_length: usize) -> Result<Vec<u8>,Error> {
    qfs::expand_slice(bounded(input,compressed_length)?,&qfs::STD_OPTIONS)
}

/// Checksum of the first `length` bytes of `input`, a longer `length` is clamped to the buffer.
pub fn checksum(input: &[u8],length: usize) -> u32 {
    crc::checksum(&input[0..usize::min(length,input.len())])
}

#[test]
fn boundary_lengths() {
    let data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress(data,data.len()).expect("compression failed");
    assert_eq!(decompress(&compressed,compressed.len()).expect("expansion failed"),data.to_vec());
    // bytes past `compressed_length` are never looked at
    let mut padded = compressed.clone();
    padded.extend_from_slice(&[0xAA;16]);
    assert_eq!(decompress(&padded,compressed.len()).expect("expansion failed"),data.to_vec());
    // only the requested prefix is compressed
    let compressed = compress(data,9).expect("compression failed");
    assert_eq!(decompress(&compressed,compressed.len()).expect("expansion failed"),data[0..9].to_vec());
}

#[test]
fn boundary_errors() {
    let data = [1,2,3];
    assert!(matches!(compress(&data,4),Err(Error::LengthOutOfBounds { length: 4, available: 3 })));
    assert!(matches!(decompress(&data,10),Err(Error::LengthOutOfBounds { .. })));
    let compressed = compress(&data,3).expect("compression failed");
    let err = decompress(&compressed,compressed.len()-2).unwrap_err();
    assert!(err.is_format_error());
    assert!(!Error::OutOfMemory(1).is_format_error());
}

#[test]
fn boundary_checksum() {
    let data = b"123456789abc";
    assert_eq!(checksum(data,9),0x0376E6E7);
    assert_eq!(checksum(data,100),crc::checksum(data));
    assert_eq!(checksum(data,0),0xFFFFFFFF);
}
