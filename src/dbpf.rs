//! DBPF record framing
//!
//! Inside a DBPF archive a compressed record is a QFS stream preceded by a 4 byte
//! little endian length, which counts itself along with the stream.  This module only
//! handles that prefix, the heavy lifting is done by the `qfs` module.

use std::io::{Read,Write,Seek};
use crate::qfs::{self,Options};
use crate::opcode::has_magic;
use crate::{DYNERR,Error};

/// length of the record size prefix
pub const PREFIX_LEN: usize = 4;

/// true if the record looks like a framed QFS stream
pub fn is_compressed(framed: &[u8]) -> bool {
    framed.len() > PREFIX_LEN && has_magic(&framed[PREFIX_LEN..])
}

/// Compress a record and put the size prefix in front of it.
pub fn compress_slice(expanded: &[u8],opt: &Options) -> Result<Vec<u8>,Error> {
    let stream = qfs::compress_slice(expanded,opt)?;
    let total = match u32::try_from(stream.len() + PREFIX_LEN) {
        Ok(sz) => sz,
        Err(_) => return Err(Error::FileTooLarge)
    };
    let mut ans: Vec<u8> = Vec::new();
    if ans.try_reserve_exact(total as usize).is_err() {
        return Err(Error::OutOfMemory(total as usize));
    }
    ans.extend_from_slice(&u32::to_le_bytes(total));
    ans.extend_from_slice(&stream);
    Ok(ans)
}

/// Expand a framed record, the prefix bounds how much of the buffer belongs to the stream.
pub fn expand_slice(framed: &[u8],opt: &Options) -> Result<Vec<u8>,Error> {
    if framed.len() < PREFIX_LEN {
        return Err(Error::UnexpectedEnd);
    }
    let total = u32::from_le_bytes([framed[0],framed[1],framed[2],framed[3]]) as usize;
    if total < PREFIX_LEN {
        log::error!("record size {} cannot hold its own prefix",total);
        return Err(Error::FileFormatMismatch);
    }
    if total > framed.len() {
        log::error!("record claims {} bytes, only {} available",total,framed.len());
        return Err(Error::UnexpectedEnd);
    }
    qfs::expand_slice(&framed[PREFIX_LEN..total],opt)
}

/// Compress a record held in a file, see `qfs::compress`.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    qfs::transform(expanded_in,compressed_out,opt,compress_slice)
}

/// Expand a record held in a file, see `qfs::expand`.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    qfs::transform(compressed_in,expanded_out,opt,expand_slice)
}

#[test]
fn compression_works() {
    let compressed = compress_slice(b"ABABABABAB",&qfs::STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("0E00000010FB00000A16014142FC").unwrap());
    assert!(is_compressed(&compressed));
    assert!(!is_compressed(b"ABABABABAB"));
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let mut compressed = compress_slice(test_data,&qfs::FAST_OPTIONS).expect("compression failed");
    // archives pack records back to back, anything past the prefix length is not ours
    compressed.extend_from_slice(&[0x10,0xFB,0xFF]);
    let expanded = expand_slice(&compressed,&qfs::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn bad_prefix() {
    let good = hex::decode("0E00000010FB00000A16014142FC").unwrap();
    assert!(matches!(expand_slice(&good[0..3],&qfs::STD_OPTIONS),Err(Error::UnexpectedEnd)));
    assert!(matches!(expand_slice(&good[0..13],&qfs::STD_OPTIONS),Err(Error::UnexpectedEnd)));
    let mut tiny = good.clone();
    tiny[0] = 2;
    assert!(matches!(expand_slice(&tiny,&qfs::STD_OPTIONS),Err(Error::FileFormatMismatch)));
    // prefix cuts the stream short
    let mut short = good.clone();
    short[0] = 0x0C;
    assert!(matches!(expand_slice(&short,&qfs::STD_OPTIONS),Err(Error::UnexpectedEnd)));
}

#[test]
fn streams_work() {
    let mut src = std::io::Cursor::new(b"ABABABABAB".to_vec());
    let mut dst = std::io::Cursor::new(Vec::new());
    assert_eq!(compress(&mut src,&mut dst,&qfs::STD_OPTIONS).expect("compression failed"),(10,14));
    let mut src = std::io::Cursor::new(dst.into_inner());
    let mut dst = std::io::Cursor::new(Vec::new());
    assert_eq!(expand(&mut src,&mut dst,&qfs::STD_OPTIONS).expect("expansion failed"),(14,10));
    assert_eq!(dst.into_inner(),b"ABABABABAB".to_vec());
}
