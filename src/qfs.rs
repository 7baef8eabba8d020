//! QFS Compression
//!
//! This produces and consumes the RefPack streams found inside DBPF archives.
//! Encoding is greedy: at each position the longest match the format can express is taken,
//! which is the same strategy the game's own tools use.  Output is deterministic for
//! a given set of options.
//!
//! * The slice functions do the work, the stream functions are wrappers for files
//! * The expanded size in the header is authoritative, the decoder will not produce
//!   one byte more or less

use std::io::{Read,Write,Seek,SeekFrom};
use crate::opcode::{Header,Opcode,MAX_LITERAL_RUN};
use crate::tools::match_finder::MatchFinder;
use crate::{DYNERR,Error};

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// most hash chain links followed when looking for a match, `usize::MAX` for no limit
    pub max_chain: usize,
    /// record the compressed size in the header
    pub compressed_size_field: bool,
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64,
    /// return error if expanded data would be larger
    pub max_file_size: u64
}

/// Finds the longest match at every position.
pub const STD_OPTIONS: Options = Options {
    max_chain: usize::MAX,
    compressed_size_field: false,
    in_offset: 0,
    out_offset: 0,
    max_file_size: u32::MAX as u64
};

/// Gives up after 50 candidates per position, like the game's tools.
pub const FAST_OPTIONS: Options = Options {
    max_chain: 50,
    compressed_size_field: false,
    in_offset: 0,
    out_offset: 0,
    max_file_size: u32::MAX as u64
};

/// Upper bound on the compressed size of `expanded_len` bytes, header included.
pub const fn max_compressed_size(expanded_len: usize) -> usize {
    10 + expanded_len + expanded_len / MAX_LITERAL_RUN + 2
}

/// Write literal runs until fewer than 4 literals are pending.
fn flush_runs(ans: &mut Vec<u8>,expanded: &[u8],lit_start: &mut usize,end: usize) -> Result<(),Error> {
    while let Some(op) = Opcode::run(end - *lit_start) {
        log::trace!("{:?}",op);
        op.write(ans)?;
        ans.extend_from_slice(&expanded[*lit_start..*lit_start+op.literals()]);
        *lit_start += op.literals();
    }
    Ok(())
}

/// Main compression function, returns the complete stream including the header.
pub fn compress_slice(expanded: &[u8],opt: &Options) -> Result<Vec<u8>,Error> {
    let mut header = Header::new(expanded.len())?;
    if opt.compressed_size_field {
        header.set_compressed_size(0)?;
    }
    let mut ans: Vec<u8> = Vec::new();
    let capacity = max_compressed_size(expanded.len());
    if ans.try_reserve(capacity).is_err() {
        return Err(Error::OutOfMemory(capacity));
    }
    ans.extend_from_slice(&header.to_bytes());
    let mut finder = MatchFinder::new(expanded,opt.max_chain);
    let mut lit_start = 0;
    let mut cursor = 0;
    let mut copies = 0;
    while cursor < expanded.len() {
        match finder.find_best_match(cursor) {
            Some(m) => {
                flush_runs(&mut ans,expanded,&mut lit_start,cursor)?;
                let op = Opcode::copy(cursor - lit_start,m.offset,m.length)?;
                log::trace!("{:?}",op);
                op.write(&mut ans)?;
                ans.extend_from_slice(&expanded[lit_start..cursor]);
                cursor += m.length;
                lit_start = cursor;
                copies += 1;
            },
            None => cursor += 1
        }
    }
    flush_runs(&mut ans,expanded,&mut lit_start,expanded.len())?;
    let op = Opcode::StreamEnd { literals: expanded.len() - lit_start };
    log::trace!("{:?}",op);
    op.write(&mut ans)?;
    ans.extend_from_slice(&expanded[lit_start..]);
    if opt.compressed_size_field {
        let old_len = header.len();
        header.set_compressed_size(ans.len())?;
        if header.len() > old_len {
            // size fields had to be widened, which lengthens the stream
            header.set_compressed_size(ans.len() + header.len() - old_len)?;
        }
        ans.splice(0..old_len,header.to_bytes());
    }
    log::debug!("compressed {} bytes into {} using {} copies",expanded.len(),ans.len(),copies);
    Ok(ans)
}

/// Main decompression function, the header decides how many bytes come out.
pub fn expand_slice(compressed: &[u8],opt: &Options) -> Result<Vec<u8>,Error> {
    decode(compressed,None,opt)
}

/// Expand a stream that must produce exactly `expected` bytes.
pub fn expand_exact(compressed: &[u8],expected: usize) -> Result<Vec<u8>,Error> {
    decode(compressed,Some(expected),&STD_OPTIONS)
}

fn decode(compressed: &[u8],expected: Option<usize>,opt: &Options) -> Result<Vec<u8>,Error> {
    let header = Header::parse(compressed)?;
    let declared = header.expanded_size as usize;
    log::debug!("header declares {} bytes, {} byte header",declared,header.len());
    if let Some(expected) = expected {
        if expected != declared {
            log::error!("caller expects {} bytes",expected);
            return Err(Error::HeaderMismatch { expected, declared });
        }
    }
    if declared as u64 > opt.max_file_size {
        return Err(Error::FileTooLarge);
    }
    let input = match header.compressed_size {
        Some(sz) if (sz as usize) < header.len() => return Err(Error::FileFormatMismatch),
        Some(sz) if sz as usize > compressed.len() => return Err(Error::UnexpectedEnd),
        Some(sz) => &compressed[0..sz as usize],
        None => compressed
    };
    let mut ans: Vec<u8> = Vec::new();
    if ans.try_reserve_exact(declared).is_err() {
        return Err(Error::OutOfMemory(declared));
    }
    let mut ptr = header.len();
    loop {
        if ptr == input.len() {
            // the game's decoder stops when input runs out, accept that if nothing is missing
            if ans.len() == declared {
                log::warn!("stream has no terminator");
                return Ok(ans);
            }
            log::error!("input exhausted after {} of {} bytes",ans.len(),declared);
            return Err(Error::UnexpectedEnd);
        }
        let op = Opcode::parse(&input[ptr..])?;
        log::trace!("{}: {:?}",ptr,op);
        ptr += op.size();
        let lit = op.literals();
        if ptr + lit > input.len() {
            return Err(Error::UnexpectedEnd);
        }
        if ans.len() + lit > declared {
            return Err(Error::SizeMismatch { declared, produced: ans.len() + lit });
        }
        ans.extend_from_slice(&input[ptr..ptr+lit]);
        ptr += lit;
        if let Some((offset,length)) = op.copy_params() {
            if offset > ans.len() {
                log::error!("copy at input position {} reaches too far back",ptr);
                return Err(Error::BadOffset { offset, produced: ans.len() });
            }
            if ans.len() + length > declared {
                return Err(Error::SizeMismatch { declared, produced: ans.len() + length });
            }
            // byte by byte, source and destination overlap when offset < length
            let start = ans.len() - offset;
            for i in start..start+length {
                let b = ans[i];
                ans.push(b);
            }
        }
        if op.is_end() {
            if ans.len() != declared {
                return Err(Error::SizeMismatch { declared, produced: ans.len() });
            }
            if ptr < input.len() {
                log::debug!("ignoring {} bytes after terminator",input.len() - ptr);
            }
            return Ok(ans);
        }
    }
}

/// Read everything from `opt.in_offset` on, transform it, and write the result at `opt.out_offset`.
pub(crate) fn transform<R,W,F>(src: &mut R,dst: &mut W,opt: &Options,f: F) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek, F: Fn(&[u8],&Options) -> Result<Vec<u8>,Error> {
    let in_len = src.seek(SeekFrom::End(0))?;
    if opt.in_offset > in_len {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    src.seek(SeekFrom::Start(opt.in_offset))?;
    let mut ibuf = Vec::new();
    src.read_to_end(&mut ibuf)?;
    let obuf = f(&ibuf,opt)?;
    dst.seek(SeekFrom::Start(opt.out_offset))?;
    dst.write_all(&obuf)?;
    dst.flush()?;
    Ok((ibuf.len() as u64,obuf.len() as u64))
}

/// Compression function for files.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    transform(expanded_in,compressed_out,opt,compress_slice)
}

/// Expansion function for files, see `compress`.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    transform(compressed_in,expanded_out,opt,expand_slice)
}

#[test]
fn compression_works() {
    let compressed = compress_slice(b"ABABABABAB",&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("10FB00000A16014142FC").unwrap());

    let compressed = compress_slice(&[],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("10FB000000FC").unwrap());

    let compressed = compress_slice(&[b'a';1000],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("10FB0003E8CD0000E261FC").unwrap());

    let compressed = compress_slice(b"abcdefghij",&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("10FB00000AE16162636465666768FE696A").unwrap());

    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let qfs_str = "10 FB 00 00 31 E1 49 20 61 6D 20 53 61 6D 05 04 2E 05 0D 20 01 05 2E E3 64 6F 20 6E 6F 74 20 6C 69 6B 65 20 74 68 69 73 1C 1C FD 0A";
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode(qfs_str.replace(" ","")).unwrap());
}

#[test]
fn compression_works_with_size_field() {
    let mut opt = STD_OPTIONS;
    opt.compressed_size_field = true;
    let compressed = compress_slice(b"ABABABABAB",&opt).expect("compression failed");
    assert_eq!(compressed,hex::decode("11FB00000D00000A16014142FC").unwrap());
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded,b"ABABABABAB".to_vec());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < test_data.len());
    let expanded = expand_exact(&compressed,test_data.len()).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    for test_data in [vec![],vec![7],vec![1,2],b"ABABABABAB".to_vec(),vec![0;1000]] {
        let compressed = compress_slice(&test_data,&FAST_OPTIONS).expect("compression failed");
        let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
        assert_eq!(test_data,expanded);
    }
}

#[test]
fn invertibility_past_window() {
    // pseudo random blocks separated by runs, several times longer than the window
    let mut state: u32 = 12345;
    let mut block = Vec::new();
    for _i in 0..8000 {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        block.push((state >> 16) as u8);
    }
    let mut test_data = Vec::new();
    for rep in 0..40 {
        test_data.extend_from_slice(&block[rep*50..]);
        test_data.extend(std::iter::repeat(rep as u8).take(rep*100));
    }
    assert!(test_data.len() > 2 * crate::opcode::MAX_OFFSET);
    for opt in [&STD_OPTIONS,&FAST_OPTIONS] {
        let compressed = compress_slice(&test_data,opt).expect("compression failed");
        assert!(compressed.len() < test_data.len() / 4);
        let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
        assert_eq!(test_data,expanded);
    }
}

#[test]
fn literal_only() {
    let test_data: Vec<u8> = (0..=255).collect();
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let mut ptr = 5;
    let mut ops = Vec::new();
    while ptr < compressed.len() {
        let op = Opcode::parse(&compressed[ptr..]).expect("parse failed");
        ptr += op.size() + op.literals();
        ops.push(op);
    }
    assert_eq!(ops,vec![
        Opcode::LiteralRun { literals: 112 },
        Opcode::LiteralRun { literals: 112 },
        Opcode::LiteralRun { literals: 32 },
        Opcode::StreamEnd { literals: 0 }
    ]);
    assert_eq!(expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed"),test_data);
}

#[test]
fn declared_size_enforced() {
    let good = hex::decode("10FB00000A16014142FC").unwrap();
    let mut bigger = good.clone();
    bigger[4] = 0x0B;
    assert!(matches!(expand_slice(&bigger,&STD_OPTIONS),Err(Error::SizeMismatch { declared: 11, produced: 10 })));
    let mut smaller = good.clone();
    smaller[4] = 0x09;
    assert!(matches!(expand_slice(&smaller,&STD_OPTIONS),Err(Error::SizeMismatch { declared: 9, .. })));
    assert!(matches!(expand_exact(&good,11),Err(Error::HeaderMismatch { expected: 11, declared: 10 })));
    let mut opt = STD_OPTIONS;
    opt.max_file_size = 9;
    assert!(matches!(expand_slice(&good,&opt),Err(Error::FileTooLarge)));
}

#[test]
fn bad_offset_rejected() {
    // one literal, then a copy reaching 2 bytes back
    let crafted = hex::decode("10FB0000040101 78 FC".replace(" ","")).unwrap();
    assert!(matches!(expand_slice(&crafted,&STD_OPTIONS),Err(Error::BadOffset { offset: 2, produced: 1 })));
    // copy before anything was produced
    let crafted = hex::decode("10FB00000300 00 FC".replace(" ","")).unwrap();
    assert!(matches!(expand_slice(&crafted,&STD_OPTIONS),Err(Error::BadOffset { offset: 1, produced: 0 })));
}

#[test]
fn truncation_rejected() {
    let good = hex::decode("10FB00000A16014142FC").unwrap();
    for end in 5..good.len()-1 {
        assert!(matches!(expand_slice(&good[0..end],&STD_OPTIONS),Err(Error::UnexpectedEnd)),"cut at {}",end);
    }
    assert!(matches!(expand_slice(&good[0..3],&STD_OPTIONS),Err(Error::UnexpectedEnd)));
    assert!(matches!(expand_slice(&[0x00,0x01,0x02],&STD_OPTIONS),Err(Error::FileFormatMismatch)));
    // compressed size field claims more than is there
    let sized = hex::decode("11FB00000E00000A16014142FC").unwrap();
    assert!(matches!(expand_slice(&sized,&STD_OPTIONS),Err(Error::UnexpectedEnd)));
}

#[test]
fn missing_terminator_tolerated() {
    let good = hex::decode("10FB00000A16014142").unwrap();
    assert_eq!(expand_slice(&good,&STD_OPTIONS).expect("expansion failed"),b"ABABABABAB".to_vec());
    let trailing = hex::decode("10FB00000A16014142FC0000").unwrap();
    assert_eq!(expand_slice(&trailing,&STD_OPTIONS).expect("expansion failed"),b"ABABABABAB".to_vec());
}

#[test]
fn streams_honor_offsets() {
    let mut opt = STD_OPTIONS;
    opt.in_offset = 3;
    opt.out_offset = 2;
    let mut src = std::io::Cursor::new(b"xyzABABABABAB".to_vec());
    let mut dst = std::io::Cursor::new(vec![0xee,0xee]);
    let (in_size,out_size) = compress(&mut src,&mut dst,&opt).expect("compression failed");
    assert_eq!((in_size,out_size),(10,10));
    assert_eq!(dst.into_inner(),hex::decode("EEEE10FB00000A16014142FC").unwrap());

    opt.in_offset = 20;
    let mut src = std::io::Cursor::new(b"xyz".to_vec());
    let mut dst = std::io::Cursor::new(Vec::new());
    assert!(expand(&mut src,&mut dst,&opt).is_err());
}
