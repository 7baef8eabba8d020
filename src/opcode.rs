//! QFS Wire Format
//!
//! A QFS stream is a short header followed by a sequence of opcodes.
//! The header is a flags byte, the tag `0xFB`, and one or two big endian size fields.
//! Each opcode is one to four control bytes, followed by up to 112 literal bytes
//! that are copied as is.  Copy opcodes then repeat bytes that are already in the output.
//!
//! The class of an opcode is decided by the leading bits of its first byte:
//!
//! | first byte    | opcode       | control bytes | literals | length  | offset     |
//! |---------------|--------------|---------------|----------|---------|------------|
//! | `0xxxxxxx`    | `ShortCopy`  | 2             | 0..=3    | 3..=10  | 1..=1024   |
//! | `10xxxxxx`    | `MediumCopy` | 3             | 0..=3    | 4..=67  | 1..=16384  |
//! | `110xxxxx`    | `LongCopy`   | 4             | 0..=3    | 5..=1028| 1..=131072 |
//! | `0xE0..=0xFB` | `LiteralRun` | 1             | 4..=112  |         |            |
//! | `0xFC..=0xFF` | `StreamEnd`  | 1             | 0..=3    |         |            |
//!
//! Parsing produces an `Opcode` value before anything is copied, so the bit layout
//! lives here and nowhere else.

use crate::Error;

/// second byte of every stream
pub const TAG: u8 = 0xFB;
/// always set in the flags byte
pub const FLAG_BASE: u8 = 0x10;
/// size fields are 4 bytes rather than 3
pub const FLAG_LARGE: u8 = 0x80;
/// a compressed size field precedes the expanded size
pub const FLAG_COMPRESSED_SIZE: u8 = 0x01;

/// shortest match any copy can express
pub const MIN_MATCH: usize = 3;
/// longest match any copy can express
pub const MAX_MATCH: usize = 1028;
/// farthest back any copy can reach
pub const MAX_OFFSET: usize = 131072;
/// most literals a single `LiteralRun` can carry
pub const MAX_LITERAL_RUN: usize = 112;
/// most literals a copy or `StreamEnd` can carry
pub const MAX_TAIL_LITERALS: usize = 3;

const MAX_SMALL_SIZE: u64 = 0xFFFFFF;

/// Stream header
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Header {
    /// size fields take 4 bytes
    pub large: bool,
    /// total length of the stream including this header, if recorded
    pub compressed_size: Option<u32>,
    /// exact length of the expanded data
    pub expanded_size: u32
}

impl Header {
    /// Header for a stream that expands to `expanded_size` bytes.
    pub fn new(expanded_size: usize) -> Result<Self,Error> {
        let expanded_size = match u32::try_from(expanded_size) {
            Ok(sz) => sz,
            Err(_) => return Err(Error::FileTooLarge)
        };
        Ok(Self {
            large: expanded_size as u64 > MAX_SMALL_SIZE,
            compressed_size: None,
            expanded_size
        })
    }
    /// Record the compressed size, switching to wide fields if it does not fit otherwise.
    pub fn set_compressed_size(&mut self,compressed_size: usize) -> Result<(),Error> {
        let compressed_size = match u32::try_from(compressed_size) {
            Ok(sz) => sz,
            Err(_) => return Err(Error::FileTooLarge)
        };
        if compressed_size as u64 > MAX_SMALL_SIZE {
            self.large = true;
        }
        self.compressed_size = Some(compressed_size);
        Ok(())
    }
    fn width(&self) -> usize {
        match self.large {
            true => 4,
            false => 3
        }
    }
    /// length of the header in bytes
    pub fn len(&self) -> usize {
        match self.compressed_size {
            Some(_) => 2 + 2*self.width(),
            None => 2 + self.width()
        }
    }
    fn flags(&self) -> u8 {
        let mut flags = FLAG_BASE;
        if self.large {
            flags |= FLAG_LARGE;
        }
        if self.compressed_size.is_some() {
            flags |= FLAG_COMPRESSED_SIZE;
        }
        flags
    }
    /// Parse the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self,Error> {
        if !has_magic(buf) {
            return Err(Error::FileFormatMismatch);
        }
        let large = buf[0] & FLAG_LARGE > 0;
        let width = match large {
            true => 4,
            false => 3
        };
        let read_size = |pos: usize| -> Result<u32,Error> {
            match buf.get(pos..pos+width) {
                Some(field) => Ok(field.iter().fold(0,|acc,b| (acc << 8) | *b as u32)),
                None => Err(Error::UnexpectedEnd)
            }
        };
        match buf[0] & FLAG_COMPRESSED_SIZE > 0 {
            true => Ok(Self {
                large,
                compressed_size: Some(read_size(2)?),
                expanded_size: read_size(2+width)?
            }),
            false => Ok(Self {
                large,
                compressed_size: None,
                expanded_size: read_size(2)?
            })
        }
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut ans = vec![self.flags(),TAG];
        let skip = 4 - self.width();
        if let Some(sz) = self.compressed_size {
            ans.extend_from_slice(&u32::to_be_bytes(sz)[skip..]);
        }
        ans.extend_from_slice(&u32::to_be_bytes(self.expanded_size)[skip..]);
        ans
    }
}

/// true if `buf` starts with a plausible QFS flags byte and tag
pub fn has_magic(buf: &[u8]) -> bool {
    match buf {
        [flags,tag,..] => *tag==TAG && flags & !(FLAG_LARGE | FLAG_COMPRESSED_SIZE) == FLAG_BASE,
        _ => false
    }
}

/// One instruction in the stream.
/// `literals` bytes follow the control bytes and go to the output first,
/// then the copy (if any) repeats `length` bytes starting `offset` bytes back.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Opcode {
    ShortCopy { literals: usize, length: usize, offset: usize },
    MediumCopy { literals: usize, length: usize, offset: usize },
    LongCopy { literals: usize, length: usize, offset: usize },
    LiteralRun { literals: usize },
    StreamEnd { literals: usize }
}

impl Opcode {
    /// Smallest copy opcode that can express the match, which is also the
    /// only kind worth emitting, since every class is shorter than the bytes it stands for.
    pub fn copy(literals: usize,offset: usize,length: usize) -> Result<Self,Error> {
        for op in [
            Opcode::ShortCopy { literals, length, offset },
            Opcode::MediumCopy { literals, length, offset },
            Opcode::LongCopy { literals, length, offset }
        ] {
            if op.is_valid() {
                return Ok(op);
            }
        }
        Err(Error::BadOpcode(Opcode::LongCopy { literals, length, offset }))
    }
    /// Literal run carrying as many of `pending` literals as one opcode can,
    /// or None if fewer than 4 are pending.
    pub fn run(pending: usize) -> Option<Self> {
        match pending {
            0..=3 => None,
            _ => Some(Opcode::LiteralRun { literals: usize::min(pending & !3,MAX_LITERAL_RUN) })
        }
    }
    fn is_valid(&self) -> bool {
        match *self {
            Opcode::ShortCopy { literals, length, offset } =>
                literals <= MAX_TAIL_LITERALS && (3..=10).contains(&length) && (1..=1024).contains(&offset),
            Opcode::MediumCopy { literals, length, offset } =>
                literals <= MAX_TAIL_LITERALS && (4..=67).contains(&length) && (1..=16384).contains(&offset),
            Opcode::LongCopy { literals, length, offset } =>
                literals <= MAX_TAIL_LITERALS && (5..=MAX_MATCH).contains(&length) && (1..=MAX_OFFSET).contains(&offset),
            Opcode::LiteralRun { literals } =>
                (4..=MAX_LITERAL_RUN).contains(&literals) && literals % 4 == 0,
            Opcode::StreamEnd { literals } => literals <= MAX_TAIL_LITERALS
        }
    }
    /// number of control bytes
    pub fn size(&self) -> usize {
        match self {
            Opcode::ShortCopy {..} => 2,
            Opcode::MediumCopy {..} => 3,
            Opcode::LongCopy {..} => 4,
            Opcode::LiteralRun {..} | Opcode::StreamEnd {..} => 1
        }
    }
    /// number of literal bytes following the control bytes
    pub fn literals(&self) -> usize {
        match *self {
            Opcode::ShortCopy { literals, .. } |
            Opcode::MediumCopy { literals, .. } |
            Opcode::LongCopy { literals, .. } |
            Opcode::LiteralRun { literals } |
            Opcode::StreamEnd { literals } => literals
        }
    }
    /// (offset,length) of the copy, if this opcode has one
    pub fn copy_params(&self) -> Option<(usize,usize)> {
        match *self {
            Opcode::ShortCopy { offset, length, .. } |
            Opcode::MediumCopy { offset, length, .. } |
            Opcode::LongCopy { offset, length, .. } => Some((offset,length)),
            _ => None
        }
    }
    pub fn is_end(&self) -> bool {
        matches!(self,Opcode::StreamEnd {..})
    }
    /// Parse the opcode at the start of `buf`, the literals are not consumed.
    pub fn parse(buf: &[u8]) -> Result<Self,Error> {
        let code = match buf.first() {
            Some(c) => *c as usize,
            None => return Err(Error::UnexpectedEnd)
        };
        let need = match code {
            0x00..=0x7f => 2,
            0x80..=0xbf => 3,
            0xc0..=0xdf => 4,
            _ => 1
        };
        if buf.len() < need {
            return Err(Error::UnexpectedEnd);
        }
        let b = |i: usize| buf[i] as usize;
        Ok(match code {
            0x00..=0x7f => Opcode::ShortCopy {
                literals: code & 0x03,
                length: ((code & 0x1c) >> 2) + 3,
                offset: ((code & 0x60) << 3) + b(1) + 1
            },
            0x80..=0xbf => Opcode::MediumCopy {
                literals: b(1) >> 6,
                length: (code & 0x3f) + 4,
                offset: ((b(1) & 0x3f) << 8) + b(2) + 1
            },
            0xc0..=0xdf => Opcode::LongCopy {
                literals: code & 0x03,
                length: ((code & 0x0c) << 6) + b(3) + 5,
                offset: ((code & 0x10) << 12) + (b(1) << 8) + b(2) + 1
            },
            0xe0..=0xfb => Opcode::LiteralRun {
                literals: ((code & 0x1f) + 1) * 4
            },
            _ => Opcode::StreamEnd {
                literals: code & 0x03
            }
        })
    }
    /// Append the control bytes to `out`.
    pub fn write(&self,out: &mut Vec<u8>) -> Result<(),Error> {
        if !self.is_valid() {
            return Err(Error::BadOpcode(*self));
        }
        match *self {
            Opcode::ShortCopy { literals, length, offset } => {
                let d = offset - 1;
                out.push((((d >> 8) << 5) | ((length - 3) << 2) | literals) as u8);
                out.push((d & 0xff) as u8);
            },
            Opcode::MediumCopy { literals, length, offset } => {
                let d = offset - 1;
                out.push((0x80 | (length - 4)) as u8);
                out.push(((literals << 6) | (d >> 8)) as u8);
                out.push((d & 0xff) as u8);
            },
            Opcode::LongCopy { literals, length, offset } => {
                let d = offset - 1;
                let l = length - 5;
                out.push((0xc0 | ((d >> 16) << 4) | ((l >> 8) << 2) | literals) as u8);
                out.push(((d >> 8) & 0xff) as u8);
                out.push((d & 0xff) as u8);
                out.push((l & 0xff) as u8);
            },
            Opcode::LiteralRun { literals } => out.push((0xe0 | (literals / 4 - 1)) as u8),
            Opcode::StreamEnd { literals } => out.push((0xfc | literals) as u8)
        }
        Ok(())
    }
}

#[test]
fn header_forms() {
    let hdr = Header::new(10).unwrap();
    assert_eq!(hdr.to_bytes(),hex::decode("10FB00000A").unwrap());
    assert_eq!(Header::parse(&hdr.to_bytes()).unwrap(),hdr);
    assert_eq!(hdr.len(),5);

    let hdr = Header::new(0x1234567).unwrap();
    assert!(hdr.large);
    assert_eq!(hdr.to_bytes(),hex::decode("90FB01234567").unwrap());
    assert_eq!(Header::parse(&hdr.to_bytes()).unwrap(),hdr);

    let mut hdr = Header::new(0x123).unwrap();
    hdr.set_compressed_size(0x45).unwrap();
    assert_eq!(hdr.to_bytes(),hex::decode("11FB000045000123").unwrap());
    assert_eq!(Header::parse(&hdr.to_bytes()).unwrap(),hdr);
    assert_eq!(hdr.len(),8);
}

#[test]
fn header_rejects() {
    assert!(matches!(Header::parse(&[]),Err(Error::FileFormatMismatch)));
    assert!(matches!(Header::parse(&[0x10]),Err(Error::FileFormatMismatch)));
    assert!(matches!(Header::parse(&[0x10,0xFC,0,0,1]),Err(Error::FileFormatMismatch)));
    assert!(matches!(Header::parse(&[0x12,0xFB,0,0,1]),Err(Error::FileFormatMismatch)));
    assert!(matches!(Header::parse(&[0x10,0xFB,0,0]),Err(Error::UnexpectedEnd)));
    assert!(matches!(Header::parse(&[0x11,0xFB,0,0,9,0]),Err(Error::UnexpectedEnd)));
}

#[test]
fn classification() {
    assert_eq!(Opcode::parse(&[0x16,0x01]).unwrap(),Opcode::ShortCopy { literals: 2, length: 8, offset: 2 });
    assert_eq!(Opcode::parse(&[0x7f,0xff]).unwrap(),Opcode::ShortCopy { literals: 3, length: 10, offset: 1024 });
    assert_eq!(Opcode::parse(&[0xbf,0xff,0xff]).unwrap(),Opcode::MediumCopy { literals: 3, length: 67, offset: 16384 });
    assert_eq!(Opcode::parse(&[0xdf,0xff,0xff,0xff]).unwrap(),Opcode::LongCopy { literals: 3, length: 1028, offset: 131072 });
    assert_eq!(Opcode::parse(&[0xcd,0x00,0x00,0xe2]).unwrap(),Opcode::LongCopy { literals: 1, length: 999, offset: 1 });
    assert_eq!(Opcode::parse(&[0xe0]).unwrap(),Opcode::LiteralRun { literals: 4 });
    assert_eq!(Opcode::parse(&[0xfb]).unwrap(),Opcode::LiteralRun { literals: 112 });
    assert_eq!(Opcode::parse(&[0xfc]).unwrap(),Opcode::StreamEnd { literals: 0 });
    assert_eq!(Opcode::parse(&[0xff]).unwrap(),Opcode::StreamEnd { literals: 3 });
    assert!(matches!(Opcode::parse(&[]),Err(Error::UnexpectedEnd)));
    assert!(matches!(Opcode::parse(&[0x80,0x00]),Err(Error::UnexpectedEnd)));
    assert!(matches!(Opcode::parse(&[0xc0,0x00,0x00]),Err(Error::UnexpectedEnd)));
}

#[test]
fn write_then_parse_extremes() {
    let ops = [
        Opcode::ShortCopy { literals: 0, length: 3, offset: 1 },
        Opcode::ShortCopy { literals: 3, length: 10, offset: 1024 },
        Opcode::MediumCopy { literals: 1, length: 4, offset: 1 },
        Opcode::MediumCopy { literals: 2, length: 67, offset: 16384 },
        Opcode::LongCopy { literals: 0, length: 5, offset: 1 },
        Opcode::LongCopy { literals: 3, length: 1028, offset: 131072 },
        Opcode::LiteralRun { literals: 112 },
        Opcode::StreamEnd { literals: 2 }
    ];
    for op in ops {
        let mut buf = Vec::new();
        op.write(&mut buf).expect("write failed");
        assert_eq!(buf.len(),op.size());
        assert_eq!(Opcode::parse(&buf).unwrap(),op);
    }
}

#[test]
fn class_selection() {
    assert!(matches!(Opcode::copy(0,1024,10),Ok(Opcode::ShortCopy {..})));
    assert!(matches!(Opcode::copy(0,1025,4),Ok(Opcode::MediumCopy {..})));
    assert!(matches!(Opcode::copy(0,8,11),Ok(Opcode::MediumCopy {..})));
    assert!(matches!(Opcode::copy(0,16385,5),Ok(Opcode::LongCopy {..})));
    assert!(matches!(Opcode::copy(0,8,68),Ok(Opcode::LongCopy {..})));
    // not worth it, or not expressible
    assert!(Opcode::copy(0,1025,3).is_err());
    assert!(Opcode::copy(0,16385,4).is_err());
    assert!(Opcode::copy(0,131073,100).is_err());
    assert!(Opcode::copy(4,1,3).is_err());
    assert!(Opcode::copy(0,1,1029).is_err());
}

#[test]
fn runs() {
    assert_eq!(Opcode::run(3),None);
    assert_eq!(Opcode::run(7),Some(Opcode::LiteralRun { literals: 4 }));
    assert_eq!(Opcode::run(113),Some(Opcode::LiteralRun { literals: 112 }));
    let mut buf = Vec::new();
    assert!(Opcode::LiteralRun { literals: 6 }.write(&mut buf).is_err());
    assert!(buf.is_empty());
}
