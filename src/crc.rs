//! Checksums for DBPF records
//!
//! This is the table driven CRC the game uses to guard savegame records.
//! It is the MSB-first variant with polynomial `0x04C11DB7`, seeded with all ones
//! and returned without the final inversion (the parameter set sometimes called
//! CRC-32/MPEG-2).  The constants are a compatibility contract with existing
//! archives, they are pinned by the test vectors at the bottom of this module.

const POLY: u32 = 0x04C11DB7;
const IV: u32 = 0xFFFFFFFF;
/// The game never checksums more than this many bytes of a record.
pub const RECORD_MAX: usize = 250000;

const fn make_table() -> [u32;256] {
    let mut table = [0u32;256];
    let mut i = 0;
    while i < 256 {
        let mut c = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            c = match c & 0x80000000 {
                0 => c << 1,
                _ => (c << 1) ^ POLY
            };
            bit += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

static TABLE: [u32;256] = make_table();

/// Running checksum, for callers that have their data in pieces.
#[derive(Clone,Copy,Debug)]
pub struct Crc {
    acc: u32
}

impl Crc {
    pub fn new() -> Self {
        Self {
            acc: IV
        }
    }
    pub fn update(&mut self,data: &[u8]) {
        for byte in data {
            let idx = ((self.acc >> 24) ^ *byte as u32) & 0xff;
            self.acc = (self.acc << 8) ^ TABLE[idx as usize];
        }
    }
    pub fn finish(&self) -> u32 {
        self.acc
    }
}

impl Default for Crc {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of the whole slice.
pub fn checksum(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.finish()
}

/// Checksum of a record starting at `offset`, the way the game computes it:
/// everything past the first `RECORD_MAX` bytes is ignored.
/// An offset past the end checksums nothing.
pub fn record_checksum(data: &[u8],offset: usize) -> u32 {
    let start = usize::min(offset,data.len());
    let end = usize::min(data.len(),start + RECORD_MAX);
    log::trace!("record checksum over {}..{}",start,end);
    checksum(&data[start..end])
}

#[test]
fn table_entries() {
    assert_eq!(TABLE[0],0);
    assert_eq!(TABLE[1],POLY);
    assert_eq!(TABLE[2],0x09823B6E);
    assert_eq!(TABLE[255],0xB1F740B4);
}

#[test]
fn known_vectors() {
    assert_eq!(checksum(&[]),0xFFFFFFFF);
    assert_eq!(checksum(b"123456789"),0x0376E6E7);
    assert_eq!(checksum(&[0]),0x4E08BFB4);
}

#[test]
fn pieces_match_whole() {
    let data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let mut crc = Crc::default();
    crc.update(&data[0..10]);
    crc.update(&data[10..]);
    assert_eq!(crc.finish(),checksum(data));
    assert_eq!(checksum(data),checksum(data));
}

#[test]
fn record_is_clamped() {
    let data: Vec<u8> = (0..300000).map(|i| (i % 251) as u8).collect();
    assert_eq!(record_checksum(&data,0),checksum(&data[0..RECORD_MAX]));
    assert_eq!(record_checksum(&data,8),checksum(&data[8..RECORD_MAX+8]));
    assert_ne!(record_checksum(&data,0),checksum(&data));
    assert_eq!(record_checksum(&data[0..100],8),checksum(&data[8..100]));
    assert_eq!(record_checksum(&data[0..4],8),0xFFFFFFFF);
}
