//! Match finder for the QFS encoder
//!
//! Candidate positions are kept in hash chains keyed by the two bytes found at each
//! position.  The chain links live in a ring the size of the window, so positions
//! that fall out of reach are forgotten automatically.  Chains run from the most
//! recent position backward, so the first match of a given length has the smallest offset.
//!
//! The index belongs to a single encoding pass and is dropped with it.

use super::ring_buffer::RingBuffer;
use crate::opcode::{Opcode,MIN_MATCH,MAX_MATCH,MAX_OFFSET};

const NIL: u32 = u32::MAX;

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Match {
    pub offset: usize,
    pub length: usize
}

/// true if some copy opcode can express the match, and would be shorter than the literals
fn encodable(offset: usize,length: usize) -> bool {
    Opcode::copy(0,offset,length).is_ok()
}

/// number of bytes at `cursor` that repeat the bytes at `cand`, up to `limit`,
/// the run may reach past `cursor` (self overlap)
fn run_length(window: &[u8],cand: usize,cursor: usize,skip: usize,limit: usize) -> usize {
    let mut i = skip;
    while i < limit && window[cand+i] == window[cursor+i] {
        i += 1;
    }
    i
}

pub struct MatchFinder<'a> {
    window: &'a [u8],
    /// latest position for each 2-byte prefix
    heads: Vec<u32>,
    /// for each position, the previous position with the same prefix
    links: RingBuffer<u32>,
    max_chain: usize,
    /// positions below this one are indexed
    indexed: usize
}

impl <'a> MatchFinder<'a> {
    pub fn new(window: &'a [u8],max_chain: usize) -> Self {
        Self {
            window,
            heads: vec![NIL;0x10000],
            links: RingBuffer::create(MAX_OFFSET),
            max_chain,
            indexed: 0
        }
    }
    fn prefix(&self,pos: usize) -> usize {
        ((self.window[pos] as usize) << 8) | self.window[pos+1] as usize
    }
    /// index every position before `cursor`, including those covered by earlier matches
    fn catch_up(&mut self,cursor: usize) {
        while self.indexed < cursor && self.indexed + 1 < self.window.len() {
            let pos = self.indexed;
            let key = self.prefix(pos);
            let prev = match self.heads[key] {
                NIL => None,
                p => Some(p)
            };
            self.links.set(pos,prev);
            self.heads[key] = pos as u32;
            self.indexed += 1;
        }
    }
    /// Longest encodable match for the bytes at `cursor`, ties going to the smaller offset.
    /// Cursors must be presented in increasing order.
    pub fn find_best_match(&mut self,cursor: usize) -> Option<Match> {
        self.catch_up(cursor);
        if cursor + MIN_MATCH > self.window.len() {
            return None;
        }
        let limit = usize::min(MAX_MATCH,self.window.len() - cursor);
        let mut best: Option<Match> = None;
        let mut cand = match self.heads[self.prefix(cursor)] {
            NIL => None,
            p => Some(p as usize)
        };
        let mut steps = 0;
        while let Some(pos) = cand {
            let offset = cursor - pos;
            if offset > MAX_OFFSET || steps >= self.max_chain {
                break;
            }
            steps += 1;
            // chains are keyed by the first two bytes, so those already match
            let length = run_length(self.window,pos,cursor,2,limit);
            if length > best.map_or(0,|m| m.length) && encodable(offset,length) {
                best = Some(Match { offset, length });
                if length == limit {
                    break;
                }
            }
            cand = self.links.get(pos).map(|p| p as usize);
        }
        if let Some(m) = best {
            log::trace!("match at {}: offset {} length {} after {} links",cursor,m.offset,m.length,steps);
        }
        best
    }
}

/// Exhaustive scan of the window behind `cursor`, looking back no more than `max_lookback`.
/// Makes the same choice as `MatchFinder` with an unbounded chain, only slower.
pub fn find_best_match(window: &[u8],cursor: usize,max_lookback: usize) -> Option<Match> {
    if cursor + MIN_MATCH > window.len() {
        return None;
    }
    let limit = usize::min(MAX_MATCH,window.len() - cursor);
    let reach = usize::min(cursor,usize::min(max_lookback,MAX_OFFSET));
    let mut best: Option<Match> = None;
    for offset in 1..=reach {
        let length = run_length(window,cursor-offset,cursor,0,limit);
        if length >= MIN_MATCH && length > best.map_or(0,|m| m.length) && encodable(offset,length) {
            best = Some(Match { offset, length });
            if length == limit {
                break;
            }
        }
    }
    best
}

#[test]
fn finds_overlapping_run() {
    let data = [b'a';1000];
    let mut finder = MatchFinder::new(&data,usize::MAX);
    assert_eq!(finder.find_best_match(0),None);
    assert_eq!(finder.find_best_match(1),Some(Match { offset: 1, length: 999 }));
    assert_eq!(find_best_match(&data,1,MAX_OFFSET),Some(Match { offset: 1, length: 999 }));
}

#[test]
fn prefers_nearest_of_equal_length() {
    let data = "abcXabcYabcZabc".as_bytes();
    let mut finder = MatchFinder::new(data,usize::MAX);
    assert_eq!(finder.find_best_match(12),Some(Match { offset: 4, length: 3 }));
    assert_eq!(find_best_match(data,12,MAX_OFFSET),Some(Match { offset: 4, length: 3 }));
}

#[test]
fn prefers_longer_over_nearer() {
    let data = "abcdeXabcYabcde".as_bytes();
    let mut finder = MatchFinder::new(data,usize::MAX);
    assert_eq!(finder.find_best_match(10),Some(Match { offset: 10, length: 5 }));
}

#[test]
fn rejects_short_and_unprofitable() {
    let data = "abXab".as_bytes();
    let mut finder = MatchFinder::new(data,usize::MAX);
    assert_eq!(finder.find_best_match(3),None);
    // a 3 byte match 2000 bytes back cannot be expressed
    let mut data = b"xyz".to_vec();
    data.extend((0..2000).map(|i| (i % 7) as u8 + b'0'));
    data.extend_from_slice(b"xyz");
    let cursor = data.len() - 3;
    let mut finder = MatchFinder::new(&data,usize::MAX);
    assert_eq!(finder.find_best_match(cursor),None);
    assert_eq!(find_best_match(&data,cursor,MAX_OFFSET),None);
}

#[test]
fn lookback_is_honored() {
    let data = "abcdefabcdef".as_bytes();
    assert_eq!(find_best_match(data,6,6),Some(Match { offset: 6, length: 6 }));
    assert_eq!(find_best_match(data,6,5),None);
}

#[test]
fn agrees_with_exhaustive_scan() {
    let text = "It was the best of times, it was the worst of times, it was the age of wisdom, \
        it was the age of foolishness, it was the epoch of belief, it was the epoch of incredulity.";
    let data = text.as_bytes();
    let mut finder = MatchFinder::new(data,usize::MAX);
    for cursor in 0..data.len() {
        assert_eq!(finder.find_best_match(cursor),find_best_match(data,cursor,MAX_OFFSET),"cursor {}",cursor);
    }
}
