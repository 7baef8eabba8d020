//! Ring buffer of back links for LZ type compression windows.
//! Slots are addressed by absolute stream position, so the buffer only remembers
//! the most recent `capacity` positions, which is exactly the reach of the window.
use num_traits::PrimInt;

pub struct RingBuffer<T: PrimInt> {
    buf: Vec<T>,
    mask: usize
}

impl <T: PrimInt> RingBuffer<T> {
    /// Create an empty ring, `n` is rounded up to a power of 2.
    /// The maximum value of `T` is reserved to mark empty slots.
    pub fn create(n: usize) -> Self {
        let n = n.next_power_of_two();
        Self {
            buf: vec![T::max_value();n],
            mask: n - 1
        }
    }
    /// value stored for absolute position `pos`, if any
    pub fn get(&self,pos: usize) -> Option<T> {
        let val = self.buf[pos & self.mask];
        match val == T::max_value() {
            true => None,
            false => Some(val)
        }
    }
    /// store a value for absolute position `pos`, displacing `pos - capacity`
    pub fn set(&mut self,pos: usize,val: Option<T>) {
        self.buf[pos & self.mask] = val.unwrap_or(T::max_value());
    }
}

#[test]
fn wraps_by_position() {
    let mut ring: RingBuffer<u32> = RingBuffer::create(3);
    assert_eq!(ring.get(0),None);
    ring.set(1,Some(7));
    ring.set(2,None);
    assert_eq!(ring.get(1),Some(7));
    assert_eq!(ring.get(5),Some(7));
    assert_eq!(ring.get(2),None);
    ring.set(5,Some(9));
    assert_eq!(ring.get(1),Some(9));
}
