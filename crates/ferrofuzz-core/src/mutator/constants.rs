//! Constants shared by the "interesting value" and "replace digit" operators.

use static_assertions::const_assert_eq;

/// Values likely to sit on an integer boundary. `1` appears twice, keeping
/// it double-weighted under uniform sampling — see `DESIGN.md` for why this
/// duplicate, present in one revision of the source and absent in another,
/// is kept rather than deduplicated.
pub const INTERESTING8: [u8; 10] = [1, 16, 32, 64, 100, 127, 128, 129, 255, 1];

pub const INTERESTING16: [u16; 10] = [0, 128, 255, 256, 512, 1000, 1024, 4096, 32767, 65535];

pub const INTERESTING32: [u32; 8] = [
    0,
    1,
    32768,
    65535,
    65536,
    100_663_045,
    2_147_483_647,
    4_294_967_295,
];

pub const DIGITS: &[u8; 10] = b"0123456789";

const_assert_eq!(INTERESTING8.len(), 10);
const_assert_eq!(INTERESTING16.len(), 10);
const_assert_eq!(INTERESTING32.len(), 8);
const_assert_eq!(DIGITS.len(), 10);
