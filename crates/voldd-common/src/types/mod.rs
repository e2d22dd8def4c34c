pub mod endian;

pub use endian::{BigEndian, Endianness, LittleEndian, U16, U16Le, U32, U32Le, U64, U64Le};
