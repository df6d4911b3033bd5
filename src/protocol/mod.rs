/// Packet ids, protocol hash and size bounds
pub mod consts;
/// Varints, length-prefixed strings and fixed-width integers
pub mod codec;
/// Connect and Status packets and the query result
pub mod packets;
