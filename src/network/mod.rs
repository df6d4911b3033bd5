/// Frame I/O on top of raw streams
///
/// Reads and writes `[length][packet id][payload]` units with bound checks on the length.
pub mod framing;
/// Sessions and streams
///
/// `Connector`/`Session` seam and its QUIC implementation.
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
