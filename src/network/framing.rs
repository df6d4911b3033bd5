//! Frame I/O over raw streams
//!
//! `[length:u32 LE][packet_id:u32 LE][payload]`, where `length` covers the id and the payload.
//! A reader validates the length before touching the rest of the frame. After any
//! error the stream position is undefined and the stream must be dropped.

use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::exceptions::TransportError;
use crate::protocol::consts::{FRAME_ID_SIZE, FRAME_LENGTH_SIZE};
use crate::protocol::packets::Packet;

/// Writes raw bytes and flushes
pub async fn send<W>(stream: &mut W, bytes: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads exactly `n` bytes
///
/// Fails with [`TransportError::ShortRead`] if the stream ends first.
pub async fn receive_exact<R>(stream: &mut R, n: usize) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; n];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(TransportError::ShortRead { expected: n })
        }
        Err(e) => Err(TransportError::Io(e)),
    }
}

pub async fn write_frame<W>(stream: &mut W, packet: &Packet) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    send(stream, &packet.encode()).await
}

/// Reads one frame, rejecting lengths outside `4..=max_size` before reading the payload
pub async fn read_frame<R>(stream: &mut R, max_size: u32) -> Result<Packet, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let header = receive_exact(stream, FRAME_LENGTH_SIZE).await?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);

    if length > max_size {
        return Err(TransportError::PacketTooLarge {
            length,
            max: max_size,
        });
    }
    if (length as usize) < FRAME_ID_SIZE {
        return Err(TransportError::InvalidPacketLength(length));
    }

    let id_bytes = receive_exact(stream, FRAME_ID_SIZE).await?;
    let id = u32::from_le_bytes([id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]]);

    let payload = receive_exact(stream, length as usize - FRAME_ID_SIZE).await?;
    trace!(packet_id = id, length, "Frame received");

    Ok(Packet {
        id,
        length,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const MAX: u32 = 1024;

    #[tokio::test]
    async fn frame_roundtrip_over_duplex() {
        let (mut client, mut server) = duplex(256);
        let packet = Packet::new(10, vec![1, 2, 3, 4, 5]);

        write_frame(&mut client, &packet).await.unwrap();
        let received = read_frame(&mut server, MAX).await.unwrap();

        assert_eq!(received, packet);
        assert_eq!(received.length, 9);
    }

    #[tokio::test]
    async fn empty_payload_frame() {
        let (mut client, mut server) = duplex(64);
        send(&mut client, &[4, 0, 0, 0, 3, 0, 0, 0]).await.unwrap();

        let received = read_frame(&mut server, MAX).await.unwrap();
        assert_eq!(received.id, 3);
        assert!(received.payload.is_empty());
    }

    #[tokio::test]
    async fn length_below_four_is_invalid() {
        let (mut client, mut server) = duplex(64);
        send(&mut client, &3u32.to_le_bytes()).await.unwrap();

        assert!(matches!(
            read_frame(&mut server, MAX).await,
            Err(TransportError::InvalidPacketLength(3))
        ));
    }

    #[tokio::test]
    async fn oversized_length_rejected_without_payload() {
        let (mut client, mut server) = duplex(64);
        // only the length is written, a payload read would hang
        send(&mut client, &(MAX + 1).to_le_bytes()).await.unwrap();

        match read_frame(&mut server, MAX).await {
            Err(TransportError::PacketTooLarge { length, max }) => {
                assert_eq!(length, MAX + 1);
                assert_eq!(max, MAX);
            }
            other => panic!("expected PacketTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_stream_is_short_read() {
        let (mut client, mut server) = duplex(64);
        send(&mut client, &[20, 0, 0, 0, 10, 0, 0, 0, 1, 2])
            .await
            .unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server, MAX).await,
            Err(TransportError::ShortRead { expected: 16 })
        ));
    }

    #[tokio::test]
    async fn receive_exact_reads_across_writes() {
        let (mut client, mut server) = duplex(64);
        tokio::spawn(async move {
            send(&mut client, &[1, 2]).await.unwrap();
            send(&mut client, &[3]).await.unwrap();
        });

        assert_eq!(receive_exact(&mut server, 3).await.unwrap(), vec![1, 2, 3]);
    }
}
