//! Scripted in-memory transport for tests

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::Mutex;

use crate::exceptions::TransportError;
use crate::network::transport::{Connector, InboundStream, OutboundStream, Session};
use crate::protocol::consts::PACKET_STATUS;
use crate::protocol::packets::{Packet, StatusPacket};

/// What the fake peer does after the handshake
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Handshake fails with the given reason
    RefuseConnect(String),
    /// Opening the request stream fails
    FailOpen,
    /// The connection drops before the peer opens its response stream
    FailAccept,
    /// The peer writes these raw bytes on its response stream, then closes it
    Respond(Vec<u8>),
    /// The peer never opens a response stream
    Silent,
}

impl Script {
    pub(crate) fn status(status: &StatusPacket) -> Self {
        Script::Respond(Packet::new(PACKET_STATUS, status.encode_payload()).encode())
    }

    pub(crate) fn packet(id: u32, payload: Vec<u8>) -> Self {
        Script::Respond(Packet::new(id, payload).encode())
    }
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    script: Script,
    connect_delay: Duration,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    last_close_code: Arc<AtomicU32>,
    /// Peer side of the last request stream
    pub(crate) requests: Arc<Mutex<Vec<DuplexStream>>>,
}

impl MockConnector {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            connect_delay: Duration::from_millis(5),
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            last_close_code: Arc::new(AtomicU32::new(u32::MAX)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Code of the most recent close, `u32::MAX` if never closed
    pub(crate) fn last_close_code(&self) -> u32 {
        self.last_close_code.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.connect_delay).await;

        if let Script::RefuseConnect(reason) = &self.script {
            return Err(TransportError::ConnectionFailed {
                address: format!("{host}:{port}"),
                reason: reason.clone(),
            });
        }

        Ok(Box::new(MockSession {
            script: self.script.clone(),
            closes: self.closes.clone(),
            last_close_code: self.last_close_code.clone(),
            requests: self.requests.clone(),
        }))
    }
}

struct MockSession {
    script: Script,
    closes: Arc<AtomicUsize>,
    last_close_code: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<DuplexStream>>>,
}

#[async_trait]
impl Session for MockSession {
    async fn open_outbound_stream(
        &mut self,
        _timeout: Duration,
    ) -> Result<OutboundStream, TransportError> {
        if let Script::FailOpen = self.script {
            return Err(TransportError::StreamOpenFailed("stream limit reached".into()));
        }
        let (local, peer) = duplex(64 * 1024);
        self.requests.lock().await.push(peer);
        Ok(Box::new(local))
    }

    async fn accept_inbound_stream(
        &mut self,
        _timeout: Duration,
    ) -> Result<InboundStream, TransportError> {
        match &self.script {
            Script::Respond(bytes) => {
                let (mut peer, local) = duplex(bytes.len().max(64));
                peer.write_all(bytes).await?;
                drop(peer);
                Ok(Box::new(local))
            }
            Script::FailAccept => Err(TransportError::StreamAcceptFailed(
                "connection lost".into(),
            )),
            _ => std::future::pending().await,
        }
    }

    /// Counts every call so tests can check a session is closed exactly once
    fn close(&mut self, code: u32, _reason: &str) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.last_close_code.store(code, Ordering::SeqCst);
    }
}
