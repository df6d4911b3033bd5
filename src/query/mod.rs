//! Status query orchestrator
//!
//! Drives one attempt: dial a session, send Connect on an outbound stream,
//! accept the response stream, read one frame and decode it. Every failure
//! becomes an offline [`ServerStatus`]; nothing is retried.

mod session_guard;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::exceptions::{QueryError, StepError, TransportError};
use crate::network::framing::{read_frame, send};
use crate::network::transport::{Connector, Session};
use crate::protocol::consts::{DisconnectType, MAX_PACKET_SIZE, PACKET_STATUS, packet_name};
use crate::protocol::packets::{
    ConnectPacket, Packet, ServerStatus, decode_status_packet, serialize_connect_packet,
};

use session_guard::SessionGuard;

/// Reason text sent when a session is closed after a query
pub const CLOSE_REASON: &str = "status query complete";

/// Longest budget of one attempt; larger timeouts are cut to it
pub const MAX_ATTEMPT_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

/// States of one query attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Connecting,
    Connected,
    Sending,
    AwaitingResponse,
    Decoding,
    Succeeded,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Idle => "idle",
            QueryState::Connecting => "connecting",
            QueryState::Connected => "connected",
            QueryState::Sending => "sending",
            QueryState::AwaitingResponse => "awaiting_response",
            QueryState::Decoding => "decoding",
            QueryState::Succeeded => "succeeded",
            QueryState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-attempt bookkeeping: state, start time and the parent deadline
struct Attempt {
    address: String,
    state: QueryState,
    started: Instant,
    deadline: Instant,
}

impl Attempt {
    fn new(address: String, budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            address,
            state: QueryState::Idle,
            started,
            deadline: started
                .checked_add(budget)
                .unwrap_or_else(|| started + MAX_ATTEMPT_BUDGET),
        }
    }

    fn transition(&mut self, next: QueryState) {
        debug!(address = %self.address, from = %self.state, to = %next, "Query state change");
        self.state = next;
    }

    /// Time left before the parent deadline
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn fail(&mut self, error: &QueryError, latency: Duration, packet_type: &str) -> ServerStatus {
        warn!(address = %self.address, state = %self.state, error = %error, "Status query failed");
        self.transition(QueryState::Failed);
        ServerStatus::offline(&self.address, error, latency, packet_type)
    }
}

/// Runs status queries against servers
///
/// Holds only immutable settings, so one value can serve concurrent queries;
/// each call dials its own session.
#[derive(Clone)]
pub struct StatusQuery {
    /// Dials one session per attempt
    connector: Arc<dyn Connector>,
    /// Budget of a whole attempt
    timeout: Duration,
    /// Sent in the Connect packet
    username: String,
    /// Largest response frame accepted
    max_packet_size: u32,
}

impl StatusQuery {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration, username: &str) -> Self {
        Self {
            connector,
            timeout,
            username: username.to_string(),
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    /// Caps the accepted response frame length, never above [`MAX_PACKET_SIZE`]
    pub fn with_max_packet_size(mut self, max_packet_size: u32) -> Self {
        self.max_packet_size = max_packet_size.min(MAX_PACKET_SIZE);
        self
    }

    /// Performs one attempt against `host:port`
    ///
    /// The whole attempt is bounded by the configured timeout. Once a session
    /// is established it is closed exactly once, whatever the outcome.
    pub async fn run(&self, host: &str, port: u16) -> ServerStatus {
        let mut attempt = Attempt::new(format!("{host}:{port}"), self.timeout);

        attempt.transition(QueryState::Connecting);
        let session = match self.connect(&attempt, host, port).await {
            Ok(session) => session,
            Err(e) => return attempt.fail(&e, Duration::ZERO, "none"),
        };
        attempt.transition(QueryState::Connected);

        let mut guard = SessionGuard::new(session);
        let exchanged = self.exchange(&mut attempt, guard.session()).await;
        let latency = attempt.elapsed();
        guard.close(DisconnectType::Normal.code(), CLOSE_REASON);

        let packet = match exchanged {
            Ok(packet) => packet,
            Err(e) => return attempt.fail(&e, Duration::ZERO, "none"),
        };
        attempt.transition(QueryState::Decoding);

        if packet.id != PACKET_STATUS {
            let error = QueryError::UnexpectedPacketId(packet.id);
            return attempt.fail(&error, latency, packet_name(packet.id));
        }

        match decode_status_packet(&packet.payload) {
            Ok(status) => {
                attempt.transition(QueryState::Succeeded);
                let result = status.to_server_status(&attempt.address, latency);
                info!(
                    address = %attempt.address,
                    players = status.player_count,
                    max_players = status.max_players,
                    latency_ms = result.latency_ms(),
                    "Status query succeeded"
                );
                result
            }
            Err(e) => attempt.fail(&QueryError::DecodeFailed(e), latency, packet.name()),
        }
    }

    async fn connect(
        &self,
        attempt: &Attempt,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn Session>, QueryError> {
        let budget = attempt.remaining();
        timeout(budget, self.connector.connect(host, port, budget))
            .await
            .map_err(|_| QueryError::ConnectionFailed(StepError::Timeout(budget)))?
            .map_err(|e| QueryError::ConnectionFailed(e.into()))
    }

    async fn exchange(
        &self,
        attempt: &mut Attempt,
        session: &mut dyn Session,
    ) -> Result<Packet, QueryError> {
        attempt.transition(QueryState::Sending);
        self.send_connect(attempt, session)
            .await
            .map_err(QueryError::SendFailed)?;

        attempt.transition(QueryState::AwaitingResponse);
        self.receive_response(attempt, session)
            .await
            .map_err(QueryError::ReceiveFailed)
    }

    async fn send_connect(
        &self,
        attempt: &Attempt,
        session: &mut dyn Session,
    ) -> Result<(), StepError> {
        let frame = serialize_connect_packet(&ConnectPacket::new(&self.username))?;
        let budget = attempt.remaining();

        timeout(budget, async {
            let mut stream = session.open_outbound_stream(budget).await?;
            send(&mut stream, &frame).await?;
            stream.shutdown().await.map_err(TransportError::from)?;
            Ok::<_, StepError>(())
        })
        .await
        .map_err(|_| StepError::Timeout(budget))??;

        debug!(address = %attempt.address, bytes = frame.len(), "Connect packet sent");
        Ok(())
    }

    async fn receive_response(
        &self,
        attempt: &Attempt,
        session: &mut dyn Session,
    ) -> Result<Packet, StepError> {
        let budget = attempt.remaining();
        let max_packet_size = self.max_packet_size;

        let packet = timeout(budget, async {
            let mut stream = session.accept_inbound_stream(budget).await?;
            let packet = read_frame(&mut stream, max_packet_size).await?;
            Ok::<_, StepError>(packet)
        })
        .await
        .map_err(|_| StepError::Timeout(budget))??;

        debug!(
            address = %attempt.address,
            packet_id = packet.id,
            length = packet.length,
            "Response frame received"
        );
        Ok(packet)
    }
}
