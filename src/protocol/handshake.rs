//! Peer-id assignment and SRP authentication state machine.
//!
//! [`Handshake`] is a synchronous state machine: it consumes connection
//! [`Event`]s and answers with the [`Action`] to perform next. It never
//! touches the network itself, which keeps every transition testable without
//! a socket. [`Handshake::drive`] runs it against a live
//! [`Connection`].
//!
//! ```text
//! Connecting -> AwaitingPeerId -> PeerAssigned -> AwaitingHello
//!     -> SrpInitiated --SrpBytesSB--> ProofSent --AuthAccept--> Connected
//!     -> FirstSrpSent ---------------------------AuthAccept--> Connected
//! ```
//!
//! The SRP math is delegated to an [`SrpClient`]. The password only ever
//! reaches that primitive; the wire carries salts, public values and proofs.

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::commands::client::{FirstSrp, Init, Init2, SrpBytesA, SrpBytesM};
use crate::protocol::commands::server::{AccessDenied, Hello, SrpBytesSB};
use crate::protocol::commands::{ClientCommand, ServerCommand};
use crate::transport::connection::Connection;
use crate::transport::fanout::Event;
use crate::utils::metrics::Timer;
use bytes::Bytes;
use futures::future::OptionFuture;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// The zero-knowledge password primitive.
///
/// Errors from any method end the handshake with `HandshakeFailure`.
pub trait SrpClient: Send {
    /// Fresh ephemeral `(public, private)` pair.
    fn initiate(&mut self) -> Result<(Vec<u8>, Vec<u8>)>;

    /// `(salt, verifier)` for registering a new account.
    fn derive_verifier(
        &mut self,
        identity: &[u8],
        passphrase: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Shared session secret from both sides' values.
    fn complete(
        &mut self,
        client_public: &[u8],
        client_private: &[u8],
        identity: &[u8],
        passphrase: &[u8],
        server_salt: &[u8],
        server_public: &[u8],
    ) -> Result<Vec<u8>>;

    /// Client proof `M` over the exchange.
    fn proof(
        &mut self,
        identity: &[u8],
        server_salt: &[u8],
        client_public: &[u8],
        server_public: &[u8],
        shared_secret: &[u8],
    ) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Connecting,
    /// Peer init sent.
    AwaitingPeerId,
    /// Peer id known; client init scheduled after the settle delay.
    PeerAssigned,
    /// Client init sent.
    AwaitingHello,
    /// `A` sent, waiting for the server's salt and `B`.
    SrpInitiated,
    /// New account registered, waiting for acceptance.
    FirstSrpSent,
    /// Proof `M` sent, waiting for acceptance.
    ProofSent,
    /// Init confirmation sent.
    Connected,
    Failed,
}

/// What the driver does in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Wait,
    /// Send unreliably once `delay` has passed.
    SendOriginalAfter {
        delay: Duration,
        command: ClientCommand,
    },
    SendReliable(ClientCommand),
}

struct EphemeralKeys {
    public: Zeroizing<Vec<u8>>,
    private: Zeroizing<Vec<u8>>,
}

/// Client-side handshake controller.
pub struct Handshake<S> {
    srp: S,
    username: String,
    password: Zeroizing<String>,
    language: String,
    settle_delay: Duration,
    state: HandshakeState,
    keys: Option<EphemeralKeys>,
}

impl<S> fmt::Debug for Handshake<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("username", &self.username)
            .field("state", &self.state)
            .field("has_keys", &self.keys.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: SrpClient> Handshake<S> {
    pub fn new(srp: S, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            srp,
            username: username.into(),
            password: Zeroizing::new(password.into()),
            language: String::new(),
            settle_delay: crate::config::SETTLE_DELAY,
            state: HandshakeState::Connecting,
            keys: None,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Connected
    }

    pub fn srp(&self) -> &S {
        &self.srp
    }

    /// Record that the peer init went out.
    pub fn peer_init_sent(&mut self) {
        if self.state == HandshakeState::Connecting {
            self.state = HandshakeState::AwaitingPeerId;
        }
    }

    /// Record that the delayed client init went out.
    pub fn init_sent(&mut self) {
        if self.state == HandshakeState::PeerAssigned {
            self.state = HandshakeState::AwaitingHello;
        }
    }

    /// Advance on one event. Errors are fatal and leave the state `Failed`.
    pub fn on_event(&mut self, event: &Event) -> Result<Action> {
        let result = match event {
            Event::PeerAssigned(peer_id) => Ok(self.on_peer_assigned(*peer_id)),
            Event::Command(ServerCommand::Hello(hello)) => self.on_hello(hello),
            Event::Command(ServerCommand::SrpBytesSB(challenge)) => self.on_challenge(challenge),
            Event::Command(ServerCommand::AuthAccept(_)) => Ok(self.on_auth_accept()),
            Event::Command(ServerCommand::AccessDenied(denied)) => self.on_access_denied(denied),
            Event::Command(_) => Ok(Action::Wait),
        };
        if result.is_err() {
            self.state = HandshakeState::Failed;
            self.keys = None;
        }
        result
    }

    fn on_peer_assigned(&mut self, peer_id: u16) -> Action {
        match self.state {
            HandshakeState::Connecting | HandshakeState::AwaitingPeerId => {
                self.state = HandshakeState::PeerAssigned;
                debug!(
                    peer_id,
                    delay_ms = self.settle_delay.as_millis() as u64,
                    "Scheduling client init"
                );
                Action::SendOriginalAfter {
                    delay: self.settle_delay,
                    command: Init::new(self.username.clone()).into(),
                }
            }
            state => {
                debug!(peer_id, ?state, "Peer id event outside assignment phase");
                Action::Wait
            }
        }
    }

    fn on_hello(&mut self, hello: &Hello) -> Result<Action> {
        if !matches!(
            self.state,
            HandshakeState::PeerAssigned | HandshakeState::AwaitingHello
        ) {
            debug!(state = ?self.state, "Ignoring greeting outside handshake");
            return Ok(Action::Wait);
        }

        if hello.supports_srp() {
            let (public, private) = self.srp.initiate().map_err(srp_failure)?;
            let command = SrpBytesA::new(Bytes::copy_from_slice(&public));
            self.keys = Some(EphemeralKeys {
                public: Zeroizing::new(public),
                private: Zeroizing::new(private),
            });
            self.state = HandshakeState::SrpInitiated;
            info!(protocol = hello.protocol_version, "Server offers SRP, sending A");
            Ok(Action::SendReliable(command.into()))
        } else if hello.supports_first_srp() {
            let (salt, verifier) = self
                .srp
                .derive_verifier(self.username.as_bytes(), self.password.as_bytes())
                .map_err(srp_failure)?;
            self.state = HandshakeState::FirstSrpSent;
            info!(
                protocol = hello.protocol_version,
                "Server offers registration, sending verifier"
            );
            Ok(Action::SendReliable(
                FirstSrp {
                    salt: salt.into(),
                    verifier: verifier.into(),
                    is_empty_password: self.password.is_empty(),
                }
                .into(),
            ))
        } else {
            warn!(
                auth_mechanisms = hello.auth_mechanisms,
                "Server offers no supported auth mechanism"
            );
            self.state = HandshakeState::AwaitingHello;
            Ok(Action::Wait)
        }
    }

    fn on_challenge(&mut self, challenge: &SrpBytesSB) -> Result<Action> {
        if self.state != HandshakeState::SrpInitiated {
            debug!(state = ?self.state, "Ignoring SRP challenge outside handshake");
            return Ok(Action::Wait);
        }
        let keys = self.keys.take().ok_or_else(|| {
            ProtocolError::HandshakeFailure(constants::ERR_MISSING_SECRETS.into())
        })?;

        let identity = self.username.as_bytes();
        let passphrase = self.password.as_bytes();
        let shared = Zeroizing::new(
            self.srp
                .complete(
                    &keys.public,
                    &keys.private,
                    identity,
                    passphrase,
                    &challenge.bytes_s,
                    &challenge.bytes_b,
                )
                .map_err(srp_failure)?,
        );
        let proof = self
            .srp
            .proof(identity, &challenge.bytes_s, &keys.public, &challenge.bytes_b, &shared)
            .map_err(srp_failure)?;

        self.state = HandshakeState::ProofSent;
        info!("Sending SRP proof");
        Ok(Action::SendReliable(
            SrpBytesM {
                bytes_m: proof.into(),
            }
            .into(),
        ))
    }

    fn on_auth_accept(&mut self) -> Action {
        match self.state {
            HandshakeState::ProofSent | HandshakeState::FirstSrpSent => {
                self.state = HandshakeState::Connected;
                info!("Authentication accepted, sending init confirmation");
                Action::SendReliable(
                    Init2 {
                        language: self.language.clone(),
                    }
                    .into(),
                )
            }
            state => {
                debug!(?state, "Ignoring auth accept outside handshake");
                Action::Wait
            }
        }
    }

    fn on_access_denied(&mut self, denied: &AccessDenied) -> Result<Action> {
        if self.state == HandshakeState::Connected {
            return Ok(Action::Wait);
        }
        Err(ProtocolError::AccessDenied(denied.describe()))
    }

    /// Run the handshake on `connection` until `Connected` or failure.
    ///
    /// `events` must be a subscription taken before the connection started so
    /// that the peer id assignment is not missed. The delayed client init runs
    /// as its own task under a child of the connection's cancellation token;
    /// it is cancelled when the connection closes or this future is dropped.
    #[instrument(skip_all, fields(username = %self.username))]
    pub async fn drive(
        &mut self,
        connection: &Arc<Connection>,
        events: mpsc::Receiver<Event>,
    ) -> Result<()> {
        let metrics = connection.metrics().clone();
        metrics.handshake_started();
        let _timer = Timer::start("handshake");

        let result = self.run(connection, events).await;
        match &result {
            Ok(()) => {
                metrics.handshake_completed();
                info!(peer_id = connection.peer_id(), "Handshake complete");
            }
            Err(e) => {
                metrics.handshake_failed();
                self.state = HandshakeState::Failed;
                self.keys = None;
                warn!(error = %e, "Handshake failed");
            }
        }
        result
    }

    async fn run(
        &mut self,
        connection: &Arc<Connection>,
        events: mpsc::Receiver<Event>,
    ) -> Result<()> {
        let mut events = ReceiverStream::new(events);
        let scheduled = connection.cancellation_token().child_token();
        let _cancel_scheduled = scheduled.clone().drop_guard();
        let closed = connection.cancellation_token();
        let mut pending_init: Option<JoinHandle<Result<()>>> = None;

        if self.state == HandshakeState::Connecting {
            connection.init().await?;
            self.peer_init_sent();
        }

        loop {
            tokio::select! {
                _ = closed.cancelled() => {
                    return Err(ProtocolError::ConnectionClosed);
                }
                Some(joined) = OptionFuture::from(pending_init.as_mut()) => {
                    pending_init = None;
                    match joined {
                        Ok(Ok(())) => self.init_sent(),
                        Ok(Err(e)) => return Err(e),
                        Err(e) => {
                            return Err(ProtocolError::Custom(format!(
                                "client init task failed: {e}"
                            )));
                        }
                    }
                }
                event = events.next() => {
                    let Some(event) = event else {
                        return Err(ProtocolError::ConnectionClosed);
                    };
                    match self.on_event(&event)? {
                        Action::Wait => {}
                        Action::SendOriginalAfter { delay, command } => {
                            pending_init = Some(schedule_original(
                                connection.clone(),
                                scheduled.clone(),
                                delay,
                                command,
                            ));
                        }
                        Action::SendReliable(command) => {
                            connection.send_reliable(&command).await?;
                        }
                    }
                    if self.is_connected() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Send `command` after `delay` unless `token` is cancelled first.
fn schedule_original(
    connection: Arc<Connection>,
    token: CancellationToken,
    delay: Duration,
    command: ClientCommand,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(command = command.name(), "Scheduled send cancelled");
                Ok(())
            }
            _ = tokio::time::sleep(delay) => {
                info!(command = command.name(), "Sending scheduled command");
                connection.send_original(&command).await
            }
        }
    })
}

fn srp_failure(error: ProtocolError) -> ProtocolError {
    match error {
        ProtocolError::HandshakeFailure(_) => error,
        other => ProtocolError::HandshakeFailure(other.to_string()),
    }
}
