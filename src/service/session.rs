//! Session driver: a [`Connection`] plus its [`Handshake`].
//!
//! ```no_run
//! # use minetest_protocol::config::NetworkConfig;
//! # use minetest_protocol::protocol::handshake::SrpClient;
//! # use minetest_protocol::service::session::Session;
//! # async fn run<S: SrpClient>(srp: S) -> minetest_protocol::error::Result<()> {
//! let config = NetworkConfig::default();
//! let mut session = Session::new(&config, srp);
//! let mut events = session.subscribe(128);
//! session.connect().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! session.disconnect().await
//! # }
//! ```

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::protocol::handshake::{Handshake, HandshakeState, SrpClient};
use crate::service::media::{MediaDownload, MediaStore};
use crate::transport::connection::Connection;
use crate::transport::fanout::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub struct Session<S> {
    connection: Arc<Connection>,
    handshake: Handshake<S>,
    subscriber_capacity: usize,
    media: Option<Arc<MediaStore>>,
}

impl<S: SrpClient> Session<S> {
    pub fn new(config: &NetworkConfig, srp: S) -> Self {
        let client = &config.client;
        let handshake = Handshake::new(srp, client.username.clone(), client.password.clone())
            .with_settle_delay(client.settle_delay)
            .with_language(client.language.clone());
        Self {
            connection: Connection::new(client.address.clone(), config.transport.clone()),
            handshake,
            subscriber_capacity: client.subscriber_capacity,
            media: client
                .download_media
                .then(|| Arc::new(MediaStore::new())),
        }
    }

    /// Application subscription; take it before `connect` to see every event.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<Event> {
        self.connection.subscribe(capacity)
    }

    /// Start the connection and drive the handshake to `Connected`.
    ///
    /// On failure the connection is stopped before the error is returned.
    /// With media download enabled, a task then requests the announced
    /// media and fills [`media`](Self::media).
    #[instrument(skip(self), fields(address = %self.connection.address()))]
    pub async fn connect(&mut self) -> Result<()> {
        let events = self.connection.subscribe(self.subscriber_capacity);
        // Subscribed up front: the announcement follows Init2 immediately.
        let media_events = self
            .media
            .as_ref()
            .map(|_| self.connection.subscribe(self.subscriber_capacity));
        self.connection.start().await?;

        if let Err(e) = self.handshake.drive(&self.connection, events).await {
            if let Err(stop_error) = self.connection.stop().await {
                warn!(error = %stop_error, "Connection ended with error during handshake");
            }
            return Err(e);
        }

        info!(peer_id = self.connection.peer_id(), "Session established");

        if let (Some(store), Some(media_events)) = (&self.media, media_events) {
            let download = MediaDownload::new(store.clone());
            let connection = self.connection.clone();
            tokio::spawn(async move {
                if let Err(e) = download.run(connection, media_events).await {
                    warn!(error = %e, "Media download failed");
                }
            });
        }
        Ok(())
    }

    /// Downloaded media, when enabled in the client configuration.
    pub fn media(&self) -> Option<&Arc<MediaStore>> {
        self.media.as_ref()
    }

    /// Stop the connection, sending a disconnect first.
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.stop().await
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}
