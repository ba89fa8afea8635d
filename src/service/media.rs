//! Media download after the session is established.
//!
//! The server announces its media once Init2 is accepted. [`MediaDownload`]
//! answers the announcement with [`RequestMedia`] for every file, then files
//! the [`Media`] bunches into a shared [`MediaStore`] until every bunch has
//! arrived.
//!
//! Like the handshake, the state machine is synchronous; [`MediaDownload::run`]
//! drives it against a live [`Connection`].

use crate::error::Result;
use crate::protocol::commands::client::RequestMedia;
use crate::protocol::commands::server::{AnnounceMedia, Media};
use crate::protocol::commands::{ClientCommand, ServerCommand};
use crate::transport::connection::Connection;
use crate::transport::fanout::Event;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

/// Most names one request can carry.
const MAX_FILES_PER_REQUEST: usize = u16::MAX as usize;

/// Downloaded media, shared between the download task and the application.
#[derive(Debug)]
pub struct MediaStore {
    files: RwLock<HashMap<String, Bytes>>,
    complete: watch::Sender<bool>,
}

impl Default for MediaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            complete: watch::channel(false).0,
        }
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of every file received so far, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every announced file has been delivered.
    pub fn is_complete(&self) -> bool {
        *self.complete.borrow()
    }

    /// Resolves once the download has finished.
    pub async fn wait_complete(&self) {
        let mut complete = self.complete.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = complete.wait_for(|done| *done).await;
    }

    fn insert(&self, name: String, data: Bytes) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, data);
    }

    fn mark_complete(&self) {
        self.complete.send_replace(true);
    }
}

/// Tracks one announce/request/receive cycle.
#[derive(Debug)]
pub struct MediaDownload {
    store: Arc<MediaStore>,
    announced: Option<usize>,
    bunch_count: Option<u16>,
    bunches_seen: BTreeSet<u16>,
}

impl MediaDownload {
    pub fn new(store: Arc<MediaStore>) -> Self {
        Self {
            store,
            announced: None,
            bunch_count: None,
            bunches_seen: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<MediaStore> {
        &self.store
    }

    /// Feed one connection event; returns the requests to send.
    pub fn on_event(&mut self, event: &Event) -> Vec<RequestMedia> {
        match event {
            Event::Command(ServerCommand::AnnounceMedia(announce)) => self.on_announce(announce),
            Event::Command(ServerCommand::Media(media)) => {
                self.on_media(media);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_announce(&mut self, announce: &AnnounceMedia) -> Vec<RequestMedia> {
        if self.announced.is_some() {
            debug!("Ignoring repeated media announcement");
            return Vec::new();
        }
        self.announced = Some(announce.files.len());
        info!(files = announce.files.len(), "Media announced");

        if announce.files.is_empty() {
            self.store.mark_complete();
            return Vec::new();
        }

        announce
            .files
            .chunks(MAX_FILES_PER_REQUEST)
            .map(|batch| RequestMedia {
                files: batch.iter().map(|file| file.name.clone()).collect(),
            })
            .collect()
    }

    fn on_media(&mut self, media: &Media) {
        if self.announced.is_none() {
            warn!(bunch = media.bunch_index, "Media bunch before announcement");
        }
        if media.bunch_index >= media.bunch_count {
            warn!(
                bunch = media.bunch_index,
                bunch_count = media.bunch_count,
                "Ignoring media bunch outside its count"
            );
            return;
        }

        for file in &media.files {
            self.store.insert(file.name.clone(), file.data.clone());
        }
        self.bunch_count = Some(media.bunch_count);
        self.bunches_seen.insert(media.bunch_index);
        debug!(
            bunch = media.bunch_index + 1,
            bunch_count = media.bunch_count,
            files = media.files.len(),
            "Media bunch received"
        );

        if self.is_complete() {
            info!(files = self.store.len(), "Media download complete");
            self.store.mark_complete();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.store.is_complete()
            || self
                .bunch_count
                .is_some_and(|count| self.bunches_seen.len() >= count as usize)
    }

    /// Answer the announcement and collect bunches until complete or the
    /// connection closes.
    #[instrument(skip_all, fields(address = %connection.address()))]
    pub async fn run(
        mut self,
        connection: Arc<Connection>,
        events: mpsc::Receiver<Event>,
    ) -> Result<()> {
        let mut events = ReceiverStream::new(events);
        let closed = connection.cancellation_token();

        while !self.is_complete() {
            let event = tokio::select! {
                _ = closed.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            for request in self.on_event(&event) {
                debug!(files = request.files.len(), "Requesting media");
                connection
                    .send_reliable(&ClientCommand::from(request))
                    .await?;
            }
        }

        if !self.is_complete() {
            debug!(files = self.store.len(), "Media download stopped early");
        }
        Ok(())
    }
}
