use crate::messages;
use crate::pipeline::SessionPipeline;
use archivist_channels::{Channel, ChannelEvent, ChannelMessage, MessageContent};
use archivist_core::{ArchivistResult, Authorizer, Notifier, OwnerId};
use archivist_security::{AllowList, AuthorizeOutcome};
use archivist_session::AwaitingInput;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Messages an owner may have queued before new ones are refused.
const WORKER_BUFFER: usize = 32;

/// A worker with nothing to do for this long exits.
const WORKER_IDLE: Duration = Duration::from_secs(600);

struct Worker {
    id: u64,
    tx: mpsc::Sender<ChannelMessage>,
}

/// Routes channel events to the pipeline.
///
/// Each authorized owner gets a worker task that handles that owner's
/// messages in arrival order, so a long build for one owner never holds up
/// another. The routing loop never waits on a worker: a full queue refuses
/// the message instead. Rejected senders are answered without a worker.
pub struct Dispatcher<C: Channel + 'static> {
    pipeline: Arc<SessionPipeline>,
    channel: Arc<C>,
    allow_list: Arc<AllowList>,
    workers: Mutex<HashMap<OwnerId, Worker>>,
    next_worker: AtomicU64,
    worker_buffer: usize,
    worker_idle: Duration,
}

impl<C: Channel + 'static> Dispatcher<C> {
    pub fn new(pipeline: Arc<SessionPipeline>, channel: Arc<C>, allow_list: Arc<AllowList>) -> Self {
        Self {
            pipeline,
            channel,
            allow_list,
            workers: Mutex::new(HashMap::new()),
            next_worker: AtomicU64::new(1),
            worker_buffer: WORKER_BUFFER,
            worker_idle: WORKER_IDLE,
        }
    }

    /// Overrides the per-owner queue length and worker idle lifetime.
    pub fn with_worker_limits(mut self, buffer: usize, idle: Duration) -> Self {
        self.worker_buffer = buffer.max(1);
        self.worker_idle = idle;
        self
    }

    /// Consumes events until the channel disconnects or the sender side is
    /// dropped.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChannelEvent>) {
        info!(channel = %self.channel.name(), "Dispatcher started");
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::MessageReceived(message) => self.route(message).await,
                ChannelEvent::Disconnected(reason) => {
                    warn!(channel = %self.channel.name(), reason = %reason, "Channel disconnected");
                    break;
                }
            }
        }
        self.workers.lock().clear();
        info!("Dispatcher stopped");
    }

    /// Number of live owner workers.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Queues `message` on its sender's worker, spawning one if needed.
    ///
    /// Group messages and unauthorized senders are answered on a one-off
    /// task and never get a worker.
    pub async fn route(self: &Arc<Self>, message: ChannelMessage) {
        if !self.admits(&message).await {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.handle(message).await });
            return;
        }
        self.enqueue(message);
    }

    async fn admits(&self, message: &ChannelMessage) -> bool {
        if !message.private {
            return false;
        }
        match self.allow_list.is_authorized(message.sender).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(owner = %message.sender, error = %e, "Allow-list lookup failed");
                false
            }
        }
    }

    fn enqueue(self: &Arc<Self>, mut message: ChannelMessage) {
        let owner = message.sender;
        // A worker that exited is replaced once.
        for _ in 0..2 {
            let (id, tx) = self.worker(owner);
            match tx.try_send(message) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    warn!(owner = %owner, "Worker queue full, message refused");
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.reply(owner, messages::QUEUE_FULL).await });
                    return;
                }
                Err(TrySendError::Closed(returned)) => {
                    self.retire(owner, id);
                    message = returned;
                }
            }
        }
        warn!(owner = %owner, "Dropping message, worker unavailable");
    }

    fn worker(self: &Arc<Self>, owner: OwnerId) -> (u64, mpsc::Sender<ChannelMessage>) {
        let mut workers = self.workers.lock();
        if let Some(worker) = workers.get(&owner) {
            return (worker.id, worker.tx.clone());
        }
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.worker_buffer);
        tokio::spawn(Arc::clone(self).work(owner, id, rx));
        workers.insert(owner, Worker { id, tx: tx.clone() });
        (id, tx)
    }

    async fn work(self: Arc<Self>, owner: OwnerId, id: u64, mut rx: mpsc::Receiver<ChannelMessage>) {
        loop {
            match tokio::time::timeout(self.worker_idle, rx.recv()).await {
                Ok(Some(message)) => self.handle(message).await,
                Ok(None) => break,
                Err(_) => {
                    self.retire(owner, id);
                    // Anything queued before the close is still handled.
                    rx.close();
                    while let Some(message) = rx.recv().await {
                        self.handle(message).await;
                    }
                    break;
                }
            }
        }
        debug!(owner = %owner, "Worker stopped");
    }

    /// Forgets worker `id` for `owner`, unless it was already replaced.
    fn retire(&self, owner: OwnerId, id: u64) {
        let mut workers = self.workers.lock();
        if workers.get(&owner).is_some_and(|w| w.id == id) {
            workers.remove(&owner);
        }
    }

    /// Handles one message to completion.
    pub async fn handle(&self, message: ChannelMessage) {
        let owner = message.sender;
        if let Err(e) = self.try_handle(message).await {
            debug!(owner = %owner, error = %e, "Request ended with error");
        }
    }

    async fn try_handle(&self, message: ChannelMessage) -> ArchivistResult<()> {
        let owner = message.sender;

        if !message.private {
            // Reply in the group itself, and only to commands.
            if matches!(message.content, MessageContent::Command { .. }) {
                self.reply(OwnerId(message.chat_id), messages::PRIVATE_ONLY)
                    .await;
            }
            return Ok(());
        }

        if let MessageContent::Command { name, args } = &message.content {
            if name == "authorise" {
                return self.authorise(owner, args).await;
            }
        }

        if !self.allow_list.is_authorized(owner).await? {
            info!(owner = %owner, "Rejected unauthorized user");
            match &message.content {
                MessageContent::Callback { id, .. } => {
                    self.answer(id, Some(messages::UNAUTHORIZED)).await;
                }
                _ => self.reply(owner, messages::UNAUTHORIZED).await,
            }
            return Ok(());
        }

        match message.content {
            MessageContent::Command { name, .. } => self.command(owner, &name).await,
            MessageContent::Text(text) => self.pipeline.provide_input(owner, &text).await.map(drop),
            MessageContent::File(file) => {
                if !self.pipeline.has_session(owner).await {
                    debug!(owner = %owner, file = %file.display_name, "Upload outside a session ignored");
                    return Ok(());
                }
                self.pipeline
                    .add_file(owner, &file.display_name, file.size, file.source.as_ref())
                    .await
                    .map(drop)
            }
            MessageContent::Callback { id, data } => self.callback(owner, &id, &data).await,
        }
    }

    async fn command(&self, owner: OwnerId, name: &str) -> ArchivistResult<()> {
        match name {
            "start" => {
                self.reply(owner, &messages::banner(self.pipeline.config().max_total_size))
                    .await;
                Ok(())
            }
            "zip" => self.pipeline.open(owner, Utc::now()).await.map(drop),
            "createzip" => self.pipeline.show_menu(owner).await,
            "skip" => self.pipeline.provide_input(owner, "/skip").await.map(drop),
            "cancel" => self.pipeline.cancel(owner).await.map(drop),
            "status" => self.pipeline.status(owner).await.map(drop),
            other => {
                debug!(owner = %owner, command = %other, "Unknown command");
                Ok(())
            }
        }
    }

    async fn callback(&self, owner: OwnerId, id: &str, data: &str) -> ArchivistResult<()> {
        if !self.pipeline.has_session(owner).await {
            self.answer(id, Some(messages::SESSION_EXPIRED)).await;
            return Ok(());
        }
        self.answer(id, None).await;

        match data {
            "set_name" => {
                self.pipeline
                    .request_input(owner, AwaitingInput::ArchiveName)
                    .await
            }
            "set_password" => {
                self.pipeline
                    .request_input(owner, AwaitingInput::Password)
                    .await
            }
            "create_zip" => self.pipeline.build_and_deliver(owner).await.map(drop),
            other => {
                debug!(owner = %owner, action = %other, "Unknown callback");
                Ok(())
            }
        }
    }

    async fn authorise(&self, sender: OwnerId, args: &[String]) -> ArchivistResult<()> {
        if !self.allow_list.is_owner(sender) {
            debug!(sender = %sender, "Non-owner tried /authorise");
            return Ok(());
        }
        let Some(user) = args.first().and_then(|a| a.parse::<OwnerId>().ok()) else {
            self.reply(sender, messages::AUTHORISE_USAGE).await;
            return Ok(());
        };
        match self.allow_list.authorize(user).await? {
            AuthorizeOutcome::Added => self.reply(sender, &messages::authorized(user)).await,
            AuthorizeOutcome::AlreadyAuthorized => {
                self.reply(sender, messages::ALREADY_AUTHORIZED).await;
            }
        }
        Ok(())
    }

    async fn reply(&self, to: OwnerId, text: &str) {
        if let Err(e) = self.channel.notify(to, text).await {
            warn!(to = %to, error = %e, "Reply failed");
        }
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.channel.answer_callback(callback_id, text).await {
            warn!(callback = %callback_id, error = %e, "Callback answer failed");
        }
    }
}
