//! # Guild Playback Session
//!
//! One actor task per guild. Every command, stream event and timer for a
//! guild arrives as a [`SessionMessage`] on a single unbounded channel and is
//! handled in receipt order, so the queue, the voice connection and the
//! active stream are only ever touched by the actor itself.
//!
//! ## States
//!
//! - `Idle`: no stream. The voice connection may or may not exist.
//! - `Connecting`: a join is in progress.
//! - `Playing`: a radio station or a queued track is streaming.
//! - `Paused`: a radio stream failed and the session is waiting out the
//!   retry backoff. Never requested by users.
//!
//! ## Stream generations
//!
//! Every stream start and every teardown bumps a generation counter. Stream
//! events and retry timers carry the generation they belong to, and anything
//! that does not match the current one is dropped. This is what makes
//! `skip`/`stop` safe against late callbacks from an ffmpeg process that is
//! already being torn down.

use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use super::{
    policy::SessionPolicy,
    queue::{QueueItem, TrackQueue},
    transcoder::{ActiveStream, StreamEvent, StreamNotifier, Transcoder},
    voice::VoiceConnector,
};
use crate::{catalog::Station, error::PlaybackError, sources::Extractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Lo que suena (o intenta sonar) ahora.
#[derive(Debug, Clone, PartialEq)]
pub enum NowPlaying {
    Radio(Station),
    Track(QueueItem),
}

impl NowPlaying {
    pub fn title(&self) -> &str {
        match self {
            Self::Radio(station) => &station.name,
            Self::Track(item) => &item.title,
        }
    }

    /// Las radios no tienen fin natural.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Radio(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: PlaybackState,
    pub channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub channel: Option<ChannelId>,
    pub current: Option<NowPlaying>,
    pub pending: Vec<QueueItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyHere,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Started(QueueItem),
    Queued { position: usize, item: QueueItem },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipOutcome {
    pub skipped: NowPlaying,
    pub next: Option<QueueItem>,
}

/// Eventos asíncronos que el usuario debe ver aunque no haya un comando esperando.
#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    NowPlaying(NowPlaying),
    TrackFailed { item: QueueItem, reason: String },
    RadioGaveUp { station: Station, attempts: u32 },
    AutoDisconnected,
}

pub trait Announcer: Send + Sync {
    fn announce(&self, guild_id: GuildId, announcement: Announcement);
}

/// Colaboradores compartidos por todas las sesiones.
#[derive(Clone)]
pub struct SessionDeps {
    pub connector: Arc<dyn VoiceConnector>,
    pub extractor: Arc<dyn Extractor>,
    pub announcer: Arc<dyn Announcer>,
    pub policy: SessionPolicy,
}

type Reply<T> = oneshot::Sender<Result<T, PlaybackError>>;

#[derive(Debug)]
pub enum SessionMessage {
    Join { channel: ChannelId, reply: Reply<JoinOutcome> },
    PlayNow { station: Station, reply: Reply<()> },
    Enqueue { item: QueueItem, reply: Reply<EnqueueOutcome> },
    Skip { reply: Reply<SkipOutcome> },
    Stop { reply: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    /// Humanos presentes en el canal del bot.
    Occupancy { humans: usize },
    /// El bot fue desconectado desde fuera.
    VoiceDropped,
    Stream { generation: u64, event: StreamEvent },
    RetryDue { generation: u64 },
    IdleTimeout { epoch: u64 },
}

struct SessionShared {
    status: RwLock<SessionStatus>,
}

/// Referencia clonable a la sesión de una guild.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMessage>,
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// Crea la sesión y lanza su actor. Requiere un runtime de tokio.
    pub fn spawn(guild_id: GuildId, deps: SessionDeps) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared {
            status: RwLock::new(SessionStatus {
                state: PlaybackState::Idle,
                channel: None,
            }),
        });

        let actor = SessionActor {
            guild_id,
            queue: TrackQueue::new(deps.policy.max_queue_size),
            deps,
            tx: tx.downgrade(),
            shared: shared.clone(),
            channel: None,
            transcoder: None,
            state: PlaybackState::Idle,
            current: None,
            stream: None,
            generation: 0,
            attempts: 0,
            started_at: None,
            idle_epoch: 0,
            idle_armed: false,
        };
        tokio::spawn(actor.run(rx));

        Self { tx, shared }
    }

    /// Estado publicado por el actor, sin esperar a la cola de mensajes.
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.read()
    }

    /// Handles vivos además del registro y el propio actor.
    pub(crate) fn outstanding_refs(&self) -> usize {
        Arc::strong_count(&self.shared).saturating_sub(2)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| PlaybackError::SessionClosed)?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)
    }

    pub async fn join(&self, channel: ChannelId) -> Result<JoinOutcome, PlaybackError> {
        self.request(|reply| SessionMessage::Join { channel, reply })
            .await?
    }

    pub async fn play_now(&self, station: Station) -> Result<(), PlaybackError> {
        self.request(|reply| SessionMessage::PlayNow { station, reply })
            .await?
    }

    pub async fn enqueue(&self, item: QueueItem) -> Result<EnqueueOutcome, PlaybackError> {
        self.request(|reply| SessionMessage::Enqueue { item, reply })
            .await?
    }

    pub async fn skip(&self) -> Result<SkipOutcome, PlaybackError> {
        self.request(|reply| SessionMessage::Skip { reply }).await?
    }

    pub async fn stop(&self) -> Result<(), PlaybackError> {
        self.request(|reply| SessionMessage::Stop { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, PlaybackError> {
        self.request(|reply| SessionMessage::Snapshot { reply }).await
    }

    pub fn report_occupancy(&self, humans: usize) {
        let _ = self.tx.send(SessionMessage::Occupancy { humans });
    }

    pub fn voice_dropped(&self) {
        let _ = self.tx.send(SessionMessage::VoiceDropped);
    }
}

struct SessionActor {
    guild_id: GuildId,
    deps: SessionDeps,
    // Débil: el canal se cierra cuando no queda ningún handle
    tx: mpsc::WeakUnboundedSender<SessionMessage>,
    shared: Arc<SessionShared>,

    channel: Option<ChannelId>,
    transcoder: Option<Arc<dyn Transcoder>>,
    state: PlaybackState,
    current: Option<NowPlaying>,
    queue: TrackQueue,
    stream: Option<Box<dyn ActiveStream>>,

    generation: u64,
    /// Reintentos consecutivos de la radio actual.
    attempts: u32,
    started_at: Option<Instant>,

    idle_epoch: u64,
    idle_armed: bool,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMessage>) {
        debug!("🎛️ Sesión iniciada para guild {}", self.guild_id);

        while let Some(message) = rx.recv().await {
            self.handle(message).await;
        }

        self.teardown().await;
        debug!("🎛️ Sesión finalizada para guild {}", self.guild_id);
    }

    async fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join { channel, reply } => {
                let _ = reply.send(self.join(channel).await);
            }
            SessionMessage::PlayNow { station, reply } => {
                let _ = reply.send(self.play_now(station).await);
            }
            SessionMessage::Enqueue { item, reply } => {
                let _ = reply.send(self.enqueue(item).await);
            }
            SessionMessage::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            SessionMessage::Stop { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
            SessionMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionMessage::Occupancy { humans } => self.on_occupancy(humans),
            SessionMessage::VoiceDropped => {
                // El aviso puede ser el eco de un leave propio anterior a un nuevo join
                if self.channel.is_some()
                    && !self.deps.connector.is_connected(self.guild_id).await
                {
                    warn!("🔌 Bot desconectado externamente en guild {}", self.guild_id);
                    self.teardown().await;
                }
            }
            SessionMessage::Stream { generation, event } => {
                self.on_stream_event(generation, event).await;
            }
            SessionMessage::RetryDue { generation } => self.on_retry_due(generation).await,
            SessionMessage::IdleTimeout { epoch } => {
                if self.idle_armed && epoch == self.idle_epoch {
                    info!("⏰ Canal vacío en guild {}, desconectando", self.guild_id);
                    self.teardown().await;
                    self.announce(Announcement::AutoDisconnected);
                }
            }
        }
    }

    async fn join(&mut self, channel: ChannelId) -> Result<JoinOutcome, PlaybackError> {
        if let Some(current) = self.channel {
            if current == channel {
                return Ok(JoinOutcome::AlreadyHere);
            }
            return Err(crate::error::ConnectError::AlreadyConnected(current).into());
        }

        self.set_state(PlaybackState::Connecting);
        match self.deps.connector.join(self.guild_id, channel).await {
            Ok(transcoder) => {
                self.transcoder = Some(transcoder);
                self.channel = Some(channel);
                self.set_state(PlaybackState::Idle);
                Ok(JoinOutcome::Joined)
            }
            Err(e) => {
                warn!("❌ No se pudo conectar en guild {}: {}", self.guild_id, e);
                self.set_state(PlaybackState::Idle);
                Err(e.into())
            }
        }
    }

    async fn play_now(&mut self, station: Station) -> Result<(), PlaybackError> {
        self.require_connection()?;

        self.stop_stream();
        self.attempts = 0;
        info!("📻 Radio en guild {}: {}", self.guild_id, station.name);
        self.current = Some(NowPlaying::Radio(station));

        if let Err(e) = self.start_current().await {
            warn!("❌ No se pudo iniciar la radio en guild {}: {}", self.guild_id, e);
            self.current = None;
            if let Some(next) = self.advance().await {
                self.announce(Announcement::NowPlaying(NowPlaying::Track(next)));
            }
            return Err(e);
        }
        Ok(())
    }

    async fn enqueue(&mut self, item: QueueItem) -> Result<EnqueueOutcome, PlaybackError> {
        self.require_connection()?;

        // Idle con cola pendiente: primero lo que ya esperaba
        if self.state == PlaybackState::Idle && !self.queue.is_empty() {
            if let Some(next) = self.advance().await {
                self.announce(Announcement::NowPlaying(NowPlaying::Track(next)));
            }
        }

        if self.state != PlaybackState::Idle {
            let position = self.queue.push(item.clone())?;
            return Ok(EnqueueOutcome::Queued { position, item });
        }

        // Sesión ociosa y cola vacía: se reproduce directamente
        self.current = Some(NowPlaying::Track(item.clone()));
        if let Err(e) = self.start_current().await {
            warn!("❌ No se pudo iniciar '{}': {}", item.title, e);
            self.current = None;
            self.set_state(PlaybackState::Idle);
            return Err(e);
        }
        Ok(EnqueueOutcome::Started(item))
    }

    async fn skip(&mut self) -> Result<SkipOutcome, PlaybackError> {
        let Some(skipped) = self.current.take() else {
            return Err(PlaybackError::NothingPlaying);
        };

        info!("⏭️ Saltando '{}' en guild {}", skipped.title(), self.guild_id);
        self.stop_stream();
        self.attempts = 0;
        let next = self.advance().await;

        Ok(SkipOutcome { skipped, next })
    }

    /// Deja la sesión en `Idle`, sin cola y sin conexión.
    async fn teardown(&mut self) {
        self.queue.clear();
        self.stop_stream();
        self.current = None;
        self.attempts = 0;
        self.disarm_idle_timer();

        self.transcoder = None;
        if self.channel.take().is_some() {
            self.deps.connector.leave(self.guild_id).await;
        }
        self.set_state(PlaybackState::Idle);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            channel: self.channel,
            current: self.current.clone(),
            pending: self.queue.items(),
        }
    }

    /// Reproduce el siguiente de la cola. Los que fallan se descartan y se anuncian.
    async fn advance(&mut self) -> Option<QueueItem> {
        while let Some(item) = self.queue.pop() {
            self.current = Some(NowPlaying::Track(item.clone()));
            match self.start_current().await {
                Ok(()) => return Some(item),
                Err(e) => {
                    warn!("❌ Descartando '{}' en guild {}: {}", item.title, self.guild_id, e);
                    self.announce(Announcement::TrackFailed {
                        item,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.current = None;
        self.set_state(PlaybackState::Idle);
        None
    }

    async fn start_current(&mut self) -> Result<(), PlaybackError> {
        self.stop_stream();
        let transcoder = self.require_connection()?;

        let source = match &self.current {
            Some(NowPlaying::Radio(station)) => station.stream_url.to_string(),
            // La URL de audio caduca: se extrae justo antes de reproducir
            Some(NowPlaying::Track(item)) => {
                self.deps.extractor.stream_url(&item.source_url).await?
            }
            None => return Err(PlaybackError::NothingPlaying),
        };

        let tx = self.tx.upgrade().ok_or(PlaybackError::SessionClosed)?;
        let notifier = StreamNotifier::new(tx, self.generation);
        let stream = transcoder.start(&source, notifier).await?;

        self.stream = Some(stream);
        self.started_at = Some(Instant::now());
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Detiene el stream activo (si hay) e invalida sus eventos pendientes.
    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.generation += 1;
    }

    async fn on_stream_event(&mut self, generation: u64, event: StreamEvent) {
        if generation != self.generation {
            debug!(
                "🗑️ Evento obsoleto en guild {} (gen {} != {}): {:?}",
                self.guild_id, generation, self.generation, event
            );
            return;
        }
        self.stop_stream();

        match self.current.clone() {
            Some(NowPlaying::Track(item)) => {
                match event {
                    StreamEvent::Ended => debug!("🏁 Terminó '{}'", item.title),
                    StreamEvent::Failed(reason) => {
                        warn!("❌ Falló '{}' en guild {}: {}", item.title, self.guild_id, reason);
                        self.announce(Announcement::TrackFailed { item, reason });
                    }
                }
                if let Some(next) = self.advance().await {
                    self.announce(Announcement::NowPlaying(NowPlaying::Track(next)));
                }
            }
            Some(NowPlaying::Radio(station)) => {
                let reason = match event {
                    StreamEvent::Ended => "el stream terminó inesperadamente".to_string(),
                    StreamEvent::Failed(reason) => reason,
                };
                self.on_radio_failure(station, reason).await;
            }
            None => self.set_state(PlaybackState::Idle),
        }
    }

    async fn on_radio_failure(&mut self, station: Station, reason: String) {
        let retry = self.deps.policy.retry;

        if let Some(started) = self.started_at.take() {
            if started.elapsed() >= retry.stable_after {
                self.attempts = 0;
            }
        }
        self.attempts += 1;

        if retry.allows(self.attempts) {
            let delay = retry.delay_for(self.attempts);
            warn!(
                "📡 Radio '{}' cayó en guild {} ({}), reintento {}/{} en {:?}",
                station.name, self.guild_id, reason, self.attempts, retry.max_retries, delay
            );
            self.set_state(PlaybackState::Paused);
            self.schedule(
                delay,
                SessionMessage::RetryDue {
                    generation: self.generation,
                },
            );
            return;
        }

        let attempts = self.attempts - 1;
        error!(
            "💀 Radio '{}' abandonada en guild {} tras {} reintentos: {}",
            station.name, self.guild_id, attempts, reason
        );
        self.attempts = 0;
        self.current = None;
        self.announce(Announcement::RadioGaveUp { station, attempts });

        if let Some(next) = self.advance().await {
            self.announce(Announcement::NowPlaying(NowPlaying::Track(next)));
        }
    }

    async fn on_retry_due(&mut self, generation: u64) {
        if generation != self.generation || self.state != PlaybackState::Paused {
            return;
        }
        let Some(NowPlaying::Radio(station)) = self.current.clone() else {
            return;
        };

        info!("🔄 Reconectando radio '{}' en guild {}", station.name, self.guild_id);
        if let Err(e) = self.start_current().await {
            self.on_radio_failure(station, e.to_string()).await;
        }
    }

    fn on_occupancy(&mut self, humans: usize) {
        if self.channel.is_none() {
            return;
        }

        if humans == 0 {
            if !self.idle_armed {
                self.idle_armed = true;
                self.idle_epoch += 1;
                let window = self.deps.policy.idle_disconnect_after;
                debug!("👻 Canal vacío en guild {}, desconexión en {:?}", self.guild_id, window);
                self.schedule(
                    window,
                    SessionMessage::IdleTimeout {
                        epoch: self.idle_epoch,
                    },
                );
            }
        } else if self.idle_armed {
            debug!("👥 Vuelven los oyentes en guild {}", self.guild_id);
            self.disarm_idle_timer();
        }
    }

    fn disarm_idle_timer(&mut self) {
        if self.idle_armed {
            self.idle_armed = false;
            self.idle_epoch += 1;
        }
    }

    fn schedule(&self, delay: Duration, message: SessionMessage) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message);
        });
    }

    fn require_connection(&self) -> Result<Arc<dyn Transcoder>, PlaybackError> {
        self.transcoder.clone().ok_or(PlaybackError::NotConnected)
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!("🔀 Guild {}: {:?} -> {:?}", self.guild_id, self.state, state);
        }
        self.state = state;
        *self.shared.status.write() = SessionStatus {
            state,
            channel: self.channel,
        };
    }

    fn announce(&self, announcement: Announcement) {
        self.deps.announcer.announce(self.guild_id, announcement);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        audio::{policy::RetryPolicy, queue::test_item},
        error::{ConnectError, ResolveError, TranscodeError},
        sources::MockExtractor,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use url::Url;

    /// Transcoder falso: registra cada inicio y cuenta las detenciones.
    #[derive(Default)]
    pub(crate) struct FakeTranscoder {
        starts: parking_lot::Mutex<Vec<(String, StreamNotifier)>>,
        stops: Arc<AtomicUsize>,
        failing: parking_lot::Mutex<HashSet<String>>,
    }

    impl FakeTranscoder {
        fn started_urls(&self) -> Vec<String> {
            self.starts.lock().iter().map(|(url, _)| url.clone()).collect()
        }

        fn last_notifier(&self) -> StreamNotifier {
            self.starts.lock().last().unwrap().1.clone()
        }

        fn fail_on(&self, url: &str) {
            self.failing.lock().insert(url.to_string());
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    struct FakeStream {
        stops: Arc<AtomicUsize>,
        stopped: bool,
    }

    impl ActiveStream for FakeStream {
        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn start(
            &self,
            source_url: &str,
            notifier: StreamNotifier,
        ) -> Result<Box<dyn ActiveStream>, TranscodeError> {
            if self.failing.lock().contains(source_url) {
                return Err(TranscodeError::Stream("fuente rota".into()));
            }
            self.starts.lock().push((source_url.to_string(), notifier));
            Ok(Box::new(FakeStream {
                stops: self.stops.clone(),
                stopped: false,
            }))
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeConnector {
        transcoder: Arc<FakeTranscoder>,
        joins: AtomicUsize,
        leaves: AtomicUsize,
        refuse: bool,
        live: std::sync::atomic::AtomicBool,
    }

    impl FakeConnector {
        /// Simula que Discord cortó la conexión.
        fn drop_connection(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn join(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> Result<Arc<dyn Transcoder>, ConnectError> {
            if self.refuse {
                return Err(ConnectError::PermissionDenied);
            }
            self.joins.fetch_add(1, Ordering::SeqCst);
            self.live.store(true, Ordering::SeqCst);
            Ok(self.transcoder.clone())
        }

        async fn leave(&self, _guild_id: GuildId) {
            self.leaves.fetch_add(1, Ordering::SeqCst);
            self.live.store(false, Ordering::SeqCst);
        }

        async fn is_connected(&self, _guild_id: GuildId) -> bool {
            self.live.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingAnnouncer {
        pub(crate) seen: parking_lot::Mutex<Vec<Announcement>>,
    }

    impl Announcer for RecordingAnnouncer {
        fn announce(&self, _guild_id: GuildId, announcement: Announcement) {
            self.seen.lock().push(announcement);
        }
    }

    pub(crate) fn test_policy() -> SessionPolicy {
        SessionPolicy {
            retry: RetryPolicy {
                max_retries: 3,
                base_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(4),
                stable_after: Duration::from_secs(30),
            },
            idle_disconnect_after: Duration::from_secs(60),
            max_queue_size: 10,
        }
    }

    /// Extractor que devuelve `<página>#media`, o error si la página contiene "broken".
    pub(crate) fn media_extractor() -> MockExtractor {
        let mut extractor = MockExtractor::new();
        extractor.expect_stream_url().returning(|page| {
            if page.contains("broken") {
                Err(ResolveError::Extraction("video no disponible".into()))
            } else {
                Ok(format!("{}#media", page))
            }
        });
        extractor
    }

    struct Harness {
        session: SessionHandle,
        connector: Arc<FakeConnector>,
        transcoder: Arc<FakeTranscoder>,
        announcer: Arc<RecordingAnnouncer>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_connector(FakeConnector::default())
        }

        fn with_connector(connector: FakeConnector) -> Self {
            let connector = Arc::new(connector);
            let transcoder = connector.transcoder.clone();
            let announcer = Arc::new(RecordingAnnouncer::default());
            let deps = SessionDeps {
                connector: connector.clone(),
                extractor: Arc::new(media_extractor()),
                announcer: announcer.clone(),
                policy: test_policy(),
            };

            Self {
                session: SessionHandle::spawn(GuildId::new(1), deps),
                connector,
                transcoder,
                announcer,
            }
        }

        async fn connected() -> Self {
            let harness = Self::new();
            harness.session.join(ChannelId::new(10)).await.unwrap();
            harness
        }

        async fn snapshot(&self) -> SessionSnapshot {
            self.session.snapshot().await.unwrap()
        }

        fn announcements(&self) -> Vec<Announcement> {
            self.announcer.seen.lock().clone()
        }
    }

    fn station(name: &str) -> Station {
        Station::new(
            name,
            Url::parse(&format!("https://radio.example.com/{}", name)).unwrap(),
            ["test"],
        )
    }

    fn pending_titles(snapshot: &SessionSnapshot) -> Vec<String> {
        snapshot.pending.iter().map(|i| i.title.clone()).collect()
    }

    #[tokio::test]
    async fn join_is_idempotent_for_same_channel() {
        let h = Harness::new();

        assert_eq!(h.session.join(ChannelId::new(10)).await.unwrap(), JoinOutcome::Joined);
        assert_eq!(
            h.session.join(ChannelId::new(10)).await.unwrap(),
            JoinOutcome::AlreadyHere
        );
        assert_eq!(h.connector.joins.load(Ordering::SeqCst), 1);

        let status = h.session.status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.channel, Some(ChannelId::new(10)));
    }

    #[tokio::test]
    async fn join_elsewhere_is_rejected() {
        let h = Harness::connected().await;

        let err = h.session.join(ChannelId::new(11)).await.unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Connect(ConnectError::AlreadyConnected(c)) if c == ChannelId::new(10)
        ));
        assert_eq!(h.snapshot().await.channel, Some(ChannelId::new(10)));
    }

    #[tokio::test]
    async fn failed_join_stays_idle() {
        let h = Harness::with_connector(FakeConnector {
            refuse: true,
            ..Default::default()
        });

        let err = h.session.join(ChannelId::new(10)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Connect(ConnectError::PermissionDenied)));

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.channel, None);
    }

    #[tokio::test]
    async fn playing_requires_connection() {
        let h = Harness::new();

        assert!(matches!(
            h.session.play_now(station("jazz")).await,
            Err(PlaybackError::NotConnected)
        ));
        assert!(matches!(
            h.session.enqueue(test_item("a")).await,
            Err(PlaybackError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn enqueue_on_idle_plays_first_and_queues_rest_in_order() {
        let h = Harness::connected().await;

        let first = h.session.enqueue(test_item("a")).await.unwrap();
        assert!(matches!(first, EnqueueOutcome::Started(ref i) if i.title == "a"));

        for (title, expected) in [("b", 1), ("c", 2), ("d", 3)] {
            match h.session.enqueue(test_item(title)).await.unwrap() {
                EnqueueOutcome::Queued { position, .. } => assert_eq!(position, expected),
                other => panic!("esperaba encolado, obtuve {:?}", other),
            }
        }

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("a"));
        assert_eq!(pending_titles(&snapshot), vec!["b", "c", "d"]);
        assert_eq!(
            h.transcoder.started_urls(),
            vec!["https://www.youtube.com/watch?v=a#media"]
        );
    }

    #[tokio::test]
    async fn queue_full_is_reported() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("playing")).await.unwrap();
        for i in 0..10 {
            h.session.enqueue(test_item(&format!("t{}", i))).await.unwrap();
        }

        assert!(matches!(
            h.session.enqueue(test_item("overflow")).await,
            Err(PlaybackError::QueueFull(10))
        ));
    }

    #[tokio::test]
    async fn skip_advances_to_head_without_reordering() {
        let h = Harness::connected().await;
        for title in ["a", "b", "c", "d"] {
            h.session.enqueue(test_item(title)).await.unwrap();
        }

        let outcome = h.session.skip().await.unwrap();
        assert_eq!(outcome.skipped.title(), "a");
        assert_eq!(outcome.next.map(|i| i.title), Some("b".to_string()));
        assert_eq!(h.transcoder.stops(), 1);

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("b"));
        assert_eq!(pending_titles(&snapshot), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn skip_last_item_goes_idle_and_nothing_to_skip_errors() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();

        let outcome = h.session.skip().await.unwrap();
        assert_eq!(outcome.next, None);

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.current, None);
        assert_eq!(snapshot.channel, Some(ChannelId::new(10)));

        assert!(matches!(h.session.skip().await, Err(PlaybackError::NothingPlaying)));
    }

    #[tokio::test]
    async fn skip_on_radio_stops_radio_and_plays_queue() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();
        h.session.enqueue(test_item("a")).await.unwrap();

        let outcome = h.session.skip().await.unwrap();
        assert!(outcome.skipped.is_continuous());

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("a"));
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test]
    async fn play_now_replaces_current_and_keeps_queue() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("b")).await.unwrap();

        h.session.play_now(station("jazz")).await.unwrap();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("jazz"));
        assert_eq!(pending_titles(&snapshot), vec!["b"]);
        // El stream anterior se detuvo antes de iniciar el nuevo
        assert_eq!(h.transcoder.stops(), 1);
        assert_eq!(
            h.transcoder.started_urls().last().map(String::as_str),
            Some("https://radio.example.com/jazz")
        );
    }

    #[tokio::test]
    async fn stop_always_ends_idle_and_empty() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("b")).await.unwrap();

        h.session.stop().await.unwrap();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.current, None);
        assert_eq!(snapshot.channel, None);
        assert_eq!(h.connector.leaves.load(Ordering::SeqCst), 1);
        assert_eq!(h.transcoder.stops(), 1);

        // Sin conexión ni stream: sigue siendo válido
        h.session.stop().await.unwrap();
        assert_eq!(h.snapshot().await.state, PlaybackState::Idle);
        assert_eq!(h.connector.leaves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn track_end_advances_queue_and_announces() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("b")).await.unwrap();

        h.transcoder.last_notifier().ended();
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("b"));

        h.transcoder.last_notifier().ended();
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.current, None);

        assert!(matches!(
            h.announcements().as_slice(),
            [Announcement::NowPlaying(NowPlaying::Track(item))] if item.title == "b"
        ));
    }

    #[tokio::test]
    async fn failed_track_is_dropped_without_retry() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("b")).await.unwrap();

        h.transcoder.last_notifier().failed("decodificación inválida");
        let snapshot = h.snapshot().await;

        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("b"));
        assert_eq!(h.transcoder.started_urls().len(), 2);
        let announcements = h.announcements();
        assert!(matches!(
            &announcements[0],
            Announcement::TrackFailed { item, reason } if item.title == "a" && reason == "decodificación inválida"
        ));
    }

    #[tokio::test]
    async fn unplayable_queue_items_are_skipped_over() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("broken")).await.unwrap();
        h.session.enqueue(test_item("c")).await.unwrap();

        h.session.skip().await.unwrap();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("c"));
        assert!(matches!(
            h.announcements().as_slice(),
            [Announcement::TrackFailed { item, .. }] if item.title == "broken"
        ));
    }

    #[tokio::test]
    async fn unplayable_first_item_is_reported_to_requester() {
        let h = Harness::connected().await;

        let err = h.session.enqueue(test_item("broken")).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Resolve(ResolveError::Extraction(_))));
        assert_eq!(h.snapshot().await.state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn stale_stream_events_are_ignored() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        let stale = h.transcoder.last_notifier();
        h.session.enqueue(test_item("b")).await.unwrap();
        h.session.enqueue(test_item("c")).await.unwrap();

        h.session.skip().await.unwrap();
        // Llega tarde el fin del stream de "a"
        stale.ended();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("b"));
        assert_eq!(pending_titles(&snapshot), vec!["c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_failure_retries_then_gives_up() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();

        for attempt in 1..=3 {
            h.transcoder.last_notifier().failed("conexión reiniciada");
            assert_eq!(h.snapshot().await.state, PlaybackState::Paused);

            tokio::time::sleep(Duration::from_secs(10)).await;
            assert_eq!(h.snapshot().await.state, PlaybackState::Playing);
            assert_eq!(h.transcoder.started_urls().len(), 1 + attempt);
        }

        h.transcoder.last_notifier().failed("conexión reiniciada");
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.current, None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.transcoder.started_urls().len(), 4);
        assert!(matches!(
            h.announcements().as_slice(),
            [Announcement::RadioGaveUp { station, attempts: 3 }] if station.name == "jazz"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn radio_unexpected_end_is_a_failure() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();

        h.transcoder.last_notifier().ended();
        assert_eq!(h.snapshot().await.state, PlaybackState::Paused);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("jazz"));
    }

    #[tokio::test(start_paused = true)]
    async fn radio_gave_up_advances_to_queue() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();
        h.session.enqueue(test_item("a")).await.unwrap();

        for _ in 0..3 {
            h.transcoder.last_notifier().failed("caída");
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        h.transcoder.last_notifier().failed("caída");

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.current.as_ref().map(NowPlaying::title), Some("a"));
        assert_eq!(snapshot.state, PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn stable_radio_resets_retry_counter() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();

        for _ in 0..6 {
            // Cada stream dura más que `stable_after` antes de caer
            tokio::time::sleep(Duration::from_secs(31)).await;
            h.transcoder.last_notifier().failed("caída");
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(h.snapshot().await.state, PlaybackState::Playing);
        }
        assert!(h.announcements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_during_backoff_cancels_retry() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();
        h.transcoder.last_notifier().failed("caída");
        assert_eq!(h.snapshot().await.state, PlaybackState::Paused);

        h.session.skip().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(h.transcoder.started_urls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_disconnects_after_debounce() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();

        h.session.report_occupancy(0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.snapshot().await.state, PlaybackState::Playing);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.channel, None);
        assert_eq!(h.announcements(), vec![Announcement::AutoDisconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_listener_cancels_disconnect() {
        let h = Harness::connected().await;
        h.session.play_now(station("jazz")).await.unwrap();

        h.session.report_occupancy(0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        h.session.report_occupancy(2);
        tokio::time::sleep(Duration::from_secs(120)).await;

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.channel, Some(ChannelId::new(10)));
        assert!(h.announcements().is_empty());
    }

    #[tokio::test]
    async fn external_disconnect_resets_session() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("b")).await.unwrap();

        h.connector.drop_connection();
        h.session.voice_dropped();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.channel, None);
        assert!(snapshot.pending.is_empty());
        assert_eq!(h.transcoder.stops(), 1);
    }

    #[tokio::test]
    async fn late_disconnect_notice_keeps_new_connection() {
        let h = Harness::connected().await;
        h.session.stop().await.unwrap();
        h.session.join(ChannelId::new(11)).await.unwrap();
        h.session.enqueue(test_item("a")).await.unwrap();

        // Llega el voice state del leave anterior
        h.session.voice_dropped();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.channel, Some(ChannelId::new(11)));
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(h.connector.leaves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_radio_start_hands_over_to_queue_in_order() {
        let h = Harness::connected().await;
        h.session.enqueue(test_item("a")).await.unwrap();
        h.session.enqueue(test_item("b")).await.unwrap();

        let dead = station("muerta");
        h.transcoder.fail_on(dead.stream_url.as_str());
        assert!(h.session.play_now(dead).await.is_err());

        let outcome = h.session.enqueue(test_item("c")).await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Queued { position: 1, .. }));

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.current.as_ref().map(|c| c.title()), Some("b"));
        assert_eq!(pending_titles(&snapshot), vec!["c"]);
        assert!(h.announcements().iter().any(|a| matches!(
            a,
            Announcement::NowPlaying(NowPlaying::Track(item)) if item.title == "b"
        )));
    }
}
