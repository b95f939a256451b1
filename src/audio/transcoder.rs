//! # Transcoding Bridge
//!
//! Wraps one external `ffmpeg` process per playback attempt. ffmpeg pulls the
//! source URL with its reconnect options (so short network drops on the
//! source side are absorbed), transcodes to 48 kHz stereo PCM in a WAV
//! container, and songbird reads that from the child's stdout.
//!
//! Stream end and stream errors come back from songbird's track events and
//! are forwarded to the owning session as [`SessionMessage::Stream`], tagged
//! with the generation of the attempt so stale events can be discarded.

use async_trait::async_trait;
use songbird::{
    input::{ChildContainer, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{
    io::{BufRead, BufReader},
    process::{Command, Stdio},
    sync::Arc,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::session::SessionMessage;
use crate::error::TranscodeError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub ffmpeg_path: String,
    pub volume: f32,
}

impl TranscodeOptions {
    /// Argumentos de ffmpeg para un source dado.
    pub fn ffmpeg_args(&self, source_url: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            // Reconexión del lado del source
            "-reconnect", "1",
            "-reconnect_streamed", "1",
            "-reconnect_delay_max", "5",
            "-reconnect_on_network_error", "1",
            "-reconnect_on_http_error", "4xx,5xx",
            "-rw_timeout", "5000000",
            "-nostdin",
            "-hide_banner",
            "-loglevel", "warning",
            "-user_agent", USER_AGENT,
            "-analyzeduration", "10M",
            "-probesize", "10M",
            "-fflags", "+discardcorrupt",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend(["-i".to_string(), source_url.to_string()]);

        args.extend(
            [
                "-vn",
                "-c:a", "pcm_s16le",
                "-ar", "48000",
                "-ac", "2",
                "-f", "wav",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// El stream terminó limpiamente (EOF de ffmpeg).
    Ended,
    /// ffmpeg murió o el stream no se pudo decodificar.
    Failed(String),
}

/// Canal de vuelta de un intento de reproducción hacia su sesión.
#[derive(Debug, Clone)]
pub struct StreamNotifier {
    tx: mpsc::UnboundedSender<SessionMessage>,
    generation: u64,
}

impl StreamNotifier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionMessage>, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self, event: StreamEvent) {
        // Si la sesión ya no existe no hay a quién avisar
        let _ = self.tx.send(SessionMessage::Stream {
            generation: self.generation,
            event,
        });
    }

    pub fn ended(&self) {
        self.notify(StreamEvent::Ended);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.notify(StreamEvent::Failed(reason.into()));
    }
}

/// Stream en curso. `stop` debe ser idempotente.
pub trait ActiveStream: Send + Sync {
    fn stop(&mut self);
}

/// Productor de audio ligado a una conexión de voz.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn start(
        &self,
        source_url: &str,
        notifier: StreamNotifier,
    ) -> Result<Box<dyn ActiveStream>, TranscodeError>;
}

/// Bridge real: ffmpeg → songbird `Call`.
pub struct FfmpegBridge {
    call: Arc<Mutex<Call>>,
    options: TranscodeOptions,
}

impl FfmpegBridge {
    pub fn new(call: Arc<Mutex<Call>>, options: TranscodeOptions) -> Self {
        Self { call, options }
    }
}

#[async_trait]
impl Transcoder for FfmpegBridge {
    async fn start(
        &self,
        source_url: &str,
        notifier: StreamNotifier,
    ) -> Result<Box<dyn ActiveStream>, TranscodeError> {
        let mut child = Command::new(&self.options.ffmpeg_path)
            .args(self.options.ffmpeg_args(source_url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let generation = notifier.generation();
        if let Some(stderr) = child.stderr.take() {
            // Hilo propio: el pipe de stderr es bloqueante
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if !line.trim().is_empty() {
                        warn!("🎛️ ffmpeg[gen {}]: {}", generation, line.trim());
                    }
                }
            });
        }

        let input: Input = ChildContainer::from(child).into();

        // play_only: nunca dos streams sobre la misma conexión
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };
        if let Err(e) = handle.set_volume(self.options.volume) {
            warn!("⚠️ No se pudo ajustar el volumen (gen {}): {:?}", generation, e);
        }

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                StreamEndHandler {
                    notifier: notifier.clone(),
                },
            )
            .map_err(|e| TranscodeError::Stream(e.to_string()))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), StreamErrorHandler { notifier })
            .map_err(|e| TranscodeError::Stream(e.to_string()))?;

        info!("▶️ ffmpeg iniciado (gen {})", generation);
        Ok(Box::new(FfmpegStream {
            handle: Some(handle),
            generation,
        }))
    }
}

struct FfmpegStream {
    handle: Option<TrackHandle>,
    generation: u64,
}

impl ActiveStream for FfmpegStream {
    fn stop(&mut self) {
        // Al soltar el track, songbird mata el proceso hijo
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
            debug!("⏹️ ffmpeg detenido (gen {})", self.generation);
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handler para cuando termina el track
struct StreamEndHandler {
    notifier: StreamNotifier,
}

#[async_trait]
impl VoiceEventHandler for StreamEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.notifier.ended();
        None
    }
}

/// Handler para errores del track
struct StreamErrorHandler {
    notifier: StreamNotifier,
}

#[async_trait]
impl VoiceEventHandler for StreamErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{:?}", e)),
                    _ => None,
                })
                .unwrap_or_else(|| "error de reproducción".to_string()),
            _ => "error de reproducción".to_string(),
        };

        self.notifier.failed(reason);
        None
    }
}
