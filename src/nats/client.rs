use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{ControlMessage, TranscriptMessage, UtteranceCounter};
use crate::participants::Participant;
use crate::recognition::{EngineSink, EngineStartRequest, RecognitionEngine};

/// Subject the STT service publishes partial and final transcripts under
/// (`stt.text.partial`, `stt.text.final`, ...)
pub const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

pub fn control_subject(session_id: &str) -> String {
    format!("stt.control.{}", session_id)
}

struct ActiveRun {
    session_id: String,
    shutdown: CancellationToken,
    listener: JoinHandle<()>,
}

/// Recognition engine backed by a remote STT service over NATS.
///
/// Start/stop/participant updates go out as control messages; transcripts
/// for the session come back on `stt.text.>` and are filtered by session id.
pub struct NatsEngine {
    client: Client,
    run: Mutex<Option<ActiveRun>>,
    session_id: parking_lot::Mutex<Option<String>>,
}

impl NatsEngine {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self::with_client(client))
    }

    /// Share an existing connection
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            run: Mutex::new(None),
            session_id: parking_lot::Mutex::new(None),
        }
    }
}

async fn publish_control(client: &Client, message: &ControlMessage) -> Result<()> {
    let subject = control_subject(&message.session_id);
    let payload = serde_json::to_vec(message).context("Failed to encode control message")?;

    client
        .publish(subject.clone(), payload.into())
        .await
        .context("Failed to publish control message")?;

    info!("Published {:?} to {}", message.action, subject);
    Ok(())
}

async fn listen(
    mut subscriber: Subscriber,
    session_id: String,
    sink: EngineSink,
    shutdown: CancellationToken,
) {
    info!("Transcript listener started for {}", session_id);
    let mut utterances = UtteranceCounter::default();

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = subscriber.next() => match message {
                Some(message) => message,
                None => {
                    warn!("Transcript subscription closed for {}", session_id);
                    break;
                }
            },
        };

        let transcript = match serde_json::from_slice::<TranscriptMessage>(&message.payload) {
            Ok(transcript) => transcript,
            Err(e) => {
                error!("Failed to parse transcript message: {}", e);
                continue;
            }
        };

        // Filter by session_id
        if transcript.session_id != session_id {
            continue;
        }

        let raw_json = String::from_utf8_lossy(&message.payload).into_owned();
        let event = transcript.into_engine_event(&mut utterances, Some(raw_json));
        if !sink.push(event) {
            debug!("Session {} closed its sink, ending listener", session_id);
            break;
        }
    }

    if let Err(e) = subscriber.unsubscribe().await {
        debug!("Failed to unsubscribe transcript listener: {}", e);
    }
    info!("Transcript listener stopped for {}", session_id);
}

#[async_trait]
impl RecognitionEngine for NatsEngine {
    async fn start(
        &self,
        request: EngineStartRequest,
        sink: EngineSink,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut run = self.run.lock().await;
        if let Some(active) = run.as_ref() {
            anyhow::bail!("NATS engine is already running session {}", active.session_id);
        }

        info!("Subscribing to transcripts on {}", TRANSCRIPT_SUBJECT);

        // Subscribe before asking the service to start so nothing is missed
        let subscriber = self
            .client
            .subscribe(TRANSCRIPT_SUBJECT.to_string())
            .await
            .context("Failed to subscribe to transcripts")?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        publish_control(&self.client, &ControlMessage::start(&request)).await?;

        let shutdown = CancellationToken::new();
        let listener = tokio::spawn(listen(
            subscriber,
            request.session_id.clone(),
            sink,
            shutdown.clone(),
        ));

        *self.session_id.lock() = Some(request.session_id.clone());
        *run = Some(ActiveRun {
            session_id: request.session_id,
            shutdown,
            listener,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(run) = self.run.lock().await.take() else {
            return Ok(());
        };
        self.session_id.lock().take();

        let published = publish_control(&self.client, &ControlMessage::stop(&run.session_id)).await;

        run.shutdown.cancel();
        if let Err(e) = run.listener.await {
            warn!("Transcript listener ended abnormally: {}", e);
        }

        published
    }

    async fn release(&self) -> Result<()> {
        self.stop().await?;
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }

    fn participants_changed(&self, participants: &[Participant]) {
        let Some(session_id) = self.session_id.lock().clone() else {
            return;
        };

        let message = ControlMessage::update_participants(&session_id, participants);
        let client = self.client.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = publish_control(&client, &message).await {
                        error!("Failed to publish participant update: {:#}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime to publish participant update for {}", session_id),
        }
    }

    fn name(&self) -> &str {
        "nats"
    }
}
