//! Read-aloud session: plays the reader's current page and follows along.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use narrator_core::{EndReason, PageText, PageTextProvider, PlaybackState};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::PlaybackError;
use crate::playback::PlaybackEngine;

/// Configuration for [`ReadAloudSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadAloudConfig {
    /// Turn the page and keep reading when a page finishes naturally.
    pub auto_advance: bool,
    /// Pause between a finished page and the next one.
    #[serde(with = "millis")]
    pub page_turn_delay: Duration,
}

impl Default for ReadAloudConfig {
    fn default() -> Self {
        Self {
            auto_advance: true,
            page_turn_delay: Duration::from_millis(300),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

struct SessionInner {
    engine: PlaybackEngine,
    pages: Arc<dyn PageTextProvider>,
    config: ReadAloudConfig,
    voice: Mutex<Option<String>>,
    page: Mutex<Option<PageText>>,
}

/// Binds a [`PlaybackEngine`] to the reader's page text.
pub struct ReadAloudSession {
    inner: Arc<SessionInner>,
    follower: JoinHandle<()>,
}

impl ReadAloudSession {
    /// Create the session and start following engine state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        engine: PlaybackEngine,
        pages: Arc<dyn PageTextProvider>,
        config: ReadAloudConfig,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            engine,
            pages,
            config,
            voice: Mutex::new(None),
            page: Mutex::new(None),
        });
        let follower = tokio::spawn(follow(Arc::downgrade(&inner)));
        Self { inner, follower }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.inner.engine
    }

    /// Voice for subsequent pages; `None` defers to the engine's resolution.
    pub fn set_voice(&self, voice_id: Option<String>) {
        *self
            .inner
            .voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = voice_id;
    }

    /// Read the page the reader currently shows.
    ///
    /// Ignored while the engine is buffering. A blank or missing page is a
    /// no-op.
    pub async fn play_current_page(&self) -> Result<(), PlaybackError> {
        self.inner.play_current_page().await
    }

    /// Range of the page's source document covered by the active word.
    pub fn active_page_range(&self) -> Option<(usize, usize)> {
        let index = self.inner.engine.current_word_index()?;
        let timing = self.inner.engine.word_timings().into_iter().nth(index)?;
        self.inner
            .page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()?
            .source_range(timing.start_char, timing.end_char)
    }
}

impl Drop for ReadAloudSession {
    fn drop(&mut self) {
        self.follower.abort();
    }
}

impl SessionInner {
    async fn play_current_page(&self) -> Result<(), PlaybackError> {
        if self.engine.state() == PlaybackState::Buffering {
            tracing::debug!("Page requested while buffering, ignoring");
            return Ok(());
        }
        let Some(page) = self.pages.current_page().await else {
            tracing::debug!("No page text available");
            return Ok(());
        };
        if page.text.trim().is_empty() {
            return Ok(());
        }

        let text = page.text.clone();
        *self.page.lock().unwrap_or_else(PoisonError::into_inner) = Some(page);
        let voice = self
            .voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        // A page that is still playing is replaced, not queued behind.
        if self.engine.state() == PlaybackState::Playing {
            self.engine.stop();
        }
        self.engine.play(&text, voice.as_deref()).await
    }

    async fn advance(&self) {
        tokio::time::sleep(self.config.page_turn_delay).await;
        if !self.pages.turn_page().await {
            tracing::info!("Reached the last page");
            return;
        }
        if let Err(e) = self.play_current_page().await {
            tracing::warn!(error = %e, "Could not read the next page");
        }
    }
}

/// Watch for a return to idle caused by a natural end.
///
/// The watch channel may coalesce `buffering → playing → idle` into a single
/// change, so any arrival at idle is checked against the recorded end reason.
async fn follow(inner: Weak<SessionInner>) {
    let mut states = match inner.upgrade() {
        Some(inner) => inner.engine.subscribe_state(),
        None => return,
    };
    let mut previous = *states.borrow_and_update();

    while states.changed().await.is_ok() {
        let current = *states.borrow_and_update();
        let finished = previous != PlaybackState::Idle && current == PlaybackState::Idle;
        previous = current;
        if !finished {
            continue;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.config.auto_advance || inner.engine.last_end_reason() != EndReason::Ended {
            continue;
        }
        tracing::debug!("Page finished, advancing");
        inner.advance().await;
    }
}
