//! Integration tests for `ReadAloudSession` page following.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{CountingSynthesizer, ManualOutput, Reply, WAIT};
use narrator_core::{EndReason, InMemorySettings, PageText, PageTextProvider, PlaybackState};
use narrator_voice::playback::{PlaybackConfig, PlaybackEngine};
use narrator_voice::session::{ReadAloudConfig, ReadAloudSession};
use tokio::sync::Notify;

/// A book held in memory.
struct Book {
    pages: Vec<PageText>,
    current: Mutex<usize>,
    reads: AtomicUsize,
    turns: AtomicUsize,
}

impl Book {
    fn new(pages: &[&str]) -> Arc<Self> {
        Self::with_pages(pages.iter().map(|p| PageText::plain(*p)).collect())
    }

    fn with_pages(pages: Vec<PageText>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            current: Mutex::new(0),
            reads: AtomicUsize::new(0),
            turns: AtomicUsize::new(0),
        })
    }

    fn page(&self) -> usize {
        *self.current.lock().unwrap()
    }
}

#[async_trait]
impl PageTextProvider for Book {
    async fn current_page(&self) -> Option<PageText> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.pages.get(self.page()).cloned()
    }

    async fn turn_page(&self) -> bool {
        self.turns.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().unwrap();
        if *current + 1 < self.pages.len() {
            *current += 1;
            true
        } else {
            false
        }
    }
}

struct Rig {
    session: ReadAloudSession,
    synth: Arc<CountingSynthesizer>,
    output: ManualOutput,
}

fn rig_with(book: Arc<Book>, synth: CountingSynthesizer, auto_advance: bool) -> Rig {
    let synth = Arc::new(synth);
    let output = ManualOutput::default();
    let engine = PlaybackEngine::builder(synth.clone(), Arc::new(InMemorySettings::new()))
        .config(PlaybackConfig {
            tick_interval: Duration::from_millis(10),
            ..PlaybackConfig::default()
        })
        .output(output.factory())
        .build();
    let session = ReadAloudSession::new(
        engine,
        book,
        ReadAloudConfig {
            auto_advance,
            page_turn_delay: Duration::ZERO,
        },
    );
    Rig {
        session,
        synth,
        output,
    }
}

fn rig(book: Arc<Book>) -> Rig {
    rig_with(book, CountingSynthesizer::new(Reply::Silence(2.0)), true)
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn natural_end_turns_the_page_and_keeps_reading() {
    let book = Book::new(&["Page one", "Page two"]);
    let Rig {
        session,
        synth,
        output,
    } = rig(book.clone());

    session.play_current_page().await.unwrap();
    assert_eq!(session.engine().state(), PlaybackState::Playing);

    output.finish();
    eventually(|| synth.calls() == 2 && session.engine().state() == PlaybackState::Playing).await;
    assert_eq!(book.page(), 1);
}

#[tokio::test]
async fn stop_never_advances() {
    let book = Book::new(&["Page one", "Page two"]);
    let Rig { session, synth, .. } = rig(book.clone());

    session.play_current_page().await.unwrap();
    session.engine().stop();
    assert_eq!(session.engine().last_end_reason(), EndReason::Stopped);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(book.turns.load(Ordering::SeqCst), 0);
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn last_page_ends_the_session() {
    let book = Book::new(&["The end"]);
    let Rig {
        session,
        synth,
        output,
    } = rig(book.clone());

    session.play_current_page().await.unwrap();
    output.finish();

    eventually(|| book.turns.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(synth.calls(), 1);
    assert_eq!(session.engine().state(), PlaybackState::Idle);
}

#[tokio::test]
async fn auto_advance_can_be_disabled() {
    let book = Book::new(&["Page one", "Page two"]);
    let Rig {
        session, output, ..
    } = rig_with(
        book.clone(),
        CountingSynthesizer::new(Reply::Silence(2.0)),
        false,
    );

    session.play_current_page().await.unwrap();
    output.finish();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(book.turns.load(Ordering::SeqCst), 0);
    assert_eq!(session.engine().last_end_reason(), EndReason::Ended);
}

#[tokio::test]
async fn page_request_while_buffering_is_ignored() {
    let gate = Arc::new(Notify::new());
    let book = Book::new(&["Page one"]);
    let Rig { session, synth, .. } = rig_with(
        book.clone(),
        CountingSynthesizer::gated(Reply::Silence(2.0), gate.clone()),
        true,
    );
    let session = Arc::new(session);

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.play_current_page().await }
    });
    let mut states = session.engine().subscribe_state();
    tokio::time::timeout(WAIT, states.wait_for(|s| *s == PlaybackState::Buffering))
        .await
        .unwrap()
        .unwrap();

    session.play_current_page().await.unwrap();
    assert_eq!(book.reads.load(Ordering::SeqCst), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn active_word_maps_onto_the_page() {
    let page = PageText {
        text: "Hello world".to_string(),
        char_map: (100..111).collect(),
    };
    let book = Book::with_pages(vec![page]);
    let Rig {
        session, output, ..
    } = rig(book);

    session.play_current_page().await.unwrap();
    assert_eq!(session.active_page_range(), Some((100, 105)));

    output.advance(1.5);
    eventually(|| session.active_page_range() == Some((106, 111))).await;

    session.engine().stop();
    assert_eq!(session.active_page_range(), None);
}
