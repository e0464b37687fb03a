//! Model runtimes that can be hosted on the synthesis worker thread.

#[cfg(feature = "sherpa")]
mod kokoro;

#[cfg(feature = "sherpa")]
pub use kokoro::{KokoroModel, kokoro_catalog};
