//! Word timing: estimating per-word spans and finding the active word.
//!
//! When the backend does not supply timestamps the playback engine falls
//! back to a [`WordTimingEstimator`]. The default spreads the duration over
//! the words in proportion to their length.

use narrator_core::WordTiming;

/// Derives word spans for synthesized text.
pub trait WordTimingEstimator: Send + Sync {
    fn estimate(&self, text: &str, duration: f64) -> Vec<WordTiming>;
}

/// Allots time proportionally to each word's character count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProportionalEstimator;

impl WordTimingEstimator for ProportionalEstimator {
    fn estimate(&self, text: &str, duration: f64) -> Vec<WordTiming> {
        estimate_word_timings(text, duration)
    }
}

/// Byte ranges of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Partition `[0, duration]` into contiguous word spans.
///
/// The last word ends exactly at `duration` so rounding never leaves a gap.
#[allow(clippy::cast_precision_loss)]
pub fn estimate_word_timings(text: &str, duration: f64) -> Vec<WordTiming> {
    let spans = word_spans(text);
    let duration = duration.max(0.0);
    let weights: Vec<usize> = spans
        .iter()
        .map(|&(s, e)| text[s..e].chars().count())
        .collect();
    let total: usize = weights.iter().sum();
    if total == 0 {
        return Vec::new();
    }

    let last = spans.len() - 1;
    let mut consumed = 0usize;
    let mut cursor = 0.0;
    spans
        .iter()
        .zip(&weights)
        .enumerate()
        .map(|(i, (&(start_char, end_char), &weight))| {
            consumed += weight;
            let end = if i == last {
                duration
            } else {
                duration * consumed as f64 / total as f64
            };
            let timing = WordTiming {
                word: text[start_char..end_char].to_string(),
                start: cursor,
                end,
                start_char,
                end_char,
            };
            cursor = end;
            timing
        })
        .collect()
}

/// Index of the word being spoken at `time`.
///
/// A word stays active through the gap after it, up to the next word's start
/// (or indefinitely when it is the last word).
pub fn active_word_index(timings: &[WordTiming], time: f64) -> Option<usize> {
    timings.iter().enumerate().find_map(|(i, timing)| {
        if time >= timing.start && time < timing.end {
            return Some(i);
        }
        let before_next = timings.get(i + 1).is_none_or(|next| time < next.start);
        (time >= timing.end && before_next).then_some(i)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(word: &str, start: f64, end: f64) -> WordTiming {
        WordTiming {
            word: word.to_string(),
            start,
            end,
            start_char: 0,
            end_char: word.len(),
        }
    }

    #[test]
    fn hello_world_splits_evenly() {
        let timings = estimate_word_timings("Hello world", 2.0);

        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].word, "Hello");
        assert!((timings[0].start - 0.0).abs() < 1e-9);
        assert!((timings[0].end - 1.0).abs() < 1e-9);
        assert_eq!((timings[0].start_char, timings[0].end_char), (0, 5));
        assert_eq!(timings[1].word, "world");
        assert!((timings[1].start - 1.0).abs() < 1e-9);
        assert!((timings[1].end - 2.0).abs() < 1e-9);
        assert_eq!((timings[1].start_char, timings[1].end_char), (6, 11));
    }

    #[test]
    fn longer_words_get_more_time() {
        let timings = estimate_word_timings("a extraordinary b", 3.0);
        assert!(timings[1].end - timings[1].start > timings[0].end - timings[0].start);
    }

    #[test]
    fn spans_partition_the_duration() {
        let texts = [
            "The quick brown fox jumps over the lazy dog.",
            "  leading and   irregular\twhitespace\n",
            "naïve café déjà vu",
            "single",
        ];
        for text in texts {
            let duration = 7.3;
            let timings = estimate_word_timings(text, duration);
            assert!(!timings.is_empty());
            assert!(timings[0].start.abs() < 1e-12);
            assert!((timings.last().unwrap().end - duration).abs() < 1e-12);

            let mut total = 0.0;
            for pair in timings.windows(2) {
                assert!((pair[0].end - pair[1].start).abs() < 1e-12);
            }
            for t in &timings {
                assert!(t.end >= t.start);
                assert_eq!(&text[t.start_char..t.end_char], t.word);
                total += t.end - t.start;
            }
            assert!((total - duration).abs() < 1e-9);
        }
    }

    #[test]
    fn blank_text_has_no_words() {
        assert!(estimate_word_timings("   \n", 3.0).is_empty());
        assert!(estimate_word_timings("", 3.0).is_empty());
    }

    #[test]
    fn active_index_follows_intervals() {
        let timings = estimate_word_timings("Hello world", 2.0);
        assert_eq!(active_word_index(&timings, 0.0), Some(0));
        assert_eq!(active_word_index(&timings, 0.99), Some(0));
        assert_eq!(active_word_index(&timings, 1.0), Some(1));
        assert_eq!(active_word_index(&timings, 2.5), Some(1));
        assert_eq!(active_word_index(&[], 1.0), None);
    }

    #[test]
    fn gaps_keep_previous_word_active() {
        let timings = vec![timing("one", 0.5, 1.0), timing("two", 1.5, 2.0)];
        assert_eq!(active_word_index(&timings, 0.2), None);
        assert_eq!(active_word_index(&timings, 1.2), Some(0));
        assert_eq!(active_word_index(&timings, 1.5), Some(1));
        assert_eq!(active_word_index(&timings, 9.0), Some(1));
    }
}
