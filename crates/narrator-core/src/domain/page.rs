use serde::{Deserialize, Serialize};

/// Text of the page currently shown by the reader.
///
/// `char_map[i]` is the position in the page's source document of byte `i`
/// of `text`. The engine treats `text` as opaque; the map is only used to
/// project word highlights back onto the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageText {
    pub text: String,
    #[serde(default)]
    pub char_map: Vec<usize>,
}

impl PageText {
    /// Page text with an identity character map.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        let char_map = (0..text.len()).collect();
        Self { text, char_map }
    }

    /// Map a `[start, end)` range of `text` to the source document.
    ///
    /// Returns `None` when the map does not cover the range.
    pub fn source_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if start >= end {
            return None;
        }
        let first = *self.char_map.get(start)?;
        let last = *self.char_map.get(end - 1)?;
        Some((first, last + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_page_maps_onto_itself() {
        let page = PageText::plain("Hello world");
        assert_eq!(page.source_range(6, 11), Some((6, 11)));
    }

    #[test]
    fn offset_map_shifts_range() {
        let page = PageText {
            text: "ab cd".to_string(),
            char_map: vec![10, 11, 12, 20, 21],
        };
        assert_eq!(page.source_range(3, 5), Some((20, 22)));
    }

    #[test]
    fn range_outside_map_is_none() {
        let page = PageText {
            text: "abc".to_string(),
            char_map: vec![0],
        };
        assert_eq!(page.source_range(0, 3), None);
        assert_eq!(page.source_range(2, 2), None);
    }
}
