//! Scrolling caption line fed one mora fragment at a time.

/// Placeholder appended for a mora without caption text (leading silence).
pub const SILENCE_FRAGMENT: &str = "\u{3000}";

/// A bounded, left-scrolling caption line.
///
/// Before each append the oldest characters are dropped until the line is no
/// longer than `max_chars - 1`, so the newest fragment always fits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelopLine {
    text: String,
    max_chars: usize,
}

impl TelopLine {
    /// `max_chars == 0` disables the line; appends are ignored.
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_chars,
        }
    }

    pub fn push_fragment(&mut self, fragment: Option<&str>) {
        if self.max_chars == 0 {
            return;
        }

        let keep = self.max_chars - 1;
        let len = self.text.chars().count();
        if len > keep {
            let cut = self
                .text
                .char_indices()
                .nth(len - keep)
                .map(|(i, _)| i)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
        }

        match fragment {
            Some(f) if !f.is_empty() => self.text.push_str(f),
            _ => self.text.push_str(SILENCE_FRAGMENT),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}
