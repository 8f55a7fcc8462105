//! Byte-range edit scripts.
//!
//! Every textual mutation the engine performs goes through an [`EditScript`]:
//! a set of non-overlapping byte-addressed replacements applied bottom-up in
//! one pass. This includes the last-resort removal strategies, which locate a
//! span by scanning but still excise it as an explicit byte range.

use std::ops::Range;

/// A single replacement of a byte range with new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte range in the original text.
    pub span: Range<usize>,
    /// Replacement text (empty for deletion).
    pub new_text: String,
}

impl Edit {
    /// Create a replacement edit.
    pub fn replace(span: Range<usize>, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }

    /// Create a deletion edit.
    pub fn delete(span: Range<usize>) -> Self {
        Self {
            span,
            new_text: String::new(),
        }
    }

    /// Create an insertion edit at a point.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            span: at..at,
            new_text: text.into(),
        }
    }
}

/// An ordered set of edits against one text snapshot.
#[derive(Debug, Clone, Default)]
pub struct EditScript {
    edits: Vec<Edit>,
}

impl EditScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edit. Edits may be added in any order.
    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// True if any two edits overlap (insertions at the same point excluded).
    pub fn has_overlaps(&self) -> bool {
        let mut sorted: Vec<_> = self.edits.iter().collect();
        sorted.sort_by_key(|e| (e.span.start, e.span.end));
        sorted
            .windows(2)
            .any(|w| w[0].span.end > w[1].span.start && !w[0].span.is_empty())
    }

    /// Apply all edits to `text`, bottom-up so earlier spans stay valid.
    ///
    /// Returns `None` when edits overlap or fall outside the text; the caller
    /// treats that as a failed strategy, never as a partial write.
    pub fn apply(&self, text: &str) -> Option<String> {
        if self.has_overlaps() {
            return None;
        }
        let mut out = text.to_string();
        let mut sorted = self.edits.clone();
        sorted.sort_by(|a, b| b.span.start.cmp(&a.span.start));

        for edit in &sorted {
            if edit.span.end > out.len()
                || edit.span.start > edit.span.end
                || !out.is_char_boundary(edit.span.start)
                || !out.is_char_boundary(edit.span.end)
            {
                return None;
            }
            out.replace_range(edit.span.clone(), &edit.new_text);
        }
        Some(out)
    }
}

/// Widen `span` to whole lines of `text`, including the trailing newline.
pub fn expand_to_lines(text: &str, span: Range<usize>) -> Range<usize> {
    let start = text[..span.start.min(text.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = text[span.end.min(text.len())..]
        .find('\n')
        .map(|i| span.end + i + 1)
        .unwrap_or(text.len());
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bottom_up() {
        let mut script = EditScript::new();
        script.push(Edit::delete(0..4));
        script.push(Edit::replace(8..13, "globe"));

        let out = script.apply("one two three").unwrap();
        assert_eq!(out, "two globe");
    }

    #[test]
    fn test_overlap_rejected() {
        let mut script = EditScript::new();
        script.push(Edit::delete(0..5));
        script.push(Edit::delete(3..8));
        assert!(script.has_overlaps());
        assert!(script.apply("abcdefghij").is_none());
    }

    #[test]
    fn test_insert_does_not_overlap() {
        let mut script = EditScript::new();
        script.push(Edit::insert(3, "X"));
        script.push(Edit::delete(3..5));
        assert!(!script.has_overlaps());
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut script = EditScript::new();
        script.push(Edit::delete(0..99));
        assert!(script.apply("short").is_none());
    }

    #[test]
    fn test_expand_to_lines() {
        let text = "line one\nline two\nline three\n";
        let span = expand_to_lines(text, 11..15);
        assert_eq!(&text[span], "line two\n");
    }
}
