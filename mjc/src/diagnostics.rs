use std::fmt;

use crate::span::Pos;

/// Number of tokens that must be consumed after an error before the next
/// one is recorded.
pub const QUIET_DISTANCE: u32 = 3;

/// A recorded compile error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub pos: Pos,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-- {}: {}", self.pos, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Error collector with cascade suppression.
///
/// Errors are attributed to the lookahead token position last passed to
/// [`advance`](Self::advance). An error is only recorded when at least
/// [`QUIET_DISTANCE`] tokens were consumed since the previous one, whether or
/// not that one was recorded.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    distance: u32,
    pos: Pos,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            distance: QUIET_DISTANCE,
            pos: Pos::origin(),
        }
    }

    /// A token was consumed; `pos` is where the new lookahead starts.
    pub fn advance(&mut self, pos: Pos) {
        self.distance = self.distance.saturating_add(1);
        self.pos = pos;
    }

    /// Report an error at the current position. Returns whether it was
    /// recorded.
    pub fn error(&mut self, message: impl Into<String>) -> bool {
        let recorded = self.distance >= QUIET_DISTANCE;
        self.distance = 0;
        if recorded {
            let diag = Diagnostic {
                pos: self.pos,
                message: message.into(),
            };
            log::debug!("{diag}");
            self.items.push(diag);
        }
        recorded
    }

    /// Record an error regardless of the quiet distance.
    pub fn report(&mut self, message: impl Into<String>) {
        self.distance = QUIET_DISTANCE;
        self.error(message);
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
