//! One-shot notifications for store errors.

/// Title shown for every surfaced backend error
pub const ERROR_TITLE: &str = "An error occurred. Please try again.";

/// A user-visible error notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub detail: String,
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Error: {}", self.title, self.detail)
    }
}

/// Remembers the last surfaced error so an unresolved error is reported once.
#[derive(Debug, Default)]
pub struct ErrorSurfacer {
    last: Option<String>,
}

impl ErrorSurfacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the store's current error field.
    ///
    /// Returns a notification only for an error message that differs from the
    /// one already surfaced. `None` clears the record.
    pub fn observe(&mut self, error: Option<&str>) -> Option<Notification> {
        let Some(message) = error else {
            self.last = None;
            return None;
        };

        if message.is_empty() || self.last.as_deref() == Some(message) {
            return None;
        }

        self.last = Some(message.to_string());
        Some(Notification {
            title: ERROR_TITLE.to_string(),
            detail: message.to_string(),
        })
    }

    pub fn last_surfaced(&self) -> Option<&str> {
        self.last.as_deref()
    }
}
