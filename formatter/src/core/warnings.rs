//! Bounded warning accumulation for recipes that touch many items.

/// Keeps the first `limit` warnings and counts the rest.
#[derive(Debug, Clone)]
pub struct WarningLog {
    limit: usize,
    items: Vec<String>,
    dropped: usize,
}

impl WarningLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            items: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, warning: impl Into<String>) {
        if self.items.len() < self.limit {
            self.items.push(warning.into());
        } else {
            self.dropped += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kept warnings plus a `"... and N more"` line when any were dropped.
    pub fn into_vec(self) -> Vec<String> {
        let mut items = self.items;
        if self.dropped > 0 {
            items.push(format!("... and {} more", self.dropped));
        }
        items
    }
}
