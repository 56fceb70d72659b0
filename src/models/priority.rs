/// Retention priority of an article in the offline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OfflinePriority {
    Read = 1,
    #[default]
    Unread = 2,
    Starred = 3,
}

impl OfflinePriority {
    /// Starred wins over read state.
    pub fn from_flags(is_starred: bool, is_read: bool) -> Self {
        if is_starred {
            OfflinePriority::Starred
        } else if is_read {
            OfflinePriority::Read
        } else {
            OfflinePriority::Unread
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Out-of-range values are clamped into 1..=3.
    pub fn from_i64(value: i64) -> Self {
        match value {
            i64::MIN..=1 => OfflinePriority::Read,
            2 => OfflinePriority::Unread,
            _ => OfflinePriority::Starred,
        }
    }
}

/// An article as seen by the sync pipeline, reduced to what queueing needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCandidate {
    pub id: i64,
    pub is_starred: bool,
    pub is_read: bool,
}

pub trait Prioritized {
    fn offline_priority(&self) -> OfflinePriority;
}

impl Prioritized for QueueCandidate {
    fn offline_priority(&self) -> OfflinePriority {
        OfflinePriority::from_flags(self.is_starred, self.is_read)
    }
}
