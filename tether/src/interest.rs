//! Socket interest and readiness sets.

/// What the transport wants to be told about a descriptor. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
    Both,
}

impl Interest {
    /// Build an interest from flags. Returns `None` when neither is set.
    pub fn from_flags(readable: bool, writable: bool) -> Option<Self> {
        match (readable, writable) {
            (true, true) => Some(Interest::Both),
            (true, false) => Some(Interest::Readable),
            (false, true) => Some(Interest::Writable),
            (false, false) => None,
        }
    }

    #[inline]
    pub fn is_readable(self) -> bool {
        matches!(self, Interest::Readable | Interest::Both)
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, Interest::Writable | Interest::Both)
    }
}

/// Readiness reported by the event loop for one descriptor.
///
/// Several conditions may be set at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// Error or hang-up condition on the descriptor.
    pub error: bool,
}

impl Readiness {
    pub const READABLE: Readiness = Readiness {
        readable: true,
        writable: false,
        error: false,
    };

    pub const WRITABLE: Readiness = Readiness {
        readable: false,
        writable: true,
        error: false,
    };

    /// Readiness matching every condition in `interest`.
    pub fn from_interest(interest: Interest) -> Self {
        Readiness {
            readable: interest.is_readable(),
            writable: interest.is_writable(),
            error: false,
        }
    }

    /// No condition set.
    pub fn is_empty(self) -> bool {
        !(self.readable || self.writable || self.error)
    }
}
