//! Bookkeeping that decides which player-list responses may still be applied.
//!
//! Every fetch is issued with a [`RefreshTicket`]. Only the most recently issued
//! ticket of the current mount may update the view; anything older, or anything
//! that completes after the view went away, is discarded.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RefreshTicket {
    mount: u64,
    sequence: u64,
}

impl RefreshTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshDisposition {
    Apply,
    /// A newer request was issued after this one.
    Superseded,
    /// The view was unmounted (or remounted) since the request was issued.
    Detached,
}

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    mount: u64,
    mounted: bool,
    issued: u64,
    latest: Option<u64>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self) {
        self.mount += 1;
        self.mounted = true;
        self.latest = None;
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        self.latest = None;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Total number of refreshes issued over the coordinator's lifetime.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn is_pending(&self) -> bool {
        self.mounted && self.latest.is_some()
    }

    pub fn issue(&mut self) -> RefreshTicket {
        self.issued += 1;
        self.latest = Some(self.issued);
        RefreshTicket {
            mount: self.mount,
            sequence: self.issued,
        }
    }

    pub fn settle(&mut self, ticket: RefreshTicket) -> RefreshDisposition {
        if !self.mounted || ticket.mount != self.mount {
            return RefreshDisposition::Detached;
        }
        if self.latest != Some(ticket.sequence) {
            return RefreshDisposition::Superseded;
        }
        self.latest = None;
        RefreshDisposition::Apply
    }
}
