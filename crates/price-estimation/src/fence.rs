use std::sync::atomic::{AtomicU64, Ordering};

/// Sequence number of a request issued through a [`Fence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Orders requests so that the response of a request which has since been
/// superseded by a newer one can be recognized and dropped.
#[derive(Debug, Default)]
pub struct Fence {
    issued: AtomicU64,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket that is greater than all tickets issued before.
    pub fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether no ticket was issued after `ticket`.
    pub fn is_latest(&self, ticket: Ticket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    #[test]
    fn only_latest_ticket_is_current() {
        let fence = Fence::new();
        let first = fence.issue();
        assert!(fence.is_latest(first));

        let second = fence.issue();
        assert!(second > first);
        assert!(!fence.is_latest(first));
        assert!(fence.is_latest(second));
    }

    #[test]
    fn tickets_are_unique_across_threads() {
        let fence = Arc::new(Fence::new());
        let handles = (0..4)
            .map(|_| {
                let fence = fence.clone();
                std::thread::spawn(move || (0..100).map(|_| fence.issue()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();
        let mut tickets = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        tickets.sort();
        tickets.dedup();
        assert_eq!(tickets.len(), 400);
        assert!(fence.is_latest(*tickets.last().unwrap()));
    }
}
