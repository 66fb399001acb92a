//! Per-identity sequence number discipline.
//!
//! One number outstanding at a time; the counter advances only when the
//! outstanding number is known consumed on-chain. A confirmation
//! timeout leaves the number in limbo, so the tracker parks until
//! reconciled against the authoritative account sequence.

use crate::domain::AccountId;
use crate::error::SchedulingError;

#[derive(Debug)]
pub struct SequenceTracker {
    account: AccountId,
    next: u64,
    outstanding: Option<u64>,
    parked: bool,
}

impl SequenceTracker {
    /// `initial` is the authoritative next usable number, so a restart
    /// resumes where the chain says, not where a local counter stopped.
    pub fn new(account: AccountId, initial: u64) -> Self {
        Self {
            account,
            next: initial,
            outstanding: None,
            parked: false,
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Hand out the next number. Fails while a number is outstanding or
    /// the tracker is parked.
    pub fn allocate(&mut self) -> Result<u64, SchedulingError> {
        if self.parked {
            return Err(SchedulingError::AwaitingReconciliation {
                identity: self.account.as_str().to_string(),
            });
        }
        if self.outstanding.is_some() {
            return Err(SchedulingError::Saturated {
                identity: self.account.as_str().to_string(),
                depth: 1,
            });
        }
        let sequence = self.next;
        self.outstanding = Some(sequence);
        Ok(sequence)
    }

    /// The outstanding number reached a terminal state. `consumed`
    /// advances the counter; otherwise the number is in limbo and the
    /// tracker parks.
    pub fn resolve(&mut self, sequence: u64, consumed: bool) {
        debug_assert_eq!(self.outstanding, Some(sequence));
        self.outstanding = None;
        if consumed {
            self.next = sequence + 1;
        } else {
            self.parked = true;
        }
    }

    /// The number was never accepted anywhere (dispatch skipped, or the
    /// broadcast was explicitly rejected); it goes back unassigned and
    /// is handed out again next.
    pub fn cancel(&mut self, sequence: u64) {
        debug_assert_eq!(self.outstanding, Some(sequence));
        self.outstanding = None;
    }

    /// Adopt the authoritative next sequence and unpark.
    pub fn resync(&mut self, authoritative_next: u64) {
        self.next = authoritative_next;
        self.outstanding = None;
        self.parked = false;
    }
}
