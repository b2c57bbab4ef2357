//! Two-phase capture attachment
//!
//! Listener attachment is scheduled first and performed once the host polls
//! past the ready time. Cancelling is allowed in any state and is final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CaptureState {
    Pending,
    Scheduled { ready_at: DateTime<Utc> },
    Attached { attached_at: DateTime<Utc> },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    state: CaptureState,
}

impl Default for CaptureHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureHandle {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Pending,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Schedule attachment; returns false unless the handle was pending
    pub fn schedule(&mut self, ready_at: DateTime<Utc>) -> bool {
        match self.state {
            CaptureState::Pending => {
                self.state = CaptureState::Scheduled { ready_at };
                true
            }
            _ => false,
        }
    }

    /// Attach if scheduled and due; returns true only on the transition
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CaptureState::Scheduled { ready_at } if now >= ready_at => {
                self.state = CaptureState::Attached { attached_at: now };
                true
            }
            _ => false,
        }
    }

    /// Cancel; returns true when a live attachment was torn down
    pub fn cancel(&mut self) -> bool {
        let was_attached = self.is_attached();
        self.state = CaptureState::Cancelled;
        was_attached
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, CaptureState::Attached { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == CaptureState::Cancelled
    }
}
