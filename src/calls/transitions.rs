// ABOUTME: Legality rules for call status transitions
// ABOUTME: Terminal states are immutable; webhooks may only move a call forward
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Transition legality for the call state machine.
//!
//! The happy path is `Initiated -> Ringing -> InProgress -> Completed`.
//! Providers drop or reorder webhooks, so skipping forward along the happy
//! path is legal (`Initiated -> InProgress` when the `ringing` webhook was
//! lost). Alternative terminals (`Failed`, `NoAnswer`, `Busy`, `Canceled`)
//! are reachable only before the call is answered. Nothing leaves a terminal
//! state, and a repeated status is not a transition.

use crate::models::CallStatus;

/// Whether moving a call from `from` to `to` is a legal forward transition
#[must_use]
pub const fn is_valid_transition(from: CallStatus, to: CallStatus) -> bool {
    use CallStatus::{Busy, Canceled, Completed, Failed, InProgress, Initiated, NoAnswer, Ringing};

    if from.is_terminal() {
        return false;
    }

    match (from, to) {
        // Duplicate webhook: same status is a no-op, not a transition
        (Initiated, Initiated) | (Ringing, Ringing) | (InProgress, InProgress) => false,

        // Forward along the happy path, with skip-ahead for lost webhooks
        (Initiated, Ringing | InProgress | Completed)
        | (Ringing, InProgress | Completed)
        | (InProgress, Completed) => true,

        // Alternative terminals, only before the call is answered
        (Initiated | Ringing, Failed | NoAnswer | Busy | Canceled) => true,

        _ => false,
    }
}
