//! Read-transition state for a chat.

/// Per-chat progress of the optimistic mark-read flow.
///
/// Opening a chat applies the optimistic read locally (`Opening`, then
/// `PendingConfirm`) before the server call resolves. The phase ends at
/// `Read` whether or not the confirmation succeeded: a transient mark-read
/// failure never resurrects a badge the user already dismissed; the next
/// full resync repairs any divergence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadPhase {
    #[default]
    Unopened,
    Opening,
    PendingConfirm,
    Read,
}
