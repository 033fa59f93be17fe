use super::types::ConversationHistory;

/// Turns replayed downstream while a clarification is pending: one
/// user/system pair.
pub const REPLAYED_TURNS: usize = 2;

/// Sole owner of the `need_more_info` flag.
///
/// Stateless: the flag travels with the client and comes back on the next
/// call, so both operations are pure functions of their inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateTracker;

impl StateTracker {
    /// History forwarded to resolvers for this turn. A previous turn that did
    /// not ask for clarification resets the context to a fresh question.
    pub fn prepare_history(
        need_more_info: bool,
        full_history: &ConversationHistory,
    ) -> ConversationHistory {
        if need_more_info {
            full_history.last(REPLAYED_TURNS)
        } else {
            ConversationHistory::new()
        }
    }

    /// Next turn's flag from the resolver's clarification signal.
    pub fn update(clarification_requested: Option<bool>) -> bool {
        clarification_requested.unwrap_or(false)
    }
}
