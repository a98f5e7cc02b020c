//! Decides how a new intent enters the queue.
//!
//! Rules, applied in order:
//!
//! - `like`/`unlike`: an opposite reaction already queued for the same
//!   (target, actor) annihilates with the candidate; a same-kind reaction is
//!   replaced by the candidate. At most one reaction per pair is ever queued.
//! - `remove_comment` for a comment whose `add_comment` is still queued removes
//!   that `add_comment` and drops the candidate: the comment never reaches the
//!   backend.
//! - Everything else is appended. An `update_post` followed by a
//!   `delete_post` for the same post are both kept; the backend applies them
//!   in order.
//!
//! This is pure logic: no IO, no persistence.

use crate::action::{Action, PendingAction};

/// What happened to an admitted candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The candidate was added at the end of the queue.
    Appended,
    /// The candidate replaced an equivalent queued action (returned).
    Replaced(PendingAction),
    /// The candidate and the returned queued action cancelled each other.
    /// Neither is in the queue any more.
    Cancelled(PendingAction),
}

impl Admission {
    /// Whether the queue grew or kept an action for this intent.
    pub fn is_queued(&self) -> bool {
        !matches!(self, Admission::Cancelled(_))
    }
}

/// Admit `candidate` into `queue`, applying cancellation rules.
pub fn admit(queue: &mut Vec<PendingAction>, candidate: PendingAction) -> Admission {
    match &candidate.action {
        Action::Like | Action::Unlike => {
            let existing = queue
                .iter()
                .position(|queued| queued.kind().is_reaction() && queued.same_subject(&candidate));

            match existing {
                Some(pos) => {
                    let previous = queue.remove(pos);
                    if previous.kind() == candidate.kind() {
                        tracing::debug!(
                            target_id = %candidate.target_id,
                            kind = %candidate.kind(),
                            "replacing queued reaction"
                        );
                        queue.push(candidate);
                        Admission::Replaced(previous)
                    } else {
                        tracing::debug!(
                            target_id = %candidate.target_id,
                            kind = %candidate.kind(),
                            "opposite reaction cancelled queued {}",
                            previous.kind()
                        );
                        Admission::Cancelled(previous)
                    }
                }
                None => {
                    queue.push(candidate);
                    Admission::Appended
                }
            }
        }
        Action::RemoveComment { comment_id } => {
            let unsent = queue.iter().position(|queued| {
                queued.target_id == candidate.target_id
                    && matches!(&queued.action, Action::AddComment { comment_id: added, .. } if added == comment_id)
            });

            match unsent {
                Some(pos) => {
                    tracing::debug!(
                        target_id = %candidate.target_id,
                        comment_id = %comment_id,
                        "comment removed before it was sent"
                    );
                    Admission::Cancelled(queue.remove(pos))
                }
                None => {
                    queue.push(candidate);
                    Admission::Appended
                }
            }
        }
        Action::AddComment { .. } | Action::UpdatePost { .. } | Action::DeletePost => {
            queue.push(candidate);
            Admission::Appended
        }
    }
}

/// By-value form of [`admit`]: returns the updated queue.
pub fn add_action(mut queue: Vec<PendingAction>, candidate: PendingAction) -> Vec<PendingAction> {
    admit(&mut queue, candidate);
    queue
}
