//! Pure business-rule checks run before every mutating lifecycle transition.
//!
//! Nothing in here touches the store; callers gather the inputs and the
//! checks only decide. That keeps every invariant testable without a live
//! database.
use crate::error::SwapError;
use crate::swap::{MAX_FEEDBACK_COMMENT, SwapRequest, Transition};
use crate::user::User;

/// Creation-time rules, in precedence order: self-swap, recipient existence,
/// recipient visibility, duplicate pending request.
pub fn validate_creation(
    requester_id: &str,
    recipient_id: &str,
    recipient: Option<&User>,
    duplicate_pending: bool,
) -> Result<(), SwapError> {
    if requester_id == recipient_id {
        return Err(SwapError::SelfSwap);
    }
    let recipient = recipient.ok_or_else(|| SwapError::user_not_found(recipient_id))?;
    if !recipient.is_public {
        return Err(SwapError::PrivateProfile);
    }
    if duplicate_pending {
        return Err(SwapError::DuplicateRequest);
    }
    Ok(())
}

/// Whether `existing` makes a new (requester, recipient, offered, requested)
/// request a duplicate. Matching is on skill **name** only; a request for the
/// same skill at a different level is still a duplicate.
pub fn is_duplicate_of(
    existing: &SwapRequest,
    requester_id: &str,
    recipient_id: &str,
    offered_name: &str,
    requested_name: &str,
) -> bool {
    existing.status == crate::swap::SwapStatus::Pending
        && existing.requester == requester_id
        && existing.recipient == recipient_id
        && existing.offered_skill.name == offered_name
        && existing.requested_skill.name == requested_name
}

/// Authorization plus status precondition for one transition. Authorization
/// is checked first so strangers learn nothing about the request's state.
pub fn validate_transition(
    request: &SwapRequest,
    actor_id: &str,
    kind: Transition,
) -> Result<(), SwapError> {
    let authorized = match kind {
        Transition::Accept | Transition::Reject => request.recipient == actor_id,
        Transition::Cancel => request.requester == actor_id,
        Transition::Complete | Transition::SubmitFeedback => request.is_participant(actor_id),
    };
    if !authorized {
        return Err(SwapError::Unauthorized(kind.describe()));
    }
    let required = kind.required_status();
    if request.status != required {
        return Err(SwapError::InvalidState {
            current: request.status,
            required,
        });
    }
    Ok(())
}

/// Feedback rules on top of the plain transition check: at most one
/// submission per participant, rating within 1..=5, bounded comment.
pub fn validate_feedback(
    request: &SwapRequest,
    actor_id: &str,
    rating: u8,
    comment: Option<&str>,
) -> Result<(), SwapError> {
    validate_transition(request, actor_id, Transition::SubmitFeedback)?;
    if request.feedback_from(actor_id).is_some() {
        return Err(SwapError::DuplicateFeedback);
    }
    if !(1..=5).contains(&rating) {
        return Err(SwapError::InvalidRating(rating));
    }
    if let Some(comment) = comment {
        if comment.chars().count() > MAX_FEEDBACK_COMMENT {
            return Err(SwapError::Validation(format!(
                "feedback comment cannot exceed {MAX_FEEDBACK_COMMENT} characters"
            )));
        }
    }
    Ok(())
}
