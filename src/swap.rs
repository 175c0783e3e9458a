//! Swap request entity: the bilateral transaction moved by the lifecycle engine
use crate::error::SwapError;
use crate::skill::Skill;
use crate::user::UserSummary;
use crate::utils::TimeStamp;
use chrono::Utc;
use std::fmt;

pub const MAX_MESSAGE: usize = 500;
pub const MAX_FEEDBACK_COMMENT: usize = 300;

/// Lifecycle states. `Pending` branches to `Accepted`, `Rejected` or
/// `Cancelled`; `Accepted` only ever moves to `Completed`. Nothing returns to
/// `Pending` once it has left.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Completed,
    #[n(4)]
    Cancelled,
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingType {
    #[n(0)]
    Online,
    #[n(1)]
    InPerson,
    #[n(2)]
    Flexible,
}

impl Default for MeetingType {
    fn default() -> Self {
        Self::Flexible
    }
}

/// Per-participant rating/comment record on a completed swap. Each slot can
/// be written at most once, ever.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Feedback {
    #[n(0)]
    pub rating: u8,
    #[n(1)]
    pub comment: Option<String>,
    #[n(2)]
    pub submitted_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct SwapRequest {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded under "swap_"
    // Immutable participant pair; requester != recipient is enforced on
    // the create path.
    #[n(1)]
    pub requester: String,
    #[n(2)]
    pub recipient: String,
    // Skills are snapshotted at creation, not live references into the
    // participants' skill lists.
    #[n(3)]
    pub offered_skill: Skill,
    #[n(4)]
    pub requested_skill: Skill,
    #[n(5)]
    pub status: SwapStatus,
    #[n(6)]
    pub message: Option<String>,
    #[n(7)]
    pub scheduled_date: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub duration: Option<String>,
    #[n(9)]
    pub meeting_type: MeetingType,
    #[n(10)]
    pub requester_feedback: Option<Feedback>,
    #[n(11)]
    pub recipient_feedback: Option<Feedback>,
    // Optimistic-concurrency token; bumped on every persisted mutation.
    #[n(12)]
    pub revision: u64,
    #[n(13)]
    pub created_at: TimeStamp<Utc>,
    #[n(14)]
    pub updated_at: TimeStamp<Utc>,
}

impl SwapRequest {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.requester == user_id || self.recipient == user_id
    }

    /// The other half of the pair, if `user_id` is a participant at all.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.requester == user_id {
            Some(&self.recipient)
        } else if self.recipient == user_id {
            Some(&self.requester)
        } else {
            None
        }
    }

    /// The feedback already submitted by `user_id`, if any.
    pub fn feedback_from(&self, user_id: &str) -> Option<&Feedback> {
        if self.requester == user_id {
            self.requester_feedback.as_ref()
        } else if self.recipient == user_id {
            self.recipient_feedback.as_ref()
        } else {
            None
        }
    }

    pub(crate) fn set_feedback(&mut self, user_id: &str, feedback: Feedback) {
        if self.requester == user_id {
            self.requester_feedback = Some(feedback);
        } else if self.recipient == user_id {
            self.recipient_feedback = Some(feedback);
        }
    }

    pub(crate) fn touch(&mut self, now: TimeStamp<Utc>) {
        self.revision += 1;
        self.updated_at = now;
    }
}

/// The transition kinds the validator can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accept,
    Reject,
    Cancel,
    Complete,
    SubmitFeedback,
}

impl Transition {
    /// The status a request must hold for this transition to apply.
    pub fn required_status(self) -> SwapStatus {
        match self {
            Self::Accept | Self::Reject | Self::Cancel => SwapStatus::Pending,
            Self::Complete => SwapStatus::Accepted,
            Self::SubmitFeedback => SwapStatus::Completed,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Accept => "accept this swap request",
            Self::Reject => "reject this swap request",
            Self::Cancel => "cancel this swap request",
            Self::Complete => "complete this swap",
            Self::SubmitFeedback => "submit feedback for this swap",
        }
    }
}

/// Side effects a transition applies to the participant users. Applied inside
/// the same store commit as the swap write so counters and ratings can never
/// drift from the status that triggered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEffect {
    IncrementCompleted { user_id: String },
    ApplyRating { user_id: String, rating: u8 },
}

impl UserEffect {
    pub fn user_id(&self) -> &str {
        match self {
            Self::IncrementCompleted { user_id } | Self::ApplyRating { user_id, .. } => user_id,
        }
    }
}

/// Creation input for a swap request, in draft form.
#[derive(Debug, Clone)]
pub struct SwapDraft {
    pub recipient: String,
    pub offered_skill: Skill,
    pub requested_skill: Skill,
    pub message: Option<String>,
    pub scheduled_date: Option<TimeStamp<Utc>>,
    pub duration: Option<String>,
    pub meeting_type: MeetingType,
}

impl SwapDraft {
    pub fn new(recipient: impl Into<String>, offered_skill: Skill, requested_skill: Skill) -> Self {
        Self {
            recipient: recipient.into(),
            offered_skill,
            requested_skill,
            message: None,
            scheduled_date: None,
            duration: None,
            meeting_type: MeetingType::default(),
        }
    }
    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
    pub fn set_scheduled_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.scheduled_date = Some(date);
        self
    }
    pub fn set_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
    pub fn set_meeting_type(mut self, meeting_type: MeetingType) -> Self {
        self.meeting_type = meeting_type;
        self
    }

    /// Field-shape checks; business rules (self-swap, duplicates, privacy)
    /// live in the validator.
    pub fn validate(&self) -> Result<(), SwapError> {
        self.offered_skill.validate()?;
        self.requested_skill.validate()?;
        if let Some(message) = &self.message {
            if message.chars().count() > MAX_MESSAGE {
                return Err(SwapError::Validation(format!(
                    "message cannot exceed {MAX_MESSAGE} characters"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_request(
        self,
        id: String,
        requester: &str,
        now: TimeStamp<Utc>,
    ) -> SwapRequest {
        SwapRequest {
            id,
            requester: requester.to_owned(),
            recipient: self.recipient,
            offered_skill: self.offered_skill,
            requested_skill: self.requested_skill,
            status: SwapStatus::Pending,
            message: self.message,
            scheduled_date: self.scheduled_date,
            duration: self.duration,
            meeting_type: self.meeting_type,
            requester_feedback: None,
            recipient_feedback: None,
            revision: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A swap request with its participant pair resolved to summaries, the shape
/// handed back to callers of the lifecycle engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapView {
    pub request: SwapRequest,
    pub requester: UserSummary,
    pub recipient: UserSummary,
}
