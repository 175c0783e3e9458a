//! Lifecycle engine for swap requests, plus the user-profile surface
use crate::error::{StoreError, SwapError};
use crate::store::{Page, Role, SwapCommit, SwapFilter, SwapStore, SwapWrite};
use crate::swap::{
    Feedback, SwapDraft, SwapRequest, SwapStatus, SwapView, Transition, UserEffect,
};
use crate::user::{ProfileUpdate, User, UserDraft, UserSummary};
use crate::utils::{self, SWAP_ID_PREFIX, TimeStamp, USER_ID_PREFIX};
use crate::validate;
use tracing::{info, warn};

/// The engine. Generic over the store so every invariant can be exercised
/// against [`crate::store::MemoryStore`] as well as sled.
pub struct SwapService<S: SwapStore> {
    store: S,
}

/// Internal transition payloads; the public surface exposes one method per
/// transition instead.
enum Action {
    Accept,
    Reject,
    Cancel,
    Complete,
    Feedback { rating: u8, comment: Option<String> },
}

impl Action {
    fn kind(&self) -> Transition {
        match self {
            Self::Accept => Transition::Accept,
            Self::Reject => Transition::Reject,
            Self::Cancel => Transition::Cancel,
            Self::Complete => Transition::Complete,
            Self::Feedback { .. } => Transition::SubmitFeedback,
        }
    }
}

impl<S: SwapStore> SwapService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // ---- user surface ----

    pub fn register_user(&self, draft: UserDraft) -> Result<User, SwapError> {
        draft.validate()?;
        let id = utils::new_prefixed_id(USER_ID_PREFIX)?;
        let user = draft.into_user(id, TimeStamp::now());
        self.store.save_user(&user)?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Full profile lookup: public profiles are visible to anyone, private
    /// ones only to their owner.
    pub fn get_user(&self, actor_id: &str, user_id: &str) -> Result<User, SwapError> {
        let user = self
            .store
            .find_user(user_id)?
            .ok_or_else(|| SwapError::user_not_found(user_id))?;
        if !user.is_public && user.id != actor_id {
            return Err(SwapError::PrivateProfile);
        }
        Ok(user)
    }

    pub fn update_profile(
        &self,
        actor_id: &str,
        update: ProfileUpdate,
    ) -> Result<User, SwapError> {
        update.validate()?;
        let mut user = self
            .store
            .find_user(actor_id)?
            .ok_or_else(|| SwapError::user_not_found(actor_id))?;
        update.apply_to(&mut user);
        user.updated_at = TimeStamp::now();
        self.store.save_user(&user)?;
        Ok(user)
    }

    /// Public users, newest first, excluding the actor themself.
    pub fn list_users(
        &self,
        actor_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<Page<UserSummary>, SwapError> {
        let users = self.store.list_users(actor_id, page, limit)?;
        Ok(users.map(|u| u.summary()))
    }

    // ---- swap surface ----

    pub fn create_request(&self, actor_id: &str, draft: SwapDraft) -> Result<SwapView, SwapError> {
        draft.validate()?;

        let recipient = self.store.find_user(&draft.recipient)?;
        let duplicate_pending = self.has_pending_duplicate(actor_id, &draft)?;
        validate::validate_creation(
            actor_id,
            &draft.recipient,
            recipient.as_ref(),
            duplicate_pending,
        )?;
        let recipient =
            recipient.ok_or_else(|| SwapError::user_not_found(&draft.recipient))?;
        let requester = self
            .store
            .find_user(actor_id)?
            .ok_or_else(|| SwapError::user_not_found(actor_id))?;

        let id = utils::new_prefixed_id(SWAP_ID_PREFIX)?;
        let request = draft.into_request(id, actor_id, TimeStamp::now());
        self.store
            .commit(SwapCommit::new(SwapWrite::Create(request.clone())))?;
        info!(
            swap_id = %request.id,
            requester = %request.requester,
            recipient = %request.recipient,
            "swap request created"
        );
        Ok(SwapView {
            request,
            requester: requester.summary(),
            recipient: recipient.summary(),
        })
    }

    pub fn accept_request(&self, actor_id: &str, swap_id: &str) -> Result<SwapView, SwapError> {
        self.run_transition(actor_id, swap_id, Action::Accept)
    }

    pub fn reject_request(&self, actor_id: &str, swap_id: &str) -> Result<SwapView, SwapError> {
        self.run_transition(actor_id, swap_id, Action::Reject)
    }

    /// Requester-only; the pending request is removed from the store.
    pub fn cancel_request(&self, actor_id: &str, swap_id: &str) -> Result<(), SwapError> {
        self.transition(actor_id, swap_id, Action::Cancel).map(|_| ())
    }

    /// Either participant may mark an accepted swap completed; both users'
    /// completed-swap counters move with the status, atomically.
    pub fn complete_swap(&self, actor_id: &str, swap_id: &str) -> Result<SwapView, SwapError> {
        self.run_transition(actor_id, swap_id, Action::Complete)
    }

    /// Fill the actor's feedback slot and fold the rating into the
    /// counterpart's running average, atomically.
    pub fn submit_feedback(
        &self,
        actor_id: &str,
        swap_id: &str,
        rating: u8,
        comment: Option<String>,
    ) -> Result<SwapView, SwapError> {
        self.run_transition(actor_id, swap_id, Action::Feedback { rating, comment })
    }

    /// Participant-gated read with resolved participant detail.
    pub fn get_request(&self, actor_id: &str, swap_id: &str) -> Result<SwapView, SwapError> {
        let request = self
            .store
            .find_swap(swap_id)?
            .ok_or_else(|| SwapError::swap_not_found(swap_id))?;
        if !request.is_participant(actor_id) {
            return Err(SwapError::Unauthorized("view this swap request"));
        }
        self.resolve(request)
    }

    pub fn list_sent(
        &self,
        actor_id: &str,
        status: Option<SwapStatus>,
        page: usize,
        limit: usize,
    ) -> Result<Page<SwapView>, SwapError> {
        self.list(actor_id, Role::Requester, status, page, limit)
    }

    pub fn list_received(
        &self,
        actor_id: &str,
        status: Option<SwapStatus>,
        page: usize,
        limit: usize,
    ) -> Result<Page<SwapView>, SwapError> {
        self.list(actor_id, Role::Recipient, status, page, limit)
    }

    // ---- internals ----

    fn list(
        &self,
        actor_id: &str,
        role: Role,
        status: Option<SwapStatus>,
        page: usize,
        limit: usize,
    ) -> Result<Page<SwapView>, SwapError> {
        let filter = SwapFilter {
            participant: actor_id.to_owned(),
            role,
            status,
        };
        let requests = self.store.find_swaps(&filter, page, limit)?;
        let mut views = Vec::with_capacity(requests.items.len());
        for request in requests.items {
            views.push(self.resolve(request)?);
        }
        Ok(Page {
            items: views,
            total: requests.total,
            total_pages: requests.total_pages,
            page: requests.page,
        })
    }

    fn has_pending_duplicate(&self, actor_id: &str, draft: &SwapDraft) -> Result<bool, SwapError> {
        let filter = SwapFilter {
            participant: actor_id.to_owned(),
            role: Role::Requester,
            status: Some(SwapStatus::Pending),
        };
        let pending = self.store.find_swaps(&filter, 1, usize::MAX)?;
        Ok(pending.items.iter().any(|existing| {
            validate::is_duplicate_of(
                existing,
                actor_id,
                &draft.recipient,
                &draft.offered_skill.name,
                &draft.requested_skill.name,
            )
        }))
    }

    fn run_transition(
        &self,
        actor_id: &str,
        swap_id: &str,
        action: Action,
    ) -> Result<SwapView, SwapError> {
        let request = self
            .transition(actor_id, swap_id, action)?
            .ok_or_else(|| SwapError::swap_not_found(swap_id))?;
        self.resolve(request)
    }

    /// Load, validate, apply, commit. A `RevisionConflict` means another
    /// transition landed first: reload and re-validate so the loser of a
    /// race fails its precondition against the post-transition state instead
    /// of reapplying side effects. Returns `None` only for `Cancel`.
    fn transition(
        &self,
        actor_id: &str,
        swap_id: &str,
        action: Action,
    ) -> Result<Option<SwapRequest>, SwapError> {
        loop {
            let mut request = self
                .store
                .find_swap(swap_id)?
                .ok_or_else(|| SwapError::swap_not_found(swap_id))?;

            match &action {
                Action::Feedback { rating, comment } => {
                    validate::validate_feedback(&request, actor_id, *rating, comment.as_deref())?;
                }
                _ => validate::validate_transition(&request, actor_id, action.kind())?,
            }

            let expected_revision = request.revision;
            let mut effects = Vec::new();
            let write = match &action {
                Action::Accept => {
                    request.status = SwapStatus::Accepted;
                    request.touch(TimeStamp::now());
                    SwapWrite::Update {
                        expected_revision,
                        request: request.clone(),
                    }
                }
                Action::Reject => {
                    request.status = SwapStatus::Rejected;
                    request.touch(TimeStamp::now());
                    SwapWrite::Update {
                        expected_revision,
                        request: request.clone(),
                    }
                }
                Action::Cancel => SwapWrite::Delete {
                    id: request.id.clone(),
                    expected_revision,
                },
                Action::Complete => {
                    request.status = SwapStatus::Completed;
                    request.touch(TimeStamp::now());
                    effects.push(UserEffect::IncrementCompleted {
                        user_id: request.requester.clone(),
                    });
                    effects.push(UserEffect::IncrementCompleted {
                        user_id: request.recipient.clone(),
                    });
                    SwapWrite::Update {
                        expected_revision,
                        request: request.clone(),
                    }
                }
                Action::Feedback { rating, comment } => {
                    let now = TimeStamp::now();
                    request.set_feedback(
                        actor_id,
                        Feedback {
                            rating: *rating,
                            comment: comment.clone(),
                            submitted_at: now.clone(),
                        },
                    );
                    // the counterpart exists: validate_feedback proved the
                    // actor is a participant
                    if let Some(counterpart) = request.counterpart_of(actor_id) {
                        effects.push(UserEffect::ApplyRating {
                            user_id: counterpart.to_owned(),
                            rating: *rating,
                        });
                    }
                    request.touch(now);
                    SwapWrite::Update {
                        expected_revision,
                        request: request.clone(),
                    }
                }
            };

            match self.store.commit(SwapCommit::new(write).with_effects(effects)) {
                Ok(()) => {
                    info!(
                        swap_id = %request.id,
                        actor = %actor_id,
                        status = %request.status,
                        "swap transition applied"
                    );
                    return Ok(match action {
                        Action::Cancel => None,
                        _ => Some(request),
                    });
                }
                Err(StoreError::RevisionConflict(_)) => {
                    warn!(swap_id = %swap_id, actor = %actor_id, "lost transition race, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Explicit join through the store contract: participant ids resolved to
    /// summaries for the caller.
    fn resolve(&self, request: SwapRequest) -> Result<SwapView, SwapError> {
        let requester = self
            .store
            .find_user(&request.requester)?
            .ok_or_else(|| SwapError::user_not_found(&request.requester))?;
        let recipient = self
            .store
            .find_user(&request.recipient)?
            .ok_or_else(|| SwapError::user_not_found(&request.recipient))?;
        Ok(SwapView {
            request,
            requester: requester.summary(),
            recipient: recipient.summary(),
        })
    }
}
