//! Unit coverage for the validator and the lifecycle engine, run against the
//! in-memory store so every invariant is exercised without a live database.
//!
//! These are deliberately narrow: one rule per test, mostly unhappy paths.
//! The end-to-end flows live in `scenarios.rs`.

use skill_swap::error::SwapError;
use skill_swap::service::SwapService;
use skill_swap::skill::{Skill, SkillLevel};
use skill_swap::store::MemoryStore;
use skill_swap::swap::{MAX_FEEDBACK_COMMENT, MAX_MESSAGE, SwapDraft, SwapStatus, Transition};
use skill_swap::user::{ProfileUpdate, User, UserDraft};
use skill_swap::validate;

fn service() -> SwapService<MemoryStore> {
    SwapService::new(MemoryStore::new())
}

fn react() -> Skill {
    Skill::new("React", SkillLevel::Expert)
}

fn python() -> Skill {
    Skill::new("Python", SkillLevel::Intermediate)
}

fn register(service: &SwapService<MemoryStore>, username: &str) -> User {
    service
        .register_user(UserDraft::new(username, "Test User"))
        .unwrap()
}

mod validator_tests {
    use super::*;

    /// Self-swap wins over every other creation failure.
    #[test]
    fn self_swap_is_checked_first() {
        let result = validate::validate_creation("user_1a", "user_1a", None, true);
        assert!(matches!(result, Err(SwapError::SelfSwap)));
    }

    #[test]
    fn missing_recipient_is_not_found() {
        let result = validate::validate_creation("user_1a", "user_1b", None, false);
        assert!(matches!(result, Err(SwapError::NotFound { .. })));
    }

    #[test]
    fn private_recipient_is_refused() {
        let service = service();
        let hidden = service
            .register_user(UserDraft::new("greta", "Greta Hidden").set_private())
            .unwrap();

        let result = validate::validate_creation("user_1a", &hidden.id, Some(&hidden), false);
        assert!(matches!(result, Err(SwapError::PrivateProfile)));
    }

    #[test]
    fn duplicate_pending_is_refused() {
        let service = service();
        let bob = register(&service, "bob");

        let result = validate::validate_creation("user_1a", &bob.id, Some(&bob), true);
        assert!(matches!(result, Err(SwapError::DuplicateRequest)));
    }

    /// Duplicate matching keys on skill names only; levels and descriptions
    /// are ignored.
    #[test]
    fn duplicate_matching_ignores_levels() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();

        assert!(validate::is_duplicate_of(
            &view.request,
            &ada.id,
            &bob.id,
            "React",
            "Python"
        ));
        assert!(!validate::is_duplicate_of(
            &view.request,
            &ada.id,
            &bob.id,
            "React",
            "Rust"
        ));
        // reversed direction is not a duplicate
        assert!(!validate::is_duplicate_of(
            &view.request,
            &bob.id,
            &ada.id,
            "React",
            "Python"
        ));
    }

    /// Settled requests never block a new one for the same skills.
    #[test]
    fn non_pending_requests_are_not_duplicates() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();
        let view = service.reject_request(&bob.id, &view.request.id).unwrap();

        assert!(!validate::is_duplicate_of(
            &view.request,
            &ada.id,
            &bob.id,
            "React",
            "Python"
        ));
        // and the service accepts a fresh request after the rejection
        assert!(
            service
                .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
                .is_ok()
        );
    }
}

mod authorization_tests {
    use super::*;

    /// Only the recipient may accept or reject; not the requester, not a
    /// stranger.
    #[test]
    fn accept_and_reject_are_recipient_only() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let eve = register(&service, "eve");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();

        for actor in [&ada.id, &eve.id] {
            let accept = service.accept_request(actor, &view.request.id);
            assert!(matches!(accept, Err(SwapError::Unauthorized(_))));
            let reject = service.reject_request(actor, &view.request.id);
            assert!(matches!(reject, Err(SwapError::Unauthorized(_))));
        }
    }

    /// Only the requester may cancel.
    #[test]
    fn cancel_is_requester_only() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let eve = register(&service, "eve");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();

        for actor in [&bob.id, &eve.id] {
            let cancel = service.cancel_request(actor, &view.request.id);
            assert!(matches!(cancel, Err(SwapError::Unauthorized(_))));
        }
    }

    /// Complete is open to both participants but nobody else.
    #[test]
    fn complete_is_participant_only() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let eve = register(&service, "eve");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();
        service.accept_request(&bob.id, &view.request.id).unwrap();

        let outsider = service.complete_swap(&eve.id, &view.request.id);
        assert!(matches!(outsider, Err(SwapError::Unauthorized(_))));

        assert!(service.complete_swap(&bob.id, &view.request.id).is_ok());
    }

    /// A stranger probing a request learns nothing about its state: the
    /// answer is `Unauthorized` even when the status precondition also fails.
    #[test]
    fn authorization_is_checked_before_state() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();
        let view = service.reject_request(&bob.id, &view.request.id).unwrap();

        let result = validate::validate_transition(&view.request, "user_1stranger", Transition::Accept);
        assert!(matches!(result, Err(SwapError::Unauthorized(_))));
    }
}

mod state_tests {
    use super::*;

    /// A retried accept must fail loudly, not succeed silently.
    #[test]
    fn accept_twice_fails_with_state_detail() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();
        service.accept_request(&bob.id, &view.request.id).unwrap();

        let again = service.accept_request(&bob.id, &view.request.id);
        assert!(matches!(
            again,
            Err(SwapError::InvalidState {
                current: SwapStatus::Accepted,
                required: SwapStatus::Pending,
            })
        ));
    }

    /// Complete before accept is premature.
    #[test]
    fn complete_requires_accepted() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();

        let premature = service.complete_swap(&ada.id, &view.request.id);
        assert!(matches!(
            premature,
            Err(SwapError::InvalidState {
                current: SwapStatus::Pending,
                required: SwapStatus::Accepted,
            })
        ));
    }

    /// A retried complete must not increment the counters a second time.
    #[test]
    fn double_complete_does_not_double_count() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();
        service.accept_request(&bob.id, &view.request.id).unwrap();
        service.complete_swap(&ada.id, &view.request.id).unwrap();

        let again = service.complete_swap(&bob.id, &view.request.id);
        assert!(matches!(again, Err(SwapError::InvalidState { .. })));
        assert_eq!(service.get_user(&ada.id, &ada.id).unwrap().completed_swaps, 1);
        assert_eq!(service.get_user(&bob.id, &bob.id).unwrap().completed_swaps, 1);
    }

    /// Transitions on a missing id are `NotFound`, distinct from the
    /// authorization failure a stranger would see.
    #[test]
    fn missing_request_is_not_found() {
        let service = service();
        let ada = register(&service, "ada");

        let result = service.accept_request(&ada.id, "swap_1missing");
        assert!(matches!(result, Err(SwapError::NotFound { .. })));
    }
}

mod feedback_tests {
    use super::*;

    fn completed_swap(
        service: &SwapService<MemoryStore>,
    ) -> (User, User, String) {
        let ada = register(service, "ada");
        let bob = register(service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();
        service.accept_request(&bob.id, &view.request.id).unwrap();
        service.complete_swap(&ada.id, &view.request.id).unwrap();
        (ada, bob, view.request.id)
    }

    #[test]
    fn feedback_requires_completed_status() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");
        let view = service
            .create_request(&ada.id, SwapDraft::new(&bob.id, react(), python()))
            .unwrap();

        let early = service.submit_feedback(&ada.id, &view.request.id, 5, None);
        assert!(matches!(
            early,
            Err(SwapError::InvalidState {
                current: SwapStatus::Pending,
                required: SwapStatus::Completed,
            })
        ));
    }

    #[test]
    fn feedback_is_participant_only() {
        let service = service();
        let (_, _, swap_id) = completed_swap(&service);
        let eve = register(&service, "eve");

        let outsider = service.submit_feedback(&eve.id, &swap_id, 5, None);
        assert!(matches!(outsider, Err(SwapError::Unauthorized(_))));
    }

    #[test]
    fn out_of_range_ratings_are_rejected() {
        let service = service();
        let (ada, _, swap_id) = completed_swap(&service);

        for rating in [0u8, 6] {
            let result = service.submit_feedback(&ada.id, &swap_id, rating, None);
            assert!(matches!(result, Err(SwapError::InvalidRating(r)) if r == rating));
        }
    }

    #[test]
    fn overlong_comment_is_rejected() {
        let service = service();
        let (ada, _, swap_id) = completed_swap(&service);

        let comment = "x".repeat(MAX_FEEDBACK_COMMENT + 1);
        let result = service.submit_feedback(&ada.id, &swap_id, 5, Some(comment));
        assert!(matches!(result, Err(SwapError::Validation(_))));
    }

    /// The rating side effect fires exactly once per slot.
    #[test]
    fn duplicate_feedback_leaves_rating_untouched() {
        let service = service();
        let (ada, bob, swap_id) = completed_swap(&service);
        service.submit_feedback(&ada.id, &swap_id, 3, None).unwrap();

        let again = service.submit_feedback(&ada.id, &swap_id, 5, None);
        assert!(matches!(again, Err(SwapError::DuplicateFeedback)));

        let bob_after = service.get_user(&bob.id, &bob.id).unwrap();
        assert_eq!(bob_after.rating.count, 1);
        assert!((bob_after.rating.average - 3.0).abs() < 1e-9);
    }

    /// A rejected rating must not half-write the slot.
    #[test]
    fn failed_feedback_leaves_slot_empty() {
        let service = service();
        let (ada, _, swap_id) = completed_swap(&service);

        let _ = service.submit_feedback(&ada.id, &swap_id, 0, None);
        let view = service.get_request(&ada.id, &swap_id).unwrap();
        assert!(view.request.requester_feedback.is_none());

        assert!(service.submit_feedback(&ada.id, &swap_id, 4, None).is_ok());
    }
}

mod field_shape_tests {
    use super::*;

    #[test]
    fn overlong_message_is_rejected_before_any_write() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");

        let draft = SwapDraft::new(&bob.id, react(), python())
            .set_message("x".repeat(MAX_MESSAGE + 1));
        let result = service.create_request(&ada.id, draft);
        assert!(matches!(result, Err(SwapError::Validation(_))));
        assert_eq!(service.list_sent(&ada.id, None, 1, 10).unwrap().total, 0);
    }

    #[test]
    fn nameless_skill_is_rejected() {
        let service = service();
        let ada = register(&service, "ada");
        let bob = register(&service, "bob");

        let draft = SwapDraft::new(&bob.id, Skill::new("", SkillLevel::Expert), python());
        let result = service.create_request(&ada.id, draft);
        assert!(matches!(result, Err(SwapError::Validation(_))));
    }

    #[test]
    fn profile_update_validates_before_touching_the_user() {
        let service = service();
        let ada = register(&service, "ada");

        let update = ProfileUpdate {
            bio: Some("x".repeat(501)),
            ..Default::default()
        };
        let result = service.update_profile(&ada.id, update);
        assert!(matches!(result, Err(SwapError::Validation(_))));
        assert_eq!(service.get_user(&ada.id, &ada.id).unwrap().bio, "");
    }

    #[test]
    fn profile_update_round_trip() {
        let service = service();
        let ada = register(&service, "ada");

        let update = ProfileUpdate {
            bio: Some("mathematician".into()),
            skills_offered: Some(vec![react()]),
            is_public: Some(false),
            ..Default::default()
        };
        let updated = service.update_profile(&ada.id, update).unwrap();

        assert_eq!(updated.bio, "mathematician");
        assert_eq!(updated.skills_offered, vec![react()]);
        assert!(!updated.is_public);
    }
}
