//! Entity store contract plus the sled-backed and in-memory implementations
use crate::error::StoreError;
use crate::swap::{SwapRequest, SwapStatus, UserEffect};
use crate::user::User;
use crate::utils::{SWAP_ID_PREFIX, USER_ID_PREFIX};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One page of a filtered listing. `total` counts every match, not just the
/// items on this page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub total_pages: usize,
    pub page: usize,
}

impl<T> Page<T> {
    /// Slice an already-filtered, already-sorted set into one page.
    /// `page` and `limit` are clamped to at least 1.
    pub fn slice(all: Vec<T>, page: usize, limit: usize) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total = all.len();
        let items = all.into_iter().skip((page - 1) * limit).take(limit).collect();
        Self {
            items,
            total,
            total_pages: total.div_ceil(limit),
            page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            total_pages: self.total_pages,
            page: self.page,
        }
    }
}

/// Which side of the participant pair a listing filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Requester,
    Recipient,
}

#[derive(Debug, Clone)]
pub struct SwapFilter {
    pub participant: String,
    pub role: Role,
    pub status: Option<SwapStatus>,
}

impl SwapFilter {
    fn matches(&self, request: &SwapRequest) -> bool {
        let side = match self.role {
            Role::Requester => &request.requester,
            Role::Recipient => &request.recipient,
        };
        *side == self.participant && self.status.is_none_or(|s| s == request.status)
    }
}

/// The swap-record write carried by a [`SwapCommit`]. Updates and deletes are
/// guarded by the revision the caller read; a mismatch means another
/// transition won the race and the commit fails with `RevisionConflict`.
#[derive(Debug, Clone)]
pub enum SwapWrite {
    Create(SwapRequest),
    Update {
        expected_revision: u64,
        request: SwapRequest,
    },
    Delete {
        id: String,
        expected_revision: u64,
    },
}

/// One lifecycle transition's worth of writes: the swap record plus the user
/// side effects that must land with it, all-or-nothing.
#[derive(Debug, Clone)]
pub struct SwapCommit {
    pub write: SwapWrite,
    pub effects: Vec<UserEffect>,
}

impl SwapCommit {
    pub fn new(write: SwapWrite) -> Self {
        Self {
            write,
            effects: Vec::new(),
        }
    }
    pub fn with_effects(mut self, effects: Vec<UserEffect>) -> Self {
        self.effects = effects;
        self
    }
}

/// Persistence contract consumed by the lifecycle engine. Implementations
/// must make [`SwapStore::commit`] atomic: either the swap write and every
/// user effect land together, or nothing does.
pub trait SwapStore: Send + Sync {
    fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    fn save_user(&self, user: &User) -> Result<(), StoreError>;
    /// Public users, newest first, excluding `exclude`.
    fn list_users(&self, exclude: &str, page: usize, limit: usize)
    -> Result<Page<User>, StoreError>;

    fn find_swap(&self, id: &str) -> Result<Option<SwapRequest>, StoreError>;
    /// Filtered swap listing, newest first.
    fn find_swaps(
        &self,
        filter: &SwapFilter,
        page: usize,
        limit: usize,
    ) -> Result<Page<SwapRequest>, StoreError>;
    fn commit(&self, commit: SwapCommit) -> Result<(), StoreError>;
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, StoreError> {
    minicbor::decode(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

fn apply_effect(user: &mut User, effect: &UserEffect) {
    match effect {
        UserEffect::IncrementCompleted { .. } => user.completed_swaps += 1,
        UserEffect::ApplyRating { rating, .. } => user.rating = user.rating.apply(*rating),
    }
}

// users and swaps share the default tree; the bech32 id prefixes keep the
// key spaces disjoint and prefix-scannable.
fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Embedded store on a shared sled handle, in the same shape the rest of the
/// process would open it.
pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn scan_decode<T: for<'b> minicbor::Decode<'b, ()>>(
        &self,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for entry in self.instance.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }
}

impl SwapStore for SledStore {
    fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        match self.instance.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.instance.insert(user.id.as_bytes(), encode(user)?)?;
        Ok(())
    }

    fn list_users(
        &self,
        exclude: &str,
        page: usize,
        limit: usize,
    ) -> Result<Page<User>, StoreError> {
        let mut users: Vec<User> = self
            .scan_decode::<User>(USER_ID_PREFIX)?
            .into_iter()
            .filter(|u| u.is_public && u.id != exclude)
            .collect();
        newest_first(&mut users, |u| (u.created_at.clone(), u.id.clone()));
        Ok(Page::slice(users, page, limit))
    }

    fn find_swap(&self, id: &str) -> Result<Option<SwapRequest>, StoreError> {
        match self.instance.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_swaps(
        &self,
        filter: &SwapFilter,
        page: usize,
        limit: usize,
    ) -> Result<Page<SwapRequest>, StoreError> {
        let mut requests: Vec<SwapRequest> = self
            .scan_decode::<SwapRequest>(SWAP_ID_PREFIX)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        newest_first(&mut requests, |r| (r.created_at.clone(), r.id.clone()));
        Ok(Page::slice(requests, page, limit))
    }

    fn commit(&self, commit: SwapCommit) -> Result<(), StoreError> {
        let result = self.instance.transaction(|tx| {
            match &commit.write {
                SwapWrite::Create(request) => {
                    if tx.get(request.id.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            StoreError::RevisionConflict(request.id.clone()),
                        ));
                    }
                    let bytes = encode(request).map_err(ConflictableTransactionError::Abort)?;
                    tx.insert(request.id.as_bytes(), bytes)?;
                }
                SwapWrite::Update {
                    expected_revision,
                    request,
                } => {
                    check_revision(tx.get(request.id.as_bytes())?, &request.id, *expected_revision)?;
                    let bytes = encode(request).map_err(ConflictableTransactionError::Abort)?;
                    tx.insert(request.id.as_bytes(), bytes)?;
                }
                SwapWrite::Delete {
                    id,
                    expected_revision,
                } => {
                    check_revision(tx.get(id.as_bytes())?, id, *expected_revision)?;
                    tx.remove(id.as_bytes())?;
                }
            }

            // side effects are read-modify-write inside the same transaction,
            // so concurrent feedback on two different swaps cannot lose a
            // rating for the shared user
            for effect in &commit.effects {
                let user_id = effect.user_id();
                let bytes = tx.get(user_id.as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(StoreError::Missing(user_id.to_owned()))
                })?;
                let mut user: User =
                    decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
                apply_effect(&mut user, effect);
                let bytes = encode(&user).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(user_id.as_bytes(), bytes)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Backend(e)),
        }
    }
}

fn check_revision(
    stored: Option<sled::IVec>,
    id: &str,
    expected: u64,
) -> Result<(), ConflictableTransactionError<StoreError>> {
    let Some(bytes) = stored else {
        return Err(ConflictableTransactionError::Abort(
            StoreError::RevisionConflict(id.to_owned()),
        ));
    };
    let current: SwapRequest = decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
    if current.revision != expected {
        return Err(ConflictableTransactionError::Abort(
            StoreError::RevisionConflict(id.to_owned()),
        ));
    }
    Ok(())
}

/// In-memory store for tests and for exercising the engine without a live
/// database. One mutex doubles as the commit transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: BTreeMap<String, User>,
    swaps: BTreeMap<String, SwapRequest>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SwapStore for MemoryStore {
    fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.locked().users.get(id).cloned())
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.locked().users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn list_users(
        &self,
        exclude: &str,
        page: usize,
        limit: usize,
    ) -> Result<Page<User>, StoreError> {
        let mut users: Vec<User> = self
            .locked()
            .users
            .values()
            .filter(|u| u.is_public && u.id != exclude)
            .cloned()
            .collect();
        newest_first(&mut users, |u| (u.created_at.clone(), u.id.clone()));
        Ok(Page::slice(users, page, limit))
    }

    fn find_swap(&self, id: &str) -> Result<Option<SwapRequest>, StoreError> {
        Ok(self.locked().swaps.get(id).cloned())
    }

    fn find_swaps(
        &self,
        filter: &SwapFilter,
        page: usize,
        limit: usize,
    ) -> Result<Page<SwapRequest>, StoreError> {
        let mut requests: Vec<SwapRequest> = self
            .locked()
            .swaps
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut requests, |r| (r.created_at.clone(), r.id.clone()));
        Ok(Page::slice(requests, page, limit))
    }

    fn commit(&self, commit: SwapCommit) -> Result<(), StoreError> {
        let mut inner = self.locked();

        match &commit.write {
            SwapWrite::Create(request) => {
                if inner.swaps.contains_key(&request.id) {
                    return Err(StoreError::RevisionConflict(request.id.clone()));
                }
            }
            SwapWrite::Update {
                expected_revision,
                request,
            } => {
                let current = inner
                    .swaps
                    .get(&request.id)
                    .ok_or_else(|| StoreError::RevisionConflict(request.id.clone()))?;
                if current.revision != *expected_revision {
                    return Err(StoreError::RevisionConflict(request.id.clone()));
                }
            }
            SwapWrite::Delete {
                id,
                expected_revision,
            } => {
                let current = inner
                    .swaps
                    .get(id)
                    .ok_or_else(|| StoreError::RevisionConflict(id.clone()))?;
                if current.revision != *expected_revision {
                    return Err(StoreError::RevisionConflict(id.clone()));
                }
            }
        }
        for effect in &commit.effects {
            if !inner.users.contains_key(effect.user_id()) {
                return Err(StoreError::Missing(effect.user_id().to_owned()));
            }
        }

        // all guards passed; apply everything
        match commit.write {
            SwapWrite::Create(request) | SwapWrite::Update { request, .. } => {
                inner.swaps.insert(request.id.clone(), request);
            }
            SwapWrite::Delete { id, .. } => {
                inner.swaps.remove(&id);
            }
        }
        for effect in &commit.effects {
            if let Some(user) = inner.users.get_mut(effect.user_id()) {
                apply_effect(user, effect);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{Skill, SkillLevel};
    use crate::swap::SwapDraft;
    use crate::user::UserDraft;
    use crate::utils::TimeStamp;

    fn user(id: &str, name: &str) -> User {
        UserDraft::new(name, "Test User").into_user(id.into(), TimeStamp::now())
    }

    fn request(id: &str, requester: &str, recipient: &str) -> SwapRequest {
        SwapDraft::new(
            recipient,
            Skill::new("React", SkillLevel::Expert),
            Skill::new("Python", SkillLevel::Intermediate),
        )
        .into_request(id.into(), requester, TimeStamp::now())
    }

    #[test]
    fn stale_update_is_rejected() {
        let store = MemoryStore::new();
        let mut req = request("swap_1a", "user_1a", "user_1b");
        store
            .commit(SwapCommit::new(SwapWrite::Create(req.clone())))
            .unwrap();

        req.touch(TimeStamp::now());
        store
            .commit(SwapCommit::new(SwapWrite::Update {
                expected_revision: 0,
                request: req.clone(),
            }))
            .unwrap();

        // second writer still holds revision 0
        let stale = store.commit(SwapCommit::new(SwapWrite::Update {
            expected_revision: 0,
            request: req,
        }));
        assert!(matches!(stale, Err(StoreError::RevisionConflict(_))));
    }

    #[test]
    fn create_twice_conflicts() {
        let store = MemoryStore::new();
        let req = request("swap_1a", "user_1a", "user_1b");
        store
            .commit(SwapCommit::new(SwapWrite::Create(req.clone())))
            .unwrap();

        let again = store.commit(SwapCommit::new(SwapWrite::Create(req)));
        assert!(matches!(again, Err(StoreError::RevisionConflict(_))));
    }

    #[test]
    fn effects_land_with_the_swap_write() {
        let store = MemoryStore::new();
        store.save_user(&user("user_1a", "ada")).unwrap();
        store.save_user(&user("user_1b", "bob")).unwrap();
        let mut req = request("swap_1a", "user_1a", "user_1b");
        store
            .commit(SwapCommit::new(SwapWrite::Create(req.clone())))
            .unwrap();

        req.touch(TimeStamp::now());
        store
            .commit(
                SwapCommit::new(SwapWrite::Update {
                    expected_revision: 0,
                    request: req,
                })
                .with_effects(vec![
                    UserEffect::IncrementCompleted {
                        user_id: "user_1a".into(),
                    },
                    UserEffect::IncrementCompleted {
                        user_id: "user_1b".into(),
                    },
                ]),
            )
            .unwrap();

        assert_eq!(store.find_user("user_1a").unwrap().unwrap().completed_swaps, 1);
        assert_eq!(store.find_user("user_1b").unwrap().unwrap().completed_swaps, 1);
    }

    #[test]
    fn missing_effect_target_fails_whole_commit() {
        let store = MemoryStore::new();
        store.save_user(&user("user_1a", "ada")).unwrap();
        let mut req = request("swap_1a", "user_1a", "user_1b");
        store
            .commit(SwapCommit::new(SwapWrite::Create(req.clone())))
            .unwrap();

        req.touch(TimeStamp::now());
        let result = store.commit(
            SwapCommit::new(SwapWrite::Update {
                expected_revision: 0,
                request: req,
            })
            .with_effects(vec![UserEffect::IncrementCompleted {
                user_id: "user_1missing".into(),
            }]),
        );

        assert!(matches!(result, Err(StoreError::Missing(_))));
        // swap write must not have been applied either
        assert_eq!(store.find_swap("swap_1a").unwrap().unwrap().revision, 0);
    }

    #[test]
    fn pagination_math() {
        let page = Page::slice((0..7).collect::<Vec<_>>(), 2, 3);

        assert_eq!(page.items, vec![3, 4, 5]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn page_and_limit_are_clamped() {
        let page = Page::slice(vec![1, 2], 0, 0);

        assert_eq!(page.items, vec![1]);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 1);
    }
}
