//! User entity and the rating aggregate
use crate::error::SwapError;
use crate::skill::Skill;
use crate::utils::TimeStamp;
use chrono::Utc;

pub const MIN_USERNAME: usize = 3;
pub const MAX_USERNAME: usize = 20;
pub const MAX_FULL_NAME: usize = 50;
pub const MAX_BIO: usize = 500;
pub const MAX_LOCATION: usize = 100;

/// Running average over the ratings a user has received.
///
/// Invariant: `average` is the arithmetic mean of exactly `count` submitted
/// ratings, and `count == 0` implies `average == 0`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    #[n(0)]
    pub average: f64,
    #[n(1)]
    pub count: u32,
}

impl Rating {
    pub fn zero() -> Self {
        Self {
            average: 0.0,
            count: 0,
        }
    }
    /// Fold one more rating into the running average. Pure; the caller is
    /// responsible for persisting the returned value.
    pub fn apply(self, new_rating: u8) -> Self {
        let count = self.count + 1;
        let average =
            (self.average * f64::from(self.count) + f64::from(new_rating)) / f64::from(count);
        Self { average, count }
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self::zero()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    #[n(0)]
    VeryActive,
    #[n(1)]
    Active,
    #[n(2)]
    Casual,
    #[n(3)]
    RarelyAvailable,
}

impl Default for Availability {
    fn default() -> Self {
        Self::Active
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct User {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded under "user_"
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub full_name: String,
    #[n(3)]
    pub bio: String,
    #[n(4)]
    pub location: Option<String>,
    #[n(5)]
    pub skills_offered: Vec<Skill>,
    #[n(6)]
    pub skills_wanted: Vec<Skill>,
    #[n(7)]
    pub availability: Availability,
    #[n(8)]
    pub is_public: bool,
    #[n(9)]
    pub rating: Rating,
    #[n(10)]
    pub completed_swaps: u32,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub updated_at: TimeStamp<Utc>,
}

impl User {
    /// Participant detail exposed on resolved swap views and user listings.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            availability: self.availability,
            rating: self.rating,
            completed_swaps: self.completed_swaps,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub availability: Availability,
    pub rating: Rating,
    pub completed_swaps: u32,
}

/// Registration input. Credentials are handled by an external collaborator;
/// only profile fields enter the core.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub location: Option<String>,
    pub skills_offered: Vec<Skill>,
    pub skills_wanted: Vec<Skill>,
    pub availability: Availability,
    pub is_public: bool,
}

impl UserDraft {
    pub fn new(username: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
            bio: String::new(),
            location: None,
            skills_offered: Vec::new(),
            skills_wanted: Vec::new(),
            availability: Availability::default(),
            is_public: true,
        }
    }
    pub fn set_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }
    pub fn set_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
    pub fn offer_skill(mut self, skill: Skill) -> Self {
        self.skills_offered.push(skill);
        self
    }
    pub fn want_skill(mut self, skill: Skill) -> Self {
        self.skills_wanted.push(skill);
        self
    }
    pub fn set_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }
    pub fn set_private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn validate(&self) -> Result<(), SwapError> {
        let username_len = self.username.trim().chars().count();
        if !(MIN_USERNAME..=MAX_USERNAME).contains(&username_len) {
            return Err(SwapError::Validation(format!(
                "username must be between {MIN_USERNAME} and {MAX_USERNAME} characters"
            )));
        }
        if self.full_name.trim().is_empty() || self.full_name.chars().count() > MAX_FULL_NAME {
            return Err(SwapError::Validation(format!(
                "full name is required and cannot exceed {MAX_FULL_NAME} characters"
            )));
        }
        validate_profile_fields(
            Some(self.bio.as_str()),
            self.location.as_deref(),
            Some(self.skills_offered.as_slice()),
            Some(self.skills_wanted.as_slice()),
        )
    }

    pub(crate) fn into_user(self, id: String, now: TimeStamp<Utc>) -> User {
        User {
            id,
            username: self.username,
            full_name: self.full_name,
            bio: self.bio,
            location: self.location,
            skills_offered: self.skills_offered,
            skills_wanted: self.skills_wanted,
            availability: self.availability,
            is_public: self.is_public,
            rating: Rating::zero(),
            completed_swaps: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Partial profile edit: only the populated fields are touched. Identity,
/// rating and counters are never editable through this path.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub skills_offered: Option<Vec<Skill>>,
    pub skills_wanted: Option<Vec<Skill>>,
    pub availability: Option<Availability>,
    pub is_public: Option<bool>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), SwapError> {
        if let Some(full_name) = &self.full_name {
            if full_name.trim().is_empty() || full_name.chars().count() > MAX_FULL_NAME {
                return Err(SwapError::Validation(format!(
                    "full name is required and cannot exceed {MAX_FULL_NAME} characters"
                )));
            }
        }
        validate_profile_fields(
            self.bio.as_deref(),
            self.location.as_deref(),
            self.skills_offered.as_deref(),
            self.skills_wanted.as_deref(),
        )
    }

    pub(crate) fn apply_to(self, user: &mut User) {
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(bio) = self.bio {
            user.bio = bio;
        }
        if let Some(location) = self.location {
            user.location = Some(location);
        }
        if let Some(skills_offered) = self.skills_offered {
            user.skills_offered = skills_offered;
        }
        if let Some(skills_wanted) = self.skills_wanted {
            user.skills_wanted = skills_wanted;
        }
        if let Some(availability) = self.availability {
            user.availability = availability;
        }
        if let Some(is_public) = self.is_public {
            user.is_public = is_public;
        }
    }
}

fn validate_profile_fields(
    bio: Option<&str>,
    location: Option<&str>,
    skills_offered: Option<&[Skill]>,
    skills_wanted: Option<&[Skill]>,
) -> Result<(), SwapError> {
    if let Some(bio) = bio {
        if bio.chars().count() > MAX_BIO {
            return Err(SwapError::Validation(format!(
                "bio cannot exceed {MAX_BIO} characters"
            )));
        }
    }
    if let Some(location) = location {
        if location.chars().count() > MAX_LOCATION {
            return Err(SwapError::Validation(format!(
                "location cannot exceed {MAX_LOCATION} characters"
            )));
        }
    }
    for skill in skills_offered
        .unwrap_or_default()
        .iter()
        .chain(skills_wanted.unwrap_or_default())
    {
        skill.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_rating_becomes_the_average() {
        let rating = Rating::zero().apply(4);

        assert_eq!(rating.count, 1);
        assert!((rating.average - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn running_average_tracks_the_mean() {
        let rating = Rating::zero().apply(5).apply(3).apply(4);

        assert_eq!(rating.count, 3);
        assert!((rating.average - 4.0).abs() < 1e-9);
    }

    #[test]
    fn short_username_fails_validation() {
        let draft = UserDraft::new("ab", "Ada Lovelace");
        assert!(draft.validate().is_err());
    }

    #[test]
    fn profile_update_touches_only_populated_fields() {
        let mut user = UserDraft::new("ada", "Ada Lovelace")
            .set_bio("first programmer")
            .into_user("user_1abc".into(), TimeStamp::now());

        let update = ProfileUpdate {
            bio: Some("analyst".into()),
            ..Default::default()
        };
        update.apply_to(&mut user);

        assert_eq!(user.bio, "analyst");
        assert_eq!(user.full_name, "Ada Lovelace");
        assert!(user.is_public);
    }
}
