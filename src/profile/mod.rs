//! Declared skills as entered on a user profile.
//!
//! Profiles are owned by the surrounding product; the engine only reads a
//! snapshot of the owner's name and declared skills.

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Proficiency {
    #[default]
    Beginner,
    Intermediate,
    Pro,
}

/// A skill the user self-reports on their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredSkill {
    pub name: String,
    #[serde(default)]
    pub proficiency: Proficiency,
}

impl DeclaredSkill {
    pub fn new(name: impl Into<String>, proficiency: Proficiency) -> Self {
        Self {
            name: name.into(),
            proficiency,
        }
    }
}

/// Read-only snapshot of a user's profile at verification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub full_name: String,
    #[serde(default)]
    pub skills: Vec<DeclaredSkill>,
}

impl UserProfile {
    pub fn skill_names(&self) -> Vec<String> {
        skill_names(&self.skills)
    }
}

/// Names of the declared skills, blanks dropped.
pub fn skill_names(skills: &[DeclaredSkill]) -> Vec<String> {
    skills
        .iter()
        .map(|s| s.name.trim())
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse a comma-separated list like `"Python, React:pro, Docker"`.
///
/// A `:level` suffix sets the proficiency; unknown levels fall back to
/// beginner.
pub fn parse_skill_list(input: &str) -> Vec<DeclaredSkill> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.rsplit_once(':') {
            Some((name, level)) => DeclaredSkill::new(
                name.trim(),
                level.trim().parse().unwrap_or_default(),
            ),
            None => DeclaredSkill::new(entry, Proficiency::Beginner),
        })
        .collect()
}
