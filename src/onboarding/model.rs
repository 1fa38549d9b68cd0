//! Identity and profile data models.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// An authenticated principal owned by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque identifier assigned by the auth service.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Email/password pair for password sign-in and sign-up.
#[derive(Debug, Clone)]
pub struct Credential {
    pub email: String,
    pub password: SecretString,
}

/// Grade or class standing chosen during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcademicLevel {
    #[serde(rename = "9th Grade")]
    Grade9,
    #[serde(rename = "10th Grade")]
    Grade10,
    #[serde(rename = "11th Grade")]
    Grade11,
    #[serde(rename = "12th Grade")]
    Grade12,
    #[serde(rename = "College Freshman")]
    CollegeFreshman,
    #[serde(rename = "College Sophomore")]
    CollegeSophomore,
    #[serde(rename = "College Junior")]
    CollegeJunior,
    #[serde(rename = "College Senior")]
    CollegeSenior,
}

impl AcademicLevel {
    pub const ALL: [AcademicLevel; 8] = [
        Self::Grade9,
        Self::Grade10,
        Self::Grade11,
        Self::Grade12,
        Self::CollegeFreshman,
        Self::CollegeSophomore,
        Self::CollegeJunior,
        Self::CollegeSenior,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grade9 => "9th Grade",
            Self::Grade10 => "10th Grade",
            Self::Grade11 => "11th Grade",
            Self::Grade12 => "12th Grade",
            Self::CollegeFreshman => "College Freshman",
            Self::CollegeSophomore => "College Sophomore",
            Self::CollegeJunior => "College Junior",
            Self::CollegeSenior => "College Senior",
        }
    }
}

impl std::fmt::Display for AcademicLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AcademicLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("Unknown academic level: {s}"))
    }
}

/// Profile fields collected in the `profile` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub name: String,
    #[serde(default)]
    pub academic_level: Option<AcademicLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Row handed to the profile store on first provisioning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    /// Identity id; the store allows one profile per id.
    pub id: String,
    pub name: String,
    pub academic_level: AcademicLevel,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub rating: f64,
    pub total_reviews: u32,
}

impl NewProfile {
    pub const INITIAL_RATING: f64 = 5.0;
}

/// A platform user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub academic_level: AcademicLevel,
    pub bio: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub rating: f64,
    pub total_reviews: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
