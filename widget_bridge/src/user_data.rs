//! Boundary to the external user-data service. The bridge only names the
//! data types and guards the call; fetching is the source's business.

use crate::error::{BridgeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDataType {
    ModuleHistory,
    CurrentModule,
    SkillHistory,
    CurrentSkill,
    CurrentAchievements,
    AchievementsHistory,
    RewardHistory,
}

impl UserDataType {
    pub const ALL: [Self; 7] = [
        Self::ModuleHistory,
        Self::CurrentModule,
        Self::SkillHistory,
        Self::CurrentSkill,
        Self::CurrentAchievements,
        Self::AchievementsHistory,
        Self::RewardHistory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModuleHistory => "module_history",
            Self::CurrentModule => "current_module",
            Self::SkillHistory => "skill_history",
            Self::CurrentSkill => "current_skill",
            Self::CurrentAchievements => "current_achievements",
            Self::AchievementsHistory => "achievements_history",
            Self::RewardHistory => "reward_history",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for UserDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait UserDataSource {
    fn get_user_data(&self, data_type: UserDataType, auth_token: &str) -> Result<Value>;
}

/// Fetches one kind of user data. A blank token never reaches the source.
pub fn fetch_user_data<S>(source: &S, data_type: UserDataType, auth_token: &str) -> Result<Value>
where
    S: UserDataSource + ?Sized,
{
    if auth_token.trim().is_empty() {
        warn!(%data_type, "user data requested without an auth token");
        return Err(BridgeError::UserData {
            data_type: data_type.to_string(),
            message: "auth token is not set".to_string(),
        });
    }

    match source.get_user_data(data_type, auth_token) {
        Ok(data) => {
            debug!(%data_type, "user data fetched");
            Ok(data)
        }
        Err(BridgeError::UserData { data_type, message }) => {
            warn!(%data_type, "user data fetch failed: {message}");
            Err(BridgeError::UserData { data_type, message })
        }
        Err(err) => {
            warn!(%data_type, "user data fetch failed: {err}");
            Err(BridgeError::UserData {
                data_type: data_type.to_string(),
                message: err.to_string(),
            })
        }
    }
}
