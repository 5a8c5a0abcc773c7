use crate::config::PaymentDefaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    En,
    Es,
    Fr,
    De,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    General,
    Music,
    Movies,
    Sports,
    Technology,
    Travel,
    Games,
}

/// A user as submitted for registration. Owned by the data service.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NewUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub camefrom: String,
    pub first_name: String,
    pub language: Language,
    pub fluency: u8,
    pub topics: Vec<Topic>,
    pub lang_code: String,
}

/// A registered user, including the optional profile attributes.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UserData {
    pub user_id: i64,
    pub username: Option<String>,
    pub camefrom: String,
    pub first_name: String,
    pub language: Language,
    pub fluency: u8,
    pub topics: Vec<Topic>,
    pub lang_code: String,
    pub nickname: Option<String>,
    pub age: Option<u32>,
    pub about: Option<String>,
    pub status: Option<String>,
}

/// Profile attributes a user can change after registration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub user_id: i64,
    pub nickname: Option<String>,
    pub age: Option<u32>,
    pub about: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NewPayment {
    pub user_id: i64,
    pub currency: String,
    pub trial: bool,
    pub period: String,
    pub until: DateTime<Utc>,
}

impl NewPayment {
    /// The payment record opened alongside a freshly created user.
    pub fn from_defaults(user_id: i64, defaults: &PaymentDefaults) -> Self {
        NewPayment {
            user_id,
            currency: defaults.currency.clone(),
            trial: defaults.trial,
            period: defaults.period.clone(),
            until: Utc::now() + chrono::Duration::days(i64::from(defaults.trial_days)),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NewDueTo {
    pub user_id: i64,
    pub due_to: DateTime<Utc>,
}

/// Per-user map of due-date fields, as returned by the payment service and
/// as cached under `due_to:{id}`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DueToRecord {
    pub fields: HashMap<String, serde_json::Value>,
}

impl DueToRecord {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The polymorphic update payload. The caller names the entity kind
/// explicitly; the gateway never infers it from which fields are set.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "kind")]
pub enum UpdatePayload {
    User(NewUser),
    Profile(ProfileUpdate),
}

impl UpdatePayload {
    pub fn user_id(&self) -> i64 {
        match self {
            UpdatePayload::User(user) => user.user_id,
            UpdatePayload::Profile(profile) => profile.user_id,
        }
    }
}
