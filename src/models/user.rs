use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provisioned user as stored in the user directory.
///
/// Unknown attributes (set through `PUT /users/{userName}`) are kept in
/// `extra` so that they survive a save/load cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(rename = "userName")]
    pub user_name: String,
    pub password: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub endpoint: Endpoint,
    pub application: Application,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// SIP endpoint registered under the provider domain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    #[serde(rename = "domainId")]
    pub domain_id: String,
    #[serde(rename = "sipUri")]
    pub sip_uri: String,
    #[serde(rename = "applicationId", default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Provider application receiving the user's call events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(rename = "incomingCallUrl")]
    pub incoming_call_url: String,
    #[serde(rename = "autoAnswer", default)]
    pub auto_answer: bool,
}

/// Body of `POST /users`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    #[serde(rename = "userName", default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
}

impl CreateUserRequest {
    /// Validate required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.user_name.is_empty() {
            return Err("userName is required".to_string());
        }
        if self.password.is_empty() {
            return Err("password is required".to_string());
        }
        Ok(())
    }
}

impl User {
    /// Public representation: everything except the SIP password and the
    /// provider application.
    pub fn to_view(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("password");
            map.remove("application");
        }
        value
    }

    /// Shallow-merge `patch` into this user. `userName` is the directory key
    /// and cannot be changed this way.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut current = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for (key, value) in patch {
            if key == "userName" {
                continue;
            }
            current.insert(key, value);
        }

        *self = serde_json::from_value(Value::Object(current))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::alice;
    use serde_json::json;

    #[test]
    fn test_view_hides_password_and_application() {
        let view = alice().to_view();

        assert!(view.get("password").is_none());
        assert!(view.get("application").is_none());
        assert_eq!(view["userName"], "alice");
        assert_eq!(view["phoneNumber"], "+19195551234");
        assert_eq!(view["endpoint"]["id"], "re-1");
    }

    #[test]
    fn test_merge_keeps_user_name_and_extra_fields() {
        let mut user = alice();
        let patch = json!({
            "userName": "mallory",
            "displayName": "Alice A.",
            "password": "changed"
        });

        user.merge(patch.as_object().unwrap().clone()).unwrap();

        assert_eq!(user.user_name, "alice");
        assert_eq!(user.password, "changed");
        assert_eq!(user.extra["displayName"], "Alice A.");

        // Extra attributes round-trip through the stored representation
        let stored = serde_json::to_string(&user).unwrap();
        let loaded: User = serde_json::from_str(&stored).unwrap();
        assert_eq!(loaded, user);
    }

    #[test]
    fn test_merge_rejects_wrong_types() {
        let mut user = alice();
        let patch = json!({ "phoneNumber": 42 });

        assert!(user.merge(patch.as_object().unwrap().clone()).is_err());
        assert_eq!(user.phone_number, "+19195551234");
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateUserRequest {
            user_name: "bob".to_string(),
            password: "pw".to_string(),
        };
        assert!(ok.validate().is_ok());

        let missing: CreateUserRequest = serde_json::from_value(json!({ "userName": "bob" })).unwrap();
        assert_eq!(missing.validate().unwrap_err(), "password is required");
    }
}
