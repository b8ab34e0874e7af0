//! Shared test data

use serde_json::json;

use super::User;

/// User provisioned with `+19195551234` and `sip:alice@example.com`
pub fn alice() -> User {
    serde_json::from_value(json!({
        "userName": "alice",
        "password": "secret",
        "phoneNumber": "+19195551234",
        "endpoint": {
            "id": "re-1",
            "name": "uep-abcdefghijkl",
            "domainId": "rd-1",
            "sipUri": "sip:alice@example.com",
            "enabled": true
        },
        "application": {
            "id": "a-1",
            "name": "alice",
            "incomingCallUrl": "http://localhost:3000/users/alice/callback",
            "autoAnswer": false
        }
    }))
    .expect("fixture user is valid")
}
