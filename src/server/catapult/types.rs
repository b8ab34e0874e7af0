//! Catapult request/response bodies

use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub(super) struct CreateBridgeRequest<'a> {
    #[serde(rename = "bridgeAudio")]
    pub bridge_audio: bool,
    #[serde(rename = "callIds")]
    pub call_ids: [&'a str; 2],
}

#[derive(Serialize)]
pub(super) struct CallStateRequest<'a> {
    pub state: &'a str,
}

#[derive(Serialize)]
pub(super) struct CreateApplicationRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "incomingCallUrl")]
    pub incoming_call_url: &'a str,
    #[serde(rename = "autoAnswer")]
    pub auto_answer: bool,
}

#[derive(Serialize)]
pub(super) struct OrderNumberRequest<'a> {
    pub number: &'a str,
    #[serde(rename = "applicationId")]
    pub application_id: &'a str,
}

#[derive(Serialize)]
pub(super) struct CreateDomainRequest<'a> {
    pub name: &'a str,
}

#[derive(Deserialize)]
pub(super) struct AvailableNumber {
    pub number: String,
}

#[derive(Deserialize)]
pub(super) struct PhoneNumberData {
    pub id: String,
}

#[derive(Deserialize)]
pub(super) struct ErrorBody {
    pub message: Option<String>,
}

/// Provider SIP domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
}

/// Endpoint to register under a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEndpoint {
    pub name: String,
    pub description: String,
    #[serde(rename = "domainId")]
    pub domain_id: String,
    #[serde(rename = "applicationId")]
    pub application_id: String,
    pub enabled: bool,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub password: String,
}
