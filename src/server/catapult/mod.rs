//! Catapult (Bandwidth v1) Voice API client

mod types;

use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Application, Endpoint};
use super::bridging::{CallGateway, CallRequest, GatewayError, LegInfo};
use super::provisioning::ProvisioningApi;

pub use types::{Credentials, Domain, NewEndpoint};
use types::*;

#[derive(Error, Debug)]
pub enum CatapultError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Missing resource location in response to {0}")]
    MissingLocation(String),
}

impl From<CatapultError> for GatewayError {
    fn from(e: CatapultError) -> Self {
        match e {
            CatapultError::NotFound(path) => GatewayError::NotFound(path),
            CatapultError::Api { status, message } => GatewayError::Rejected { status, message },
            CatapultError::Http(e) if e.is_decode() => GatewayError::Malformed(e.to_string()),
            CatapultError::Http(e) => GatewayError::Transport(e.to_string()),
            CatapultError::MissingLocation(path) => GatewayError::Malformed(format!(
                "no resource location returned by {}",
                path
            )),
        }
    }
}

#[derive(Clone)]
pub struct CatapultClient {
    client: Client,
    user_id: String,
    api_token: String,
    api_secret: String,
    base_url: String,
}

impl CatapultClient {
    pub fn new(
        base_url: &str,
        user_id: String,
        api_token: String,
        api_secret: String,
        timeout: Duration,
    ) -> Result<Self, CatapultError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user_id,
            api_token,
            api_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Account-scoped resource URL
    fn user_url(&self, path: &str) -> String {
        format!("{}/users/{}{}", self.base_url, self.user_id, path)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, CatapultError> {
        let response = request
            .basic_auth(&self.api_token, Some(&self.api_secret))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatapultError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or(error_text);
            return Err(CatapultError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn get<R: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<R, CatapultError> {
        let response = self.send(self.client.get(self.user_url(path)), path).await?;
        Ok(response.json().await?)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), CatapultError> {
        self.send(self.client.post(self.user_url(path)).json(body), path)
            .await?;
        Ok(())
    }

    /// POST a new resource and return its id, taken from the `Location` header
    async fn create<T: Serialize>(&self, path: &str, body: &T) -> Result<String, CatapultError> {
        let response = self
            .send(self.client.post(self.user_url(path)).json(body), path)
            .await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(resource_id)
            .ok_or_else(|| CatapultError::MissingLocation(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), CatapultError> {
        self.send(self.client.delete(self.user_url(path)), path).await?;
        Ok(())
    }

    /// Update the state of a call (answer with "active", hang up with "completed")
    async fn set_call_state(&self, call_id: &str, state: &str) -> Result<(), CatapultError> {
        self.post(&format!("/calls/{}", call_id), &CallStateRequest { state })
            .await
    }
}

/// Last path segment of a resource location
fn resource_id(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

#[async_trait::async_trait]
impl CallGateway for CatapultClient {
    async fn create_call(&self, request: &CallRequest) -> Result<String, GatewayError> {
        Ok(self.create("/calls", request).await?)
    }

    async fn get_call(&self, leg_id: &str) -> Result<LegInfo, GatewayError> {
        Ok(self.get(&format!("/calls/{}", leg_id)).await?)
    }

    async fn answer_call(&self, leg_id: &str) -> Result<(), GatewayError> {
        Ok(self.set_call_state(leg_id, "active").await?)
    }

    async fn create_bridge(
        &self,
        leg_ids: [&str; 2],
        bridge_audio: bool,
    ) -> Result<String, GatewayError> {
        let request = CreateBridgeRequest {
            bridge_audio,
            call_ids: leg_ids,
        };
        Ok(self.create("/bridges", &request).await?)
    }

    async fn bridge_members(&self, bridge_id: &str) -> Result<Vec<LegInfo>, GatewayError> {
        Ok(self.get(&format!("/bridges/{}/calls", bridge_id)).await?)
    }

    async fn hangup_call(&self, leg_id: &str) -> Result<(), GatewayError> {
        match self.set_call_state(leg_id, "completed").await {
            Ok(()) | Err(CatapultError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl ProvisioningApi for CatapultClient {
    async fn create_application(
        &self,
        name: &str,
        incoming_call_url: &str,
    ) -> Result<Application, CatapultError> {
        let request = CreateApplicationRequest {
            name,
            incoming_call_url,
            auto_answer: false,
        };
        let id = self.create("/applications", &request).await?;
        Ok(Application {
            id,
            name: name.to_string(),
            incoming_call_url: incoming_call_url.to_string(),
            auto_answer: false,
        })
    }

    async fn search_local_numbers(&self, state: &str, quantity: u32) -> Result<Vec<String>, CatapultError> {
        // Number search is not account scoped
        let path = "/availableNumbers/local";
        let request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("state", state.to_string()), ("quantity", quantity.to_string())]);
        let numbers: Vec<AvailableNumber> = self.send(request, path).await?.json().await?;
        Ok(numbers.into_iter().map(|n| n.number).collect())
    }

    async fn order_number(&self, number: &str, application_id: &str) -> Result<String, CatapultError> {
        let request = OrderNumberRequest {
            number,
            application_id,
        };
        self.create("/phoneNumbers", &request).await
    }

    async fn find_number(&self, number: &str) -> Result<Option<String>, CatapultError> {
        match self.get::<PhoneNumberData>(&format!("/phoneNumbers/{}", number)).await {
            Ok(data) => Ok(Some(data.id)),
            Err(CatapultError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_number(&self, number_id: &str) -> Result<(), CatapultError> {
        self.delete(&format!("/phoneNumbers/{}", number_id)).await
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, CatapultError> {
        self.get("/domains?size=100").await
    }

    async fn create_domain(&self, name: &str) -> Result<Domain, CatapultError> {
        let id = self.create("/domains", &CreateDomainRequest { name }).await?;
        Ok(Domain {
            id,
            name: name.to_string(),
        })
    }

    async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<Endpoint, CatapultError> {
        let path = format!("/domains/{}/endpoints", endpoint.domain_id);
        let id = self.create(&path, endpoint).await?;
        // The SIP URI is assigned by the provider
        self.get(&format!("{}/{}", path, id)).await
    }
}
