//! Provider-side provisioning of user identities
//!
//! A new user gets its own provider application (receiving the user's call
//! events), a local phone number bound to that application and a SIP endpoint
//! under the shared domain.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Map;
use thiserror::Error;

use crate::models::{Application, CreateUserRequest, Endpoint, User};
use super::catapult::{CatapultError, Credentials, Domain, NewEndpoint};

#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("Provider error during {step}: {source}")]
    Provider {
        step: &'static str,
        #[source]
        source: CatapultError,
    },
    #[error("No local number available in {0}")]
    NoNumberAvailable(String),
}

/// Provider operations needed outside of call handling
#[async_trait::async_trait]
pub trait ProvisioningApi: Send + Sync {
    async fn create_application(
        &self,
        name: &str,
        incoming_call_url: &str,
    ) -> Result<Application, CatapultError>;

    async fn search_local_numbers(&self, state: &str, quantity: u32) -> Result<Vec<String>, CatapultError>;

    /// Reserve `number` for the account, routed to `application_id`
    async fn order_number(&self, number: &str, application_id: &str) -> Result<String, CatapultError>;

    /// Id of an owned number, `None` if the account does not own it
    async fn find_number(&self, number: &str) -> Result<Option<String>, CatapultError>;

    async fn delete_number(&self, number_id: &str) -> Result<(), CatapultError>;

    async fn list_domains(&self) -> Result<Vec<Domain>, CatapultError>;

    async fn create_domain(&self, name: &str) -> Result<Domain, CatapultError>;

    async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<Endpoint, CatapultError>;
}

fn provider(step: &'static str) -> impl FnOnce(CatapultError) -> ProvisioningError {
    move |source| ProvisioningError::Provider { step, source }
}

/// Reuse the domain called `name` or create it
pub async fn ensure_domain(api: &dyn ProvisioningApi, name: &str) -> Result<Domain, ProvisioningError> {
    let domains = api.list_domains().await.map_err(provider("list domains"))?;
    if let Some(domain) = domains.into_iter().find(|d| d.name == name) {
        tracing::info!("Using existing domain {}", domain.name);
        return Ok(domain);
    }

    tracing::info!("Creating a domain {}", name);
    api.create_domain(name).await.map_err(provider("create domain"))
}

/// Provision application, number and SIP endpoint for a new user
pub async fn provision_user(
    api: &dyn ProvisioningApi,
    request: &CreateUserRequest,
    domain: &Domain,
    callback_url: &str,
    search_state: &str,
) -> Result<User, ProvisioningError> {
    let application = api
        .create_application(&request.user_name, callback_url)
        .await
        .map_err(provider("create application"))?;

    let phone_number = api
        .search_local_numbers(search_state, 1)
        .await
        .map_err(provider("search numbers"))?
        .into_iter()
        .next()
        .ok_or_else(|| ProvisioningError::NoNumberAvailable(search_state.to_string()))?;

    api.order_number(&phone_number, &application.id)
        .await
        .map_err(provider("order number"))?;

    let endpoint = NewEndpoint {
        name: endpoint_name(),
        description: format!("Sandbox created Endpoint for user {}", request.user_name),
        domain_id: domain.id.clone(),
        application_id: application.id.clone(),
        enabled: true,
        credentials: Credentials {
            password: request.password.clone(),
        },
    };
    let endpoint = api
        .create_endpoint(&endpoint)
        .await
        .map_err(provider("create endpoint"))?;

    tracing::info!(
        "Provisioned {} with number {} and endpoint {}",
        request.user_name, phone_number, endpoint.sip_uri
    );

    Ok(User {
        user_name: request.user_name.clone(),
        password: request.password.clone(),
        phone_number,
        endpoint,
        application,
        extra: Map::new(),
    })
}

/// Give a number back to the provider if the account still owns it
pub async fn release_number(api: &dyn ProvisioningApi, number: &str) -> Result<bool, ProvisioningError> {
    match api.find_number(number).await.map_err(provider("find number"))? {
        Some(id) => {
            api.delete_number(&id).await.map_err(provider("delete number"))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// "uep-" followed by 12 random alphanumerics
fn endpoint_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("uep-{}", suffix)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// In-memory provider account
    #[derive(Default)]
    pub struct FakeProvisioning {
        pub domains: Mutex<Vec<Domain>>,
        pub available: Mutex<Vec<String>>,
        pub owned: Mutex<Vec<(String, String)>>,
        pub endpoints: Mutex<Vec<NewEndpoint>>,
        pub fail_endpoint: bool,
    }

    impl FakeProvisioning {
        pub fn with_numbers(numbers: &[&str]) -> Self {
            Self {
                available: Mutex::new(numbers.iter().map(|n| n.to_string()).collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl ProvisioningApi for FakeProvisioning {
        async fn create_application(
            &self,
            name: &str,
            incoming_call_url: &str,
        ) -> Result<Application, CatapultError> {
            Ok(Application {
                id: format!("a-{}", name),
                name: name.to_string(),
                incoming_call_url: incoming_call_url.to_string(),
                auto_answer: false,
            })
        }

        async fn search_local_numbers(&self, _state: &str, quantity: u32) -> Result<Vec<String>, CatapultError> {
            let available = self.available.lock().unwrap();
            Ok(available.iter().take(quantity as usize).cloned().collect())
        }

        async fn order_number(&self, number: &str, _application_id: &str) -> Result<String, CatapultError> {
            self.available.lock().unwrap().retain(|n| n != number);
            let id = format!("n-{}", number.trim_start_matches('+'));
            self.owned.lock().unwrap().push((id.clone(), number.to_string()));
            Ok(id)
        }

        async fn find_number(&self, number: &str) -> Result<Option<String>, CatapultError> {
            let owned = self.owned.lock().unwrap();
            Ok(owned.iter().find(|(_, n)| n == number).map(|(id, _)| id.clone()))
        }

        async fn delete_number(&self, number_id: &str) -> Result<(), CatapultError> {
            self.owned.lock().unwrap().retain(|(id, _)| id != number_id);
            Ok(())
        }

        async fn list_domains(&self) -> Result<Vec<Domain>, CatapultError> {
            Ok(self.domains.lock().unwrap().clone())
        }

        async fn create_domain(&self, name: &str) -> Result<Domain, CatapultError> {
            let domain = Domain {
                id: format!("rd-{}", name),
                name: name.to_string(),
            };
            self.domains.lock().unwrap().push(domain.clone());
            Ok(domain)
        }

        async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<Endpoint, CatapultError> {
            if self.fail_endpoint {
                return Err(CatapultError::Api {
                    status: 409,
                    message: "Endpoint name already in use".to_string(),
                });
            }
            self.endpoints.lock().unwrap().push(endpoint.clone());
            Ok(Endpoint {
                id: format!("re-{}", endpoint.name),
                name: endpoint.name.clone(),
                domain_id: endpoint.domain_id.clone(),
                sip_uri: format!("sip:{}@relay.bwapp.bwsip.io", endpoint.name),
                application_id: Some(endpoint.application_id.clone()),
                description: Some(endpoint.description.clone()),
                enabled: endpoint.enabled,
                extra: Map::new(),
            })
        }
    }
}
