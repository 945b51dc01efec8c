//! Custom domain operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::apiclient::Access;
use crate::error::ToastateError;
use crate::models::CustomDomain;
use crate::session::{require_id, Session};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateCustomDomainInput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub root_domain: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    /// Subdomain to toaster ID.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub linked_toasters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCustomDomainInput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub linked_toasters: BTreeMap<String, String>,
}

/// A domain together with the DNS records that prove its ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CustomDomainOutput {
    pub custom_domain: Option<CustomDomain>,
    pub ownership_check_txt_record_name: String,
    pub ownership_check_txt_record_value: String,
    pub cnames_record: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct DomainResponse {
    #[serde(default)]
    custom_domain: Option<CustomDomain>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    custom_domains: Vec<CustomDomain>,
}

#[derive(Deserialize)]
struct Acknowledged {}

impl Session {
    pub async fn create_custom_domain(
        &self,
        input: &CreateCustomDomainInput,
    ) -> Result<CustomDomainOutput, ToastateError> {
        info!(root_domain = %input.root_domain, "Creating custom domain");
        self.client
            .post(Access::Authenticated, "/customdomain", input)
            .await
    }

    /// Ask the API to check the ownership records of a domain.
    pub async fn verify_custom_domain(&self, id: &str) -> Result<Option<CustomDomain>, ToastateError> {
        require_id(id, "ID of the custom domain to verify")?;
        let resp: DomainResponse = self
            .client
            .post_empty(Access::Authenticated, &format!("/customdomain/verify/{id}"))
            .await?;
        Ok(resp.custom_domain)
    }

    pub async fn update_custom_domain(
        &self,
        id: &str,
        input: &UpdateCustomDomainInput,
    ) -> Result<CustomDomainOutput, ToastateError> {
        require_id(id, "ID of the custom domain to update")?;
        self.client
            .put(Access::Authenticated, &format!("/customdomain/{id}"), input)
            .await
    }

    pub async fn list_custom_domains(&self) -> Result<Vec<CustomDomain>, ToastateError> {
        let resp: ListResponse = self
            .client
            .get(Access::Authenticated, "/customdomain/list")
            .await?;
        Ok(resp.custom_domains)
    }

    pub async fn get_custom_domain(&self, id: &str) -> Result<CustomDomainOutput, ToastateError> {
        require_id(id, "ID of the custom domain to get")?;
        self.client
            .get(Access::Authenticated, &format!("/customdomain/{id}"))
            .await
    }

    pub async fn delete_custom_domain(&self, id: &str) -> Result<(), ToastateError> {
        require_id(id, "ID of the custom domain to delete")?;
        let _: Acknowledged = self
            .client
            .delete_empty(Access::Authenticated, &format!("/customdomain/{id}"))
            .await?;
        info!(domain_id = id, "Custom domain deleted");
        Ok(())
    }
}
