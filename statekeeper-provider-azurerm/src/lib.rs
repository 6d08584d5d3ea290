//! Azure storage account provider
//!
//! Provisions the storage account behind an `azurerm` remote state backend
//! through the Azure Resource Manager REST API.

pub mod auth;
pub mod client;
pub mod cloud;
pub mod config;

pub use auth::{Authorizer, ClientCredentialsAuthorizer, StaticTokenAuthorizer};
pub use client::AzureRmClient;
pub use cloud::CloudEnvironment;
pub use config::{AZURERM_ONLY_KEYS, AzureRm, AzureRmBackend, AzureRmProvisioning};
