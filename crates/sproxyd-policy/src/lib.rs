//! Sproxyd Policy - Storage policy configuration
//!
//! Parses the storage policy document into [`PolicyConfiguration`] and
//! resolves the endpoint groups serving a policy for a given [`Intent`].

pub mod configuration;
pub mod policy;

pub use configuration::PolicyConfiguration;
pub use policy::{EndpointGroup, Intent, Policy, Ring};
