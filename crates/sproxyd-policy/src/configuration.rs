//! Storage policy configuration document
//!
//! The document is TOML, with one table per ring and one table per policy:
//!
//! ```toml
//! [rings.paris-arc6]
//! location = "paris"
//! endpoints = ["http://10.0.1.1:81/proxy/arc6/"]
//!
//! [policies.1]
//! read = ["paris-arc6"]
//! write = ["paris-arc6"]
//! ```

use crate::policy::{Policy, Ring};
use serde::Deserialize;
use sproxyd_common::{Error, PolicyIndex, Result};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    rings: BTreeMap<String, RingSection>,
    #[serde(default)]
    policies: BTreeMap<String, PolicySection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RingSection {
    location: Option<String>,
    endpoints: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicySection {
    #[serde(default)]
    read: Vec<String>,
    write: Vec<String>,
}

/// Parsed, immutable set of storage policies
#[derive(Clone, Debug, Default)]
pub struct PolicyConfiguration {
    rings: BTreeMap<String, Arc<Ring>>,
    policies: BTreeMap<PolicyIndex, Policy>,
}

impl PolicyConfiguration {
    /// Parse a policy document from a stream
    pub fn from_reader<R: Read>(mut source: R) -> Result<Self> {
        let mut text = String::new();
        source.read_to_string(&mut text)?;
        text.parse()
    }

    /// Load the policy document at `path`
    ///
    /// A missing file is not an error and yields `None`; any other failure
    /// reading or parsing the file is returned.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        info!("Reading storage policy configuration from {}", path.display());

        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No storage policy configuration found at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                error!(
                    "Failure while reading storage policy configuration from {}: {}",
                    path.display(),
                    e
                );
                return Err(e.into());
            }
        };

        info!("Parsing storage policy configuration");
        let configuration = Self::from_reader(file).inspect_err(|e| {
            error!(
                "Failure while loading storage policy configuration from {}: {}",
                path.display(),
                e
            );
        })?;

        info!(
            "Loaded {} storage policies over {} rings",
            configuration.policies.len(),
            configuration.rings.len()
        );
        Ok(Some(configuration))
    }

    /// Get the policy with the given index
    pub fn get_policy(&self, index: PolicyIndex) -> Result<&Policy> {
        self.policies.get(&index).ok_or(Error::PolicyNotFound(index))
    }

    /// All policies, by ascending index
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    fn from_document(document: Document) -> Result<Self> {
        let mut rings = BTreeMap::new();
        for (name, section) in document.rings {
            if section.endpoints.is_empty() {
                return Err(Error::configuration_parse(format!("ring {name:?} has no endpoints")));
            }
            let endpoints = section
                .endpoints
                .iter()
                .map(|endpoint| normalize_endpoint(&name, endpoint))
                .collect::<Result<Vec<_>>>()?;
            let ring = Ring::new(name.clone(), section.location, endpoints);
            rings.insert(name, Arc::new(ring));
        }

        let mut policies = BTreeMap::new();
        for (key, section) in document.policies {
            let index: PolicyIndex = key.parse().map_err(|_| {
                Error::configuration_parse(format!("policy key {key:?} is not a policy index"))
            })?;
            if section.write.is_empty() {
                return Err(Error::configuration_parse(format!(
                    "policy {index} has no write rings"
                )));
            }
            let resolve = |names: &[String]| -> Result<Vec<Arc<Ring>>> {
                names
                    .iter()
                    .map(|name| {
                        rings.get(name).cloned().ok_or_else(|| {
                            Error::configuration_parse(format!(
                                "policy {index} references unknown ring {name:?}"
                            ))
                        })
                    })
                    .collect()
            };
            let policy = Policy::new(index, resolve(&section.read)?, resolve(&section.write)?);
            if policies.insert(index, policy).is_some() {
                return Err(Error::configuration_parse(format!("policy {index} defined twice")));
            }
        }

        Ok(Self { rings, policies })
    }
}

impl FromStr for PolicyConfiguration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let document: Document =
            toml::from_str(s).map_err(|e| Error::configuration_parse(e.message().to_string()))?;
        Self::from_document(document)
    }
}

/// Validate an endpoint URL and make sure object names can be appended to it
fn normalize_endpoint(ring: &str, endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    let authority = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .ok_or_else(|| {
            Error::configuration_parse(format!(
                "ring {ring:?}: endpoint {endpoint:?} is not an http(s) URL"
            ))
        })?;
    if authority.is_empty() || authority.starts_with('/') {
        return Err(Error::configuration_parse(format!(
            "ring {ring:?}: endpoint {endpoint:?} has no host"
        )));
    }

    if endpoint.ends_with('/') {
        Ok(endpoint.to_string())
    } else {
        Ok(format!("{endpoint}/"))
    }
}
