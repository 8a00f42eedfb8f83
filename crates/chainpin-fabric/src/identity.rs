//! MSP identity resolution and X.509 distinguished names.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use serde::Deserialize;
use x509_parser::objects::{oid2abbrev, oid_registry};
use x509_parser::pem::parse_x509_pem;

use chainpin_core::PluginError;
use chainpin_http::RestClient;

fn full_identity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(".+::x509::(.+)::.+").expect("valid identity pattern"))
}

fn common_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("CN=([^,]+)").expect("valid CN pattern"))
}

/// An enrolled identity as returned by `GET /identities/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricIdentity {
    #[serde(default)]
    pub msp_id: String,
    #[serde(default, rename = "enrollmentCert")]
    pub ecert: String,
    #[serde(default)]
    pub ca_cert: String,
}

/// True for `{mspId}::x509::{subject DN}::{issuer DN}` identities.
pub fn is_full_identity(key: &str) -> bool {
    full_identity().is_match(key)
}

/// The transaction signer for a signing key.
///
/// Full identities give the `CN` of their subject DN (empty if there is none);
/// anything else is already a user name.
pub fn user_name(key: &str) -> String {
    let Some(subject) = full_identity().captures(key).and_then(|c| c.get(1)) else {
        return key.to_string();
    };
    common_name()
        .captures(subject.as_str())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Subject DN of a PEM certificate in RFC 2253 order, e.g.
/// `CN=user1,OU=client,O=Hyperledger,ST=North Carolina,C=US`.
pub fn subject_dn(pem: &str) -> Result<String, PluginError> {
    let (_, pem) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| PluginError::Certificate(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| PluginError::Certificate(e.to_string()))?;

    let mut rdns = Vec::new();
    for rdn in cert.subject().iter_rdn() {
        let mut parts = Vec::new();
        for attr in rdn.iter() {
            let name = oid2abbrev(attr.attr_type(), oid_registry())
                .map(str::to_string)
                .unwrap_or_else(|_| attr.attr_type().to_id_string());
            let value = attr
                .as_str()
                .map_err(|e| PluginError::Certificate(e.to_string()))?;
            parts.push(format!("{name}={}", escape_dn_value(value)));
        }
        rdns.push(parts.join("+"));
    }
    rdns.reverse();
    Ok(rdns.join(","))
}

fn escape_dn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i == last && c == ' ';
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';') || leading || trailing {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Expands short user names into full on-chain identities, caching lookups.
pub struct IdentityResolver {
    client: Arc<dyn RestClient>,
    cache: Mutex<HashMap<String, FabricIdentity>>,
}

impl IdentityResolver {
    pub fn new(client: Arc<dyn RestClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, name: &str) -> Option<FabricIdentity> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    async fn lookup(&self, name: &str) -> Result<FabricIdentity, PluginError> {
        if let Some(identity) = self.cached(name) {
            return Ok(identity);
        }
        let body = self.client.get_json(&format!("/identities/{name}")).await?;
        let identity: FabricIdentity = serde_json::from_value(body)?;
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), identity.clone());
        Ok(identity)
    }

    /// `key` unchanged when it is already a full identity, otherwise
    /// `{mspId}::x509::{ecert DN}::{ca DN}` for the enrolled user `key`.
    pub async fn resolve(&self, key: &str) -> Result<String, PluginError> {
        if is_full_identity(key) {
            return Ok(key.to_string());
        }
        let identity = self.lookup(key).await?;
        let ecert_dn = subject_dn(&identity.ecert)?;
        let ca_dn = subject_dn(&identity.ca_cert)?;
        let resolved = format!("{}::x509::{ecert_dn}::{ca_dn}", identity.msp_id);
        tracing::debug!(key, resolved = %resolved, "resolved signing key");
        Ok(resolved)
    }
}
