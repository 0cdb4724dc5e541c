//! Cache fingerprints.
//!
//! A fingerprint deterministically identifies a cacheable request. Components
//! are length-prefixed before hashing so no two component sequences can
//! collide by concatenation. Besides the request-shaped components (feature,
//! tenant, complexity, normalized prompt, entity, system-prompt override)
//! the hash covers the resolved model id and the tool-catalog digest: a
//! catalog or tier change must miss the cache rather than replay an answer
//! that references tools that no longer exist, and an overridden request
//! must not replay an answer produced under the default instructions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::model::Model;
use crate::domain::request::AssistRequest;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint for a request routed to `model`, with
/// `catalog_digest` identifying the advertised tool set.
pub fn fingerprint(request: &AssistRequest, model: Model, catalog_digest: &str) -> Fingerprint {
    let mut hasher = Sha256::new();

    push(&mut hasher, request.feature.as_key());
    push(&mut hasher, &request.tenant_id.0);
    push(&mut hasher, request.complexity.as_key());
    push(&mut hasher, &normalize(&request.instruction));
    match &request.entity {
        Some(entity) => {
            push(&mut hasher, &entity.entity_type);
            push(&mut hasher, &entity.entity_id);
        }
        None => push(&mut hasher, ""),
    }
    push(&mut hasher, request.options.system_prompt_override.as_deref().unwrap_or(""));
    push(&mut hasher, model.wire_id());
    push(&mut hasher, catalog_digest);

    let digest = hasher.finalize();
    Fingerprint(hex_encode(&digest))
}

/// Digest identifying an advertised tool catalog. Names are sorted first so
/// registration order never changes the digest.
pub fn catalog_digest<'a>(tool_names: impl IntoIterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> = tool_names.into_iter().collect();
    names.sort_unstable();

    let mut hasher = Sha256::new();
    for name in names {
        push(&mut hasher, name);
    }
    hex_encode(&hasher.finalize())
}

fn push(hasher: &mut Sha256, component: &str) {
    hasher.update((component.len() as u64).to_be_bytes());
    hasher.update(component.as_bytes());
}

/// Collapse whitespace and case so cosmetic edits hit the same entry.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
