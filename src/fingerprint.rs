//! Fingerprint computation for generation requests
//!
//! A fingerprint is the content address of a request: every field that can
//! change the generated text is fed, labelled, into a BLAKE3 hasher.

use crate::request::{GenerationRequest, SamplingParams};
use blake3::Hasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 32-byte content address of a [`GenerationRequest`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint: {s}")))
    }
}

/// Compute the fingerprint of a generation request
///
/// Fingerprint = hash(entry || section || model || prompt || sampling || bounds)
///
/// Strings are length-prefixed so field boundaries cannot be shifted, and
/// floats are hashed by bit pattern so only exactly equal values collide.
pub fn compute_fingerprint(request: &GenerationRequest) -> Fingerprint {
    let mut hasher = Hasher::new();
    hasher.update(b"quire-request-v1");

    update_str(&mut hasher, b"entry:", &request.entry_id);
    update_str(&mut hasher, b"section:", &request.section_id);
    update_str(&mut hasher, b"model:", &request.model);
    update_str(&mut hasher, b"prompt:", &request.prompt);
    update_sampling(&mut hasher, &request.sampling);

    hasher.update(b"min_words:");
    hasher.update(&request.min_words.to_le_bytes());
    hasher.update(b"max_words:");
    match request.max_words {
        Some(max) => {
            hasher.update(&[1]);
            hasher.update(&max.to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }

    Fingerprint(*hasher.finalize().as_bytes())
}

fn update_str(hasher: &mut Hasher, label: &[u8], value: &str) {
    hasher.update(label);
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn update_sampling(hasher: &mut Hasher, sampling: &SamplingParams) {
    hasher.update(b"temperature:");
    hasher.update(&sampling.temperature.to_bits().to_le_bytes());
    hasher.update(b"top_p:");
    hasher.update(&sampling.top_p.to_bits().to_le_bytes());
    hasher.update(b"top_k:");
    hasher.update(&sampling.top_k.to_le_bytes());
    hasher.update(b"repeat_penalty:");
    hasher.update(&sampling.repeat_penalty.to_bits().to_le_bytes());
    hasher.update(b"max_tokens:");
    hasher.update(&sampling.max_tokens.to_le_bytes());
}

/// Filesystem-safe, collision-resistant file stem for an entry id.
///
/// `{slug}-{first 16 hex chars of blake3(entry_id)}`, where the slug keeps the
/// id readable and the hash keeps distinct ids apart.
pub fn record_name(entry_id: &str) -> String {
    let mut slug = String::new();
    for c in entry_id.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
        if slug.len() >= 48 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    let hash = blake3::hash(entry_id.as_bytes()).to_hex();
    if slug.is_empty() {
        format!("entry-{}", &hash[..16])
    } else {
        format!("{}-{}", slug, &hash[..16])
    }
}
