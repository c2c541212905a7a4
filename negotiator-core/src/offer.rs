//! Contract offer payloads exchanged during a negotiation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Negotiation identifier assigned by the transport when an offer is first submitted.
pub type NegotiationId = i64;

/// Argument key suffix marking a value as a definition content hash.
pub const HASH_SUFFIX: &str = ":hash";

/// A contract instantiated from a named template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedContract {
    pub template_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

impl TrustedContract {
    pub fn new(template_name: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Add a template argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// An offer made by one party to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOffer {
    pub offeror_name: String,
    pub receiver_name: String,
    pub valid_after: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub contracts: Vec<TrustedContract>,
    pub offered_at: DateTime<Utc>,
}

impl ContractOffer {
    /// Create an offer that is valid from now and for `validity`.
    pub fn new(
        offeror: impl Into<String>,
        receiver: impl Into<String>,
        validity: Duration,
        contracts: Vec<TrustedContract>,
    ) -> Self {
        let now = Utc::now();
        Self {
            offeror_name: offeror.into(),
            receiver_name: receiver.into(),
            valid_after: now,
            valid_until: now + validity,
            contracts,
            offered_at: now,
        }
    }

    /// Create a counter-offer to this offer, with the parties swapped.
    pub fn counter(&self, validity: Duration, contracts: Vec<TrustedContract>) -> Self {
        Self::new(
            self.receiver_name.clone(),
            self.offeror_name.clone(),
            validity,
            contracts,
        )
    }

    /// Whether the offer is acceptable at `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_after <= at && at < self.valid_until
    }

    /// Comma-joined, deduplicated definition hashes referenced by the offer's
    /// contract arguments, or `None` if no argument key ends with `:hash`.
    pub fn hash_query(&self) -> Option<String> {
        collect_hash_tokens(self.contracts.iter().map(|c| &c.arguments))
    }
}

/// Collect every value whose key ends with [`HASH_SUFFIX`] and join the
/// distinct values with commas, in sorted order.
pub fn collect_hash_tokens<'a, I>(arguments: I) -> Option<String>
where
    I: IntoIterator<Item = &'a BTreeMap<String, String>>,
{
    let hashes: BTreeSet<&str> = arguments
        .into_iter()
        .flat_map(|args| args.iter())
        .filter(|(key, _)| key.ends_with(HASH_SUFFIX))
        .map(|(_, value)| value.as_str())
        .collect();

    if hashes.is_empty() {
        None
    } else {
        Some(hashes.into_iter().collect::<Vec<_>>().join(","))
    }
}

/// A negotiation as reported by the transport: its id and latest offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: NegotiationId,
    pub offer: ContractOffer,
}
