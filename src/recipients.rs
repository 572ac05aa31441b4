//! Recipient list parsing.

use crate::amounts::split_fields;
use ethers::types::Address;
use std::fmt;

/// One recipient slot as typed by the user. Not validated while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipientAddress(String);

impl RecipientAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to a 20-byte address for call encoding.
    pub fn to_address(&self) -> Option<Address> {
        self.0.parse().ok()
    }
}

impl fmt::Display for RecipientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse recipients in input order. Duplicates are kept, one slot per entry.
pub fn parse_recipients(text: &str) -> Vec<RecipientAddress> {
    split_fields(text).map(RecipientAddress::new).collect()
}

/// Count of recipient slots, as shown in the transaction details.
pub fn recipient_count(text: &str) -> usize {
    split_fields(text).count()
}
