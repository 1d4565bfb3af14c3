//! Search match records

use super::Address;
use serde::{Deserialize, Serialize};

/// One occurrence of a needle found by a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Absolute address of the first matched byte
    pub address: Address,
    /// Bytes surrounding the match, clamped to the chunk that was read
    pub context: Vec<u8>,
    /// Length of the matched needle
    pub value_size: usize,
    /// Offset of the match inside `context`
    pub context_offset: usize,
}

impl SearchResult {
    /// The matched bytes as they appear inside the captured context
    pub fn matched_bytes(&self) -> &[u8] {
        let end = (self.context_offset + self.value_size).min(self.context.len());
        &self.context[self.context_offset.min(end)..end]
    }

    /// Context bytes preceding the match
    pub fn before(&self) -> &[u8] {
        &self.context[..self.context_offset.min(self.context.len())]
    }

    /// Context bytes following the match
    pub fn after(&self) -> &[u8] {
        let end = (self.context_offset + self.value_size).min(self.context.len());
        &self.context[end..]
    }
}
