//! Deep copy of caller-owned data into envelope payloads
//!
//! A submission borrows the caller's buffers only for the duration of the
//! `submit_with` call. Every variable-length field is copied into a fresh
//! allocation through a [`CopyScope`], so the caller may reuse or free its
//! buffers as soon as the call returns.
//!
//! A field that cannot be copied (over `max_field_len`, or the allocator refuses)
//! is logged, then handled per [`CopyPolicy`]: `Reject` fails the submission
//! with `AllocationFailure`; `Degrade` substitutes an empty field and marks the
//! envelope degraded so the receiving side can tell.

use blemesh_core::{CopyConfig, CopyPolicy, MeshError, Result};
use tracing::{error, warn};

/// Copies nested fields according to a policy
#[derive(Debug, Clone)]
pub struct DeepCopier {
    policy: CopyPolicy,
    max_field_len: usize,
}

impl Default for DeepCopier {
    fn default() -> Self {
        Self::from_config(&CopyConfig::default())
    }
}

impl DeepCopier {
    pub fn new(policy: CopyPolicy, max_field_len: usize) -> Self {
        Self {
            policy,
            max_field_len,
        }
    }

    pub fn from_config(config: &CopyConfig) -> Self {
        Self::new(config.policy, config.max_field_len)
    }

    pub fn policy(&self) -> CopyPolicy {
        self.policy
    }

    /// Start copying one payload
    pub fn scope(&self) -> CopyScope<'_> {
        CopyScope {
            copier: self,
            degraded: false,
        }
    }
}

/// Copy state for one payload
pub struct CopyScope<'a> {
    copier: &'a DeepCopier,
    degraded: bool,
}

impl CopyScope<'_> {
    /// Copy a byte field
    pub fn bytes(&mut self, field: &'static str, src: &[u8]) -> Result<Vec<u8>> {
        self.slice(field, src)
    }

    /// Copy a slice field
    pub fn slice<T: Clone>(&mut self, field: &'static str, src: &[T]) -> Result<Vec<T>> {
        if let Some(copy) = allocate(src, self.copier.max_field_len) {
            return Ok(copy);
        }

        error!(
            "Failed to copy {} ({} elements, limit {})",
            field,
            src.len(),
            self.copier.max_field_len
        );
        match self.copier.policy {
            CopyPolicy::Reject => Err(MeshError::AllocationFailure {
                field,
                len: src.len(),
            }),
            CopyPolicy::Degrade => {
                warn!("Delivering {} empty", field);
                self.degraded = true;
                Ok(Vec::new())
            }
        }
    }

    /// Whether any field so far was delivered empty
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

fn allocate<T: Clone>(src: &[T], max_len: usize) -> Option<Vec<T>> {
    if src.len() > max_len {
        return None;
    }
    let mut copy = Vec::new();
    copy.try_reserve_exact(src.len()).ok()?;
    copy.extend_from_slice(src);
    Some(copy)
}
