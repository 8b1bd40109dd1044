//! Shared-secret guard for pipeline invocations.

use std::fmt;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authorized,
    Denied,
}

#[derive(Clone)]
pub struct AccessGuard {
    expected: Vec<u8>,
}

impl fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGuard").finish_non_exhaustive()
    }
}

impl AccessGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            expected: format!("{BEARER_PREFIX}{secret}").into_bytes(),
        }
    }

    /// Compare the full `Authorization` header value against `Bearer <secret>`.
    pub fn check(&self, authorization: Option<&str>) -> Access {
        match authorization {
            Some(value) if constant_time_eq(value.as_bytes(), &self.expected) => Access::Authorized,
            _ => Access::Denied,
        }
    }
}

/// Equality whose running time depends only on the length of `expected`.
fn constant_time_eq(given: &[u8], expected: &[u8]) -> bool {
    let mut diff = u8::from(given.len() != expected.len());
    for (i, e) in expected.iter().enumerate() {
        let g = given.get(i).copied().unwrap_or(0);
        diff |= g ^ e;
    }
    diff == 0
}
