//! Per-request context.

use std::net::IpAddr;

use uuid::Uuid;

/// Immutable context passed explicitly into every flow function.
///
/// Carries the correlation id that every log line and error path records,
/// plus the requester address for audit entries. There is no ambient
/// request state; handlers construct one of these at the HTTP boundary.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// Correlation id for this request.
    pub request_id: Uuid,

    /// Remote address, when the transport knows it.
    pub remote_addr: Option<IpAddr>,
}

impl RequestContext {
    /// Creates a context with a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            remote_addr: None,
        }
    }

    /// Attaches the requester address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_differ() {
        assert_ne!(RequestContext::new().request_id, RequestContext::new().request_id);
    }

    #[test]
    fn test_with_remote_addr() {
        let ctx = RequestContext::new().with_remote_addr("10.0.0.7".parse().unwrap());
        assert_eq!(ctx.remote_addr.unwrap().to_string(), "10.0.0.7");
    }
}
