//! Opt-in capture of upstream request and response bodies.
//!
//! Nothing is allocated on the normal path: the capture handle exists
//! only when debug was requested for the call, so production traffic
//! carries no body-mirroring overhead.

use crate::GenerateParams;

pub(crate) struct DebugCapture {
    provider: &'static str,
    request_id: String,
}

impl DebugCapture {
    /// A capture handle, only when the call asked for one.
    pub(crate) fn if_enabled(params: &GenerateParams, provider: &'static str) -> Option<Self> {
        params.debug.then(|| Self {
            provider,
            request_id: params.request_id.clone(),
        })
    }

    pub(crate) fn request(&self, body: &str) {
        log::debug!(
            "upstream request capture: provider={} request_id={} body={body}",
            self.provider,
            self.request_id
        );
    }

    pub(crate) fn response(&self, body: &str) {
        log::debug!(
            "upstream response capture: provider={} request_id={} body={body}",
            self.provider,
            self.request_id
        );
    }
}
