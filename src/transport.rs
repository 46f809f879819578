use std::time::Duration;

use crate::error::TransportError;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A form-encoded POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRequest {
    pub url: String,
    pub user_agent: String,
    pub fields: Vec<(&'static str, String)>,
}

impl FormRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// "POST form, get status". Any response counts as `Ok`; only a request
/// that could not complete is an error.
pub trait Transport: Send + Sync {
    fn post_form(&self, request: &FormRequest) -> Result<u16, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&FormRequest) -> Result<u16, TransportError> + Send + Sync,
{
    fn post_form(&self, request: &FormRequest) -> Result<u16, TransportError> {
        self(request)
    }
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_timeout(UPLOAD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn post_form(&self, request: &FormRequest) -> Result<u16, TransportError> {
        let response = self
            .agent
            .post(&request.url)
            .header("User-Agent", &request.user_agent)
            .send_form(request.fields.iter().map(|(k, v)| (*k, v.as_str())))
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
