use std::fmt;

use reqwest::Client;
use reqwest::Method;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("path template `{template}` has {slots} parameter slots, got {given} values")]
    ParamCount {
        template: String,
        slots: usize,
        given: usize,
    },

    #[error("unterminated parameter slot in path template `{0}`")]
    BadTemplate(String),

    #[error("expected status {expected}, got {actual}")]
    StatusMismatch {
        expected: StatusCode,
        actual: StatusCode,
    },

    #[error("expected a json body, got: {0}")]
    MalformedBody(String),

    #[error("body field `{path}`: expected {expected}, got {actual}")]
    FieldMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

/// What a response body field must look like for a spec to be satisfied.
#[derive(Debug, Clone)]
pub enum Matcher {
    Equals(Value),
    NotNull,
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Equals(value) => write!(f, "{value}"),
            Matcher::NotNull => write!(f, "a non-null value"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expectation {
    pub path: String,
    pub matcher: Matcher,
}

/// One HTTP call: method, path template with `{slot}` placeholders filled
/// positionally, optional JSON body, and what the response must look like.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub params: Vec<String>,
    pub body: Option<Value>,
    pub expect_status: StatusCode,
    pub expectations: Vec<Expectation>,
}

impl RequestSpec {
    fn new(method: Method, path: &str, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.to_string(),
            params: Vec::new(),
            body,
            expect_status: StatusCode::OK,
            expectations: Vec::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn put(path: &str, body: Value) -> Self {
        Self::new(Method::PUT, path, Some(body))
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    pub fn param(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn expect_status(mut self, status: StatusCode) -> Self {
        self.expect_status = status;
        self
    }

    pub fn expect_field(mut self, path: &str, matcher: Matcher) -> Self {
        self.expectations.push(Expectation {
            path: path.to_string(),
            matcher,
        });
        self
    }

    /// Fills each `{slot}` in the path template with the next positional
    /// parameter. The slot count and the parameter count must agree.
    pub fn render_path(&self) -> Result<String, RequestError> {
        let mut rendered = String::with_capacity(self.path.len());
        let mut remaining = self.path.as_str();
        let mut used = 0;

        while let Some(open) = remaining.find('{') {
            let Some(close) = remaining[open..].find('}') else {
                return Err(RequestError::BadTemplate(self.path.clone()));
            };

            rendered.push_str(&remaining[..open]);
            let value = self.params.get(used).ok_or_else(|| RequestError::ParamCount {
                template: self.path.clone(),
                slots: used + 1 + count_slots(&remaining[open + close + 1..]),
                given: self.params.len(),
            })?;
            rendered.push_str(value);
            used += 1;
            remaining = &remaining[open + close + 1..];
        }
        rendered.push_str(remaining);

        if used != self.params.len() {
            return Err(RequestError::ParamCount {
                template: self.path.clone(),
                slots: used,
                given: self.params.len(),
            });
        }

        Ok(rendered)
    }

    /// A response satisfies the spec only if the status matches and every
    /// field expectation holds, in order. First miss wins.
    pub fn check(&self, response: &CapturedResponse) -> Result<(), RequestError> {
        if response.status != self.expect_status {
            return Err(RequestError::StatusMismatch {
                expected: self.expect_status,
                actual: response.status,
            });
        }

        if self.expectations.is_empty() {
            return Ok(());
        }

        let Some(body) = &response.body_json else {
            return Err(RequestError::MalformedBody(response.body_text.clone()));
        };

        for expectation in &self.expectations {
            let found = lookup(body, &expectation.path);
            let holds = match (&expectation.matcher, found) {
                (Matcher::NotNull, Some(value)) => !value.is_null(),
                (Matcher::Equals(expected), Some(value)) => value == expected,
                (_, None) => false,
            };

            if !holds {
                return Err(RequestError::FieldMismatch {
                    path: expectation.path.clone(),
                    expected: expectation.matcher.to_string(),
                    actual: found
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "<missing>".to_string()),
                });
            }
        }

        Ok(())
    }
}

fn count_slots(template: &str) -> usize {
    template.matches('{').count()
}

/// Walks a dot-separated field path into a JSON body.
fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |value, key| value.get(key))
}

#[derive(Debug)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub body_text: String,
    pub body_json: Option<Value>,
}

impl CapturedResponse {
    pub async fn from_response(resp: reqwest::Response) -> Result<Self, RequestError> {
        let status = resp.status();

        // Consume the body exactly once
        let body_text = resp.text().await?;

        // Attempt to parse JSON, but don't panic; whether a missing JSON
        // body matters is decided by the spec's expectations
        let body_json = serde_json::from_str::<Value>(&body_text).ok();

        Ok(Self {
            status,
            body_text,
            body_json,
        })
    }
}

/// Single-shot executor against a fixed base URL. One network round trip
/// per call, no retries here; retrying is the caller's concern.
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends a rooted path to the base URL, keeping whatever path prefix
    /// the base URL carries (`http://host/api` + `/students` is
    /// `http://host/api/students`, not `http://host/students`).
    fn url_for(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url
    }

    pub async fn execute(&self, spec: &RequestSpec) -> Result<CapturedResponse, RequestError> {
        let url = self.url_for(&spec.render_path()?);

        let request = if let Some(body) = &spec.body {
            self.client.request(spec.method.clone(), url).json(body)
        } else {
            self.client.request(spec.method.clone(), url)
        };

        let response = request.send().await?;
        let captured = CapturedResponse::from_response(response).await?;

        spec.check(&captured)?;

        Ok(captured)
    }
}
