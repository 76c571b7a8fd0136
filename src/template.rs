//! Request templates and the per-dispatch cloner.
//!
//! A [`RequestTemplate`] is built once, before a run starts, and is read-only
//! from then on. Every dispatch calls [`RequestTemplate::instantiate`] to get
//! its own [`reqwest::Request`]; clones are never shared between workers.
//!
//! The body is buffered into a [`Bytes`] when the template is built. Each
//! clone gets a new handle over that same immutable buffer, so sending one
//! request can never drain or corrupt the body of another one, and cloning
//! costs a reference count bump instead of a copy. A body source that cannot
//! be read fails at [`TemplateBuilder::build`], not halfway through a run.

use std::{fs, io::Read, path::Path, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use bytes::Bytes;
use reqwest::{
    Body, Method, Request, Url,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};

use crate::error::{Error, Result};

/// Immutable prototype of the request a run replays.
#[derive(Clone, Debug)]
pub struct RequestTemplate {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl RequestTemplate {
    /// Start building a template that targets `url`.
    ///
    /// Parsing errors are held until [`TemplateBuilder::build`].
    pub fn builder(url: impl AsRef<str>) -> TemplateBuilder {
        let raw = url.as_ref();
        let inner = Url::parse(raw)
            .map_err(|e| Error::InvalidUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })
            .and_then(|url| match url.scheme() {
                "http" | "https" => Ok(url),
                other => Err(Error::UnsupportedScheme(other.to_string())),
            })
            .map(|url| RequestTemplate {
                method: Method::GET,
                url,
                headers: HeaderMap::new(),
                body: None,
                timeout: None,
            });

        TemplateBuilder { inner }
    }

    /// Produce a fresh request for one dispatch.
    pub fn instantiate(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.timeout_mut() = self.timeout;
        if let Some(body) = &self.body {
            *request.body_mut() = Some(Body::from(body.clone()));
        }
        request
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Builder for [`RequestTemplate`].
///
/// The first error wins; later calls become no-ops and `build` reports it.
#[derive(Debug)]
#[must_use]
pub struct TemplateBuilder {
    inner: Result<RequestTemplate>,
}

impl TemplateBuilder {
    fn with(mut self, f: impl FnOnce(&mut RequestTemplate) -> Result<()>) -> Self {
        if let Ok(template) = &mut self.inner {
            if let Err(e) = f(template) {
                self.inner = Err(e);
            }
        }
        self
    }

    pub fn method(self, method: impl AsRef<str>) -> Self {
        self.with(|t| {
            let raw = method.as_ref();
            t.method = Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::InvalidMethod(raw.to_string()))?;
            Ok(())
        })
    }

    /// Append a header. Repeated names keep every value.
    pub fn header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.with(|t| {
            let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
            t.headers.append(name, value);
            Ok(())
        })
    }

    /// Merge an already-validated header map, replacing existing names.
    pub fn headers(self, headers: HeaderMap) -> Self {
        self.with(|t| {
            for (name, value) in headers.iter() {
                t.headers.insert(name.clone(), value.clone());
            }
            Ok(())
        })
    }

    pub fn content_type(self, value: impl AsRef<str>) -> Self {
        self.with(|t| {
            let (name, value) = parse_header(CONTENT_TYPE.as_str(), value.as_ref())?;
            t.headers.insert(name, value);
            Ok(())
        })
    }

    pub fn basic_auth(self, username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        self.with(|t| {
            let token = B64.encode(format!("{}:{}", username.as_ref(), password.as_ref()));
            let mut value = HeaderValue::from_str(&format!("Basic {token}")).map_err(|e| {
                Error::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            t.headers.insert(AUTHORIZATION, value);
            Ok(())
        })
    }

    /// Use an in-memory body.
    pub fn body(self, body: impl Into<Bytes>) -> Self {
        self.with(|t| {
            t.body = Some(body.into());
            Ok(())
        })
    }

    /// Buffer a body from any reader. The reader is consumed exactly once.
    pub fn body_reader(self, mut reader: impl Read) -> Self {
        self.with(|t| {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).map_err(Error::Body)?;
            t.body = Some(Bytes::from(buf));
            Ok(())
        })
    }

    pub fn body_file(self, path: impl AsRef<Path>) -> Self {
        self.with(|t| {
            t.body = Some(Bytes::from(fs::read(path).map_err(Error::Body)?));
            Ok(())
        })
    }

    /// Per-request timeout applied by the transport.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.with(|t| {
            t.timeout = Some(timeout);
            Ok(())
        })
    }

    pub fn build(self) -> Result<RequestTemplate> {
        self.inner
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let invalid = |reason: String| Error::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let header_name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::from_str(value.trim()).map_err(|e| invalid(e.to_string()))?;
    Ok((header_name, header_value))
}
