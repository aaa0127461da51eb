//! Request/response model and the network seam used by the controller.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::RequestKey;
use crate::error::{Error, Result};

/// What the request is for, mirroring a browser's request destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// A full-page navigation
  Document,
  Script,
  Style,
  Image,
  Manifest,
  #[default]
  Other,
}

impl Destination {
  /// Guess the destination of a static asset from its path extension.
  pub fn from_path(path: &str) -> Self {
    let ext = path.rsplit('/').next().and_then(|name| name.rsplit_once('.'));
    match ext.map(|(_, ext)| ext.to_ascii_lowercase()).as_deref() {
      None | Some("html") | Some("htm") => Self::Document,
      Some("js") | Some("mjs") => Self::Script,
      Some("css") => Self::Style,
      Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("svg") | Some("webp")
      | Some("ico") => Self::Image,
      Some("json") | Some("webmanifest") => Self::Manifest,
      Some(_) => Self::Other,
    }
  }
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  /// A GET request for a subresource.
  pub fn get(url: Url) -> Self {
    let destination = match Destination::from_path(url.path()) {
      Destination::Document => Destination::Other,
      other => other,
    };
    Self {
      method: Method::GET,
      url,
      destination,
    }
  }

  /// A GET request for a full-page navigation.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Document,
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.destination == Destination::Document
  }

  /// Key under which this request's response is stored.
  pub fn cache_key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// How a response was obtained, mirroring a browser's response type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
  #[default]
  Basic,
  /// Cross-origin response with readable headers
  Cors,
  /// Cross-origin response with nothing readable
  Opaque,
  Error,
}

/// A response, as returned by the network or read back from a cache bucket.
///
/// Bodies are owned bytes, so `clone()` is the copy that gets stored while the
/// original goes back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  #[serde(default)]
  pub headers: Vec<(String, String)>,
  #[serde(default)]
  pub body: Vec<u8>,
  #[serde(default)]
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  /// A 200 response with the given body.
  pub fn ok(body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, body)
  }

  /// A network-error placeholder response (status 0).
  pub fn error() -> Self {
    Self {
      status: 0,
      headers: Vec::new(),
      body: Vec::new(),
      kind: ResponseKind::Error,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Only plain 200 responses are written to a cache bucket.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind != ResponseKind::Error
  }

  /// Body decoded as UTF-8, lossily.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Source of network responses.
///
/// Implementations return `Err` only when no response could be obtained at all;
/// HTTP error statuses are ordinary responses.
#[async_trait]
pub trait Network: Send + Sync + 'static {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Network implementation backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("pnv/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::network("<client>", e.to_string()))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.as_str();

    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| Error::network(url, e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| Error::network(url, format!("failed to read body: {}", e)))?;

    Ok(Response {
      status,
      headers,
      body: body.to_vec(),
      kind: ResponseKind::Basic,
    })
  }
}
