//! Deployment descriptors and the asset lists they carry.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheVersion;
use crate::error::{Error, Result};

/// Version string of the built-in deployment.
pub const BUILTIN_VERSION: &str = "pera-nai-vai-v1.0.0";

/// Default path of the document served to failed navigations.
pub const DEFAULT_OFFLINE_DOCUMENT: &str = "/index.html";

/// Files to cache immediately on install
const CORE_FILES: &[&str] = &[
  "/",
  "/index.html",
  "/tools.css",
  "/theme.js",
  "/category-filter.js",
  "/donate.js",
  "/components.css",
  "/bkash_donate_pera_nai_vai.jpg",
];

/// Tool pages, cached on first visit
const TOOL_PAGES: &[&str] = &[
  "/jpeg-compressor.html",
  "/tweet-to-image.html",
  "/qr-generator.html",
  "/email-extractor.html",
  "/invoice-generator.html",
  "/photo-resizer.html",
  "/bangla-converter.html",
  "/financial-calculators.html",
  "/bd-tax-calculator.html",
  "/mfs-helper.html",
  "/land-converter.html",
  "/color-palette.html",
];

/// Tool scripts, cached on first use
const TOOL_SCRIPTS: &[&str] = &[
  "/jpeg-compressor.js",
  "/qr-generator.js",
  "/email-extractor.js",
  "/invoice-generator.js",
  "/photo-resizer.js",
  "/bangla-converter.js",
  "/financial-calculators.js",
  "/bd-tax-calculator.js",
  "/mfs-helper.js",
  "/land-converter.js",
  "/color-palette.js",
  "/ToolBase.js",
];

/// Ordered set of asset paths, relative to the origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest(Vec<String>);

impl AssetManifest {
  /// Build a manifest, dropping duplicate paths while keeping the first occurrence.
  pub fn new<I, S>(paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut seen = std::collections::HashSet::new();
    let paths = paths
      .into_iter()
      .map(Into::into)
      .filter(|p: &String| seen.insert(p.clone()))
      .collect();
    Self(paths)
  }

  pub fn paths(&self) -> &[String] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Resolve every path against the origin. A path that lands on another
  /// origin is an error.
  pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>> {
    self
      .0
      .iter()
      .map(|path| -> Result<Url> {
        let url = origin.join(path)?;
        if url.origin() != origin.origin() {
          return Err(Error::Config(format!("asset path {} leaves {}", path, origin)));
        }
        Ok(url)
      })
      .collect()
  }
}

/// Everything an origin publishes about one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
  pub version: CacheVersion,
  /// Cached eagerly at install time
  pub core: AssetManifest,
  /// Cached lazily on first request
  #[serde(default)]
  pub on_demand: AssetManifest,
  #[serde(default = "default_offline_document")]
  pub offline_document: String,
}

fn default_offline_document() -> String {
  DEFAULT_OFFLINE_DOCUMENT.to_string()
}

impl DeploymentDescriptor {
  /// The asset lists the site ships with.
  pub fn builtin() -> Self {
    Self {
      version: CacheVersion::from(BUILTIN_VERSION),
      core: AssetManifest::new(CORE_FILES.iter().copied()),
      on_demand: AssetManifest::new(TOOL_PAGES.iter().chain(TOOL_SCRIPTS).copied()),
      offline_document: default_offline_document(),
    }
  }

  pub fn from_json(bytes: &[u8]) -> Result<Self> {
    let descriptor: Self = serde_json::from_slice(bytes)?;
    descriptor.validate()?;
    Ok(descriptor)
  }

  pub fn validate(&self) -> Result<()> {
    if self.version.as_str().trim().is_empty() {
      return Err(Error::Config("deployment version is empty".to_string()));
    }
    if let Some(bad) = self
      .core
      .paths()
      .iter()
      .chain(self.on_demand.paths())
      .find(|p| !is_origin_path(p))
    {
      return Err(Error::Config(format!(
        "asset path {} must be absolute",
        bad
      )));
    }
    if !is_origin_path(&self.offline_document) {
      return Err(Error::Config(format!(
        "offline document {} must be an absolute path",
        self.offline_document
      )));
    }
    Ok(())
  }
}

/// Absolute path on the same origin; `//host/..` names another host.
fn is_origin_path(path: &str) -> bool {
  path.starts_with('/') && !path.starts_with("//")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builtin_descriptor() {
    let descriptor = DeploymentDescriptor::builtin();
    assert_eq!(descriptor.version.as_str(), BUILTIN_VERSION);
    assert_eq!(descriptor.core.len(), 8);
    assert_eq!(descriptor.on_demand.len(), 24);
    assert_eq!(descriptor.offline_document, "/index.html");
    assert!(descriptor.validate().is_ok());
  }

  #[test]
  fn test_manifest_dedupes_paths() {
    let manifest = AssetManifest::new(["/", "/app.css", "/"]);
    assert_eq!(manifest.paths(), &["/".to_string(), "/app.css".to_string()]);
  }

  #[test]
  fn test_resolve_against_origin() {
    let origin = Url::parse("https://peranaivai.example").unwrap();
    let urls = AssetManifest::new(["/", "/app.css"]).resolve(&origin).unwrap();
    assert_eq!(urls[0].as_str(), "https://peranaivai.example/");
    assert_eq!(urls[1].as_str(), "https://peranaivai.example/app.css");
  }

  #[test]
  fn test_descriptor_from_json_defaults() {
    let json = br#"{ "version": "v2", "core": ["/", "/app.css"] }"#;
    let descriptor = DeploymentDescriptor::from_json(json).unwrap();
    assert_eq!(descriptor.version, CacheVersion::from("v2"));
    assert!(descriptor.on_demand.is_empty());
    assert_eq!(descriptor.offline_document, DEFAULT_OFFLINE_DOCUMENT);
  }

  #[test]
  fn test_descriptor_rejects_relative_paths() {
    let json = br#"{ "version": "v2", "core": ["app.css"] }"#;
    assert!(DeploymentDescriptor::from_json(json).is_err());
  }

  #[test]
  fn test_descriptor_rejects_other_hosts() {
    let json = br#"{ "version": "v2", "core": ["/", "//evil.example/x.js"] }"#;
    assert!(DeploymentDescriptor::from_json(json).is_err());

    let json = br#"{ "version": "v2", "core": ["/"], "offline_document": "https://other.example/" }"#;
    assert!(DeploymentDescriptor::from_json(json).is_err());

    let json = br#"{ "version": "v2", "core": ["/"], "offline_document": "//other.example/" }"#;
    assert!(DeploymentDescriptor::from_json(json).is_err());
  }

  #[test]
  fn test_resolve_stays_on_origin() {
    let origin = Url::parse("https://peranaivai.example").unwrap();
    let manifest = AssetManifest::new(["/app.css", "//evil.example/x.js"]);
    assert!(manifest.resolve(&origin).is_err());
  }

  #[test]
  fn test_descriptor_rejects_empty_version() {
    let json = br#"{ "version": " ", "core": [] }"#;
    assert!(DeploymentDescriptor::from_json(json).is_err());
  }
}
