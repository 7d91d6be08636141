//! Where configuration documents come from and how their bytes are fetched.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use url::Url;

use super::error::{ConfigError, ErrorKind};

/// Identifies a configuration document: a local file or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    File(PathBuf),
    Url(Url),
}

impl Origin {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Origin::File(path.as_ref().to_path_buf())
    }

    /// Parses a URL origin.
    pub fn url(url: &str) -> Result<Self, url::ParseError> {
        Url::parse(url).map(Origin::Url)
    }

    /// The key used to recognise a document already seen in a chain.
    ///
    /// File paths are canonicalized when they exist so `a/../b.yaml` and
    /// `b.yaml` are the same document.
    pub fn canonical(&self) -> Origin {
        match self {
            Origin::File(path) => std::fs::canonicalize(path)
                .map(Origin::File)
                .unwrap_or_else(|_| self.clone()),
            Origin::Url(_) => self.clone(),
        }
    }

    /// Resolves a parent file reference made from this document.
    ///
    /// Relative paths are taken relative to the referencing file's directory.
    pub fn parent_file(&self, reference: &str) -> Origin {
        let reference = Path::new(reference);
        match self {
            Origin::File(path) if reference.is_relative() => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                Origin::File(dir.join(reference))
            }
            _ => Origin::File(reference.to_path_buf()),
        }
    }

    /// Resolves a parent URL reference made from this document.
    ///
    /// Relative references are joined onto a URL origin.
    pub fn parent_url(&self, reference: &str) -> Result<Origin, url::ParseError> {
        match (Url::parse(reference), self) {
            (Ok(url), _) => Ok(Origin::Url(url)),
            (Err(url::ParseError::RelativeUrlWithoutBase), Origin::Url(base)) => {
                base.join(reference).map(Origin::Url)
            }
            (Err(e), _) => Err(e),
        }
    }

    /// The path component used to detect the document format.
    pub(crate) fn extension(&self) -> Option<String> {
        let path = match self {
            Origin::File(path) => path.clone(),
            Origin::Url(url) => PathBuf::from(url.path()),
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Fetches the raw text of a configuration document.
///
/// Implementations must not cache: every call reads the source afresh.
pub trait SourceProvider: Send + Sync + fmt::Debug {
    fn open(&self, origin: &Origin) -> Result<String, ConfigError>;
}

/// Reads files from the local filesystem and fetches URLs over HTTP.
///
/// `file://` URLs are read from disk. Remote fetches block the calling
/// thread and carry no timeout of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSourceProvider;

impl SourceProvider for DefaultSourceProvider {
    fn open(&self, origin: &Origin) -> Result<String, ConfigError> {
        match origin {
            Origin::File(path) => read_file(path, origin),
            Origin::Url(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => read_file(&path, origin),
                Err(()) => Err(ConfigError::builder(ErrorKind::Io, "Invalid file URL")
                    .detail("the URL does not name a local path")
                    .build(origin)),
            },
            Origin::Url(url) => fetch_url(url, origin),
        }
    }
}

fn read_file(path: &Path, origin: &Origin) -> Result<String, ConfigError> {
    debug!("reading configuration file {}", path.display());
    std::fs::read_to_string(path).map_err(|e| {
        let title = if e.kind() == std::io::ErrorKind::NotFound {
            "Configuration file not found"
        } else {
            "Unable to read configuration file"
        };
        ConfigError::builder(ErrorKind::Io, title)
            .detail(e.to_string())
            .cause(e)
            .build(origin)
    })
}

fn fetch_url(url: &Url, origin: &Origin) -> Result<String, ConfigError> {
    debug!("fetching configuration from {url}");
    reqwest::blocking::get(url.clone())
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(|e| {
            ConfigError::builder(ErrorKind::Io, "Unable to fetch configuration")
                .detail(e.to_string())
                .cause(e)
                .build(origin)
        })
}
