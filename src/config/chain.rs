//! Following parent references from a document up to its chain root.

use std::collections::HashSet;

use log::{debug, warn};

use super::error::{ConfigError, ErrorKind};
use super::file::load_document;
use super::source::{Origin, SourceProvider};
use super::tree::{Document, Node, Scalar};

/// Key naming a parent document on the local filesystem.
pub const PARENT_FILE_KEY: &str = "parentConfigurationFile";

/// Key naming a parent document by URL.
pub const PARENT_URL_KEY: &str = "parentConfigurationUrl";

/// What to do when a parent reference points back into the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Stop following parents and merge what was collected so far.
    #[default]
    Lenient,
    /// Fail with [`ErrorKind::CircularParentReference`].
    Strict,
}

/// Documents linked by parent references, ancestor first.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChain {
    documents: Vec<Document>,
}

impl ConfigChain {
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn origins(&self) -> impl Iterator<Item = &Origin> {
        self.documents.iter().map(|document| &document.origin)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Loads `start` and every ancestor it names.
///
/// Parent keys are removed from each document as it is recorded. Each
/// origin is visited at most once, so resolution terminates even when
/// references form a cycle.
pub fn resolve_chain(
    provider: &dyn SourceProvider,
    start: Origin,
    policy: CyclePolicy,
) -> Result<ConfigChain, ConfigError> {
    let mut visited = HashSet::new();
    let mut documents: Vec<Document> = Vec::new();
    let mut next = Some(start);

    while let Some(origin) = next.take() {
        if !visited.insert(origin.canonical()) {
            let referrer = documents.last().map(|d| d.origin.to_string()).unwrap_or_default();
            match policy {
                CyclePolicy::Lenient => {
                    warn!(
                        "{referrer} names {origin} as its parent, which is already part of \
                         the configuration chain; using the {} document(s) loaded so far",
                        documents.len()
                    );
                    break;
                }
                CyclePolicy::Strict => {
                    return Err(ConfigError::builder(
                        ErrorKind::CircularParentReference,
                        "Circular parent configuration reference",
                    )
                    .detail(format!("{origin} is already part of the configuration chain"))
                    .build(referrer));
                }
            }
        }

        let mut document = match documents.last() {
            Some(child) => load_document(provider, &origin)
                .map_err(|e| e.with_referrer(&child.origin))?,
            None => load_document(provider, &origin)?,
        };
        next = take_parent(&mut document)?;
        if let Some(parent) = &next {
            debug!("{} inherits from {}", document.origin, parent);
        }
        documents.push(document);
    }

    documents.reverse();
    Ok(ConfigChain { documents })
}

/// Removes the parent keys from a document, returning the parent's origin.
fn take_parent(document: &mut Document) -> Result<Option<Origin>, ConfigError> {
    let Node::Object(root) = &mut document.root else {
        return Ok(None);
    };
    let file = root.remove(PARENT_FILE_KEY);
    let url = root.remove(PARENT_URL_KEY);
    let origin = &document.origin;

    let reference = |key: &str, node: Node| match node {
        Node::Scalar(scalar) if is_text(&scalar) => Ok(scalar.to_string()),
        _ => Err(ConfigError::builder(
            ErrorKind::InvalidParentReference,
            "Invalid parent configuration reference",
        )
        .field_path(key)
        .detail("expected a string")
        .build(origin)),
    };

    match (file, url) {
        (Some(file), url) => {
            if url.is_some() {
                warn!("{origin} names both {PARENT_FILE_KEY} and {PARENT_URL_KEY}; using the file");
            }
            let file = reference(PARENT_FILE_KEY, file)?;
            Ok(Some(origin.parent_file(&file)))
        }
        (None, Some(url)) => {
            let url = reference(PARENT_URL_KEY, url)?;
            origin.parent_url(&url).map(Some).map_err(|e| {
                ConfigError::builder(
                    ErrorKind::InvalidParentReference,
                    "Invalid parent configuration URL",
                )
                .field_path(PARENT_URL_KEY)
                .detail(format!("{url}: {e}"))
                .cause(e)
                .build(origin)
            })
        }
        (None, None) => Ok(None),
    }
}

fn is_text(scalar: &Scalar) -> bool {
    matches!(scalar, Scalar::String(s) if !s.trim().is_empty())
}
