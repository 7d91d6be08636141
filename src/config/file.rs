//! Parsing configuration documents into trees.

use log::debug;

use super::error::{ConfigError, ErrorKind, Location};
use super::source::{Origin, SourceProvider};
use super::tree::{Document, Node, Scalar};

/// Document syntaxes understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Detects the format from the origin's extension.
    ///
    /// Anything that is not `.json` or `.toml` is read as YAML.
    pub fn detect(origin: &Origin) -> Self {
        match origin.extension().as_deref() {
            Some("json") => Format::Json,
            Some("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }

    /// The format name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Yaml => "YAML",
            Format::Json => "JSON",
            Format::Toml => "TOML",
        }
    }
}

/// Fetches and parses the document at `origin`.
pub fn load_document(
    provider: &dyn SourceProvider,
    origin: &Origin,
) -> Result<Document, ConfigError> {
    let contents = provider.open(origin)?;
    let format = Format::detect(origin);
    debug!("parsing {} as {}", origin, format.name());

    let root = parse_document(&contents, format, origin)?;
    Ok(Document {
        origin: origin.clone(),
        root,
    })
}

/// Parses document text in the given format.
///
/// Fails with [`ErrorKind::EmptyDocument`] when the text holds no value.
pub fn parse_document(
    contents: &str,
    format: Format,
    origin: &Origin,
) -> Result<Node, ConfigError> {
    let empty = || {
        ConfigError::builder(
            ErrorKind::EmptyDocument,
            format!("Configuration at {origin} must not be empty"),
        )
        .build(origin)
    };

    if contents.trim().is_empty() {
        return Err(empty());
    }

    let root = match format {
        Format::Yaml => serde_yaml::from_str::<serde_yaml::Value>(contents)
            .map(Node::from)
            .map_err(|e| {
                let location = e.location().map(|l| Location::new(l.line(), l.column()));
                malformed(format, origin, location, e)
            })?,
        Format::Json => serde_json::from_str::<serde_json::Value>(contents)
            .map(Node::from)
            .map_err(|e| {
                let location = (e.line() > 0).then(|| Location::new(e.line(), e.column()));
                malformed(format, origin, location, e)
            })?,
        Format::Toml => toml::from_str::<toml::Table>(contents)
            .map(|table| Node::from(toml::Value::Table(table)))
            .map_err(|e| {
                let location = e
                    .span()
                    .map(|span| Location::from_offset(contents, span.start));
                malformed(format, origin, location, e)
            })?,
    };

    if matches!(root, Node::Scalar(Scalar::Null)) {
        return Err(empty());
    }

    Ok(root)
}

fn malformed<E>(format: Format, origin: &Origin, location: Option<Location>, e: E) -> ConfigError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ConfigError::builder(
        ErrorKind::MalformedDocument,
        format!("Malformed {}", format.name()),
    )
    .location(location)
    .detail(e.to_string())
    .cause(e)
    .build(origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::DefaultSourceProvider;
    use std::io::Write;
    use tempfile::Builder;

    fn origin(name: &str) -> Origin {
        Origin::file(name)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::detect(&origin("a.json")), Format::Json);
        assert_eq!(Format::detect(&origin("a.toml")), Format::Toml);
        assert_eq!(Format::detect(&origin("a.yml")), Format::Yaml);
        assert_eq!(Format::detect(&origin("a")), Format::Yaml);
    }

    #[test]
    fn test_parses_all_formats_to_same_tree() {
        let yaml = parse_document("server:\n  port: 8080\n", Format::Yaml, &origin("a.yaml"));
        let json = parse_document(r#"{"server": {"port": 8080}}"#, Format::Json, &origin("a.json"));
        let toml = parse_document("[server]\nport = 8080\n", Format::Toml, &origin("a.toml"));

        let yaml = yaml.unwrap();
        assert_eq!(yaml, json.unwrap());
        assert_eq!(yaml, toml.unwrap());
        assert_eq!(
            yaml.pointer(["server", "port"]),
            Some(&Node::Scalar(Scalar::Integer(8080)))
        );
    }

    #[test]
    fn test_empty_document() {
        for contents in ["", "   \n", "~\n"] {
            let err = parse_document(contents, Format::Yaml, &origin("empty.yaml")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EmptyDocument);
            assert_eq!(err.title(), "Configuration at empty.yaml must not be empty");
        }
    }

    #[test]
    fn test_malformed_yaml_has_location() {
        let err = parse_document("server:\n  port: [8080\n", Format::Yaml, &origin("bad.yaml"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
        assert_eq!(err.title(), "Malformed YAML");
        assert!(err.location().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_malformed_json_has_location() {
        let err = parse_document("{\n  \"a\": ,\n}", Format::Json, &origin("bad.json"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
        assert_eq!(err.location().map(|l| l.line), Some(2));
    }

    #[test]
    fn test_malformed_toml_has_location() {
        let err = parse_document("a = 1\nb = ]\nc = 2\n", Format::Toml, &origin("bad.toml")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
        assert_eq!(err.title(), "Malformed TOML");
        assert_eq!(err.location().map(|l| l.line), Some(2));
    }

    #[test]
    fn test_load_document_from_disk() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"name": "demo"}}"#).unwrap();

        let document = load_document(&DefaultSourceProvider, &Origin::file(file.path())).unwrap();
        assert_eq!(document.root.get("name"), Some(&Node::string("demo")));
        assert_eq!(document.origin, Origin::file(file.path()));
    }
}
