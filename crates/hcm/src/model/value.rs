//! Property values as they appear in definitions.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

/// Repository value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Binary,
    Long,
    Double,
    Date,
    Boolean,
    Name,
    Path,
    Reference,
    WeakReference,
    Uri,
    Decimal,
}

impl ValueType {
    /// The name used for `type:` in source files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Binary => "binary",
            ValueType::Long => "long",
            ValueType::Double => "double",
            ValueType::Date => "date",
            ValueType::Boolean => "boolean",
            ValueType::Name => "name",
            ValueType::Path => "path",
            ValueType::Reference => "reference",
            ValueType::WeakReference => "weakreference",
            ValueType::Uri => "uri",
            ValueType::Decimal => "decimal",
        }
    }

    /// Types whose value is written as plain text.
    pub fn is_textual(&self) -> bool {
        !matches!(
            self,
            ValueType::Binary | ValueType::Long | ValueType::Double | ValueType::Boolean
        )
    }

    /// Types that may be given as a `path:` reference.
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Reference | ValueType::WeakReference)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ValueType::String),
            "binary" => Ok(ValueType::Binary),
            "long" => Ok(ValueType::Long),
            "double" => Ok(ValueType::Double),
            "date" => Ok(ValueType::Date),
            "boolean" => Ok(ValueType::Boolean),
            "name" => Ok(ValueType::Name),
            "path" => Ok(ValueType::Path),
            "reference" => Ok(ValueType::Reference),
            "weakreference" => Ok(ValueType::WeakReference),
            "uri" => Ok(ValueType::Uri),
            "decimal" => Ok(ValueType::Decimal),
            _ => Err(format!("Unknown value type: {}", s)),
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Text for every textual type (string, name, path, uri, decimal, ...).
    Text(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<FixedOffset>),
    Binary(Vec<u8>),
}

/// Where the bytes of a resource value currently live.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOrigin {
    /// A file on disk.
    File(PathBuf),
    /// An entry inside a zip or jar archive.
    Archive { archive: PathBuf, entry: String },
    /// Bytes held in memory, typically produced by an export.
    Inline(Arc<Vec<u8>>),
}

impl ResourceOrigin {
    /// Opens the resource for reading.
    pub fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        match self {
            ResourceOrigin::File(path) => Ok(Box::new(File::open(path)?)),
            ResourceOrigin::Archive { archive, entry } => {
                let file = File::open(archive)?;
                let mut zip = zip::ZipArchive::new(file).map_err(std::io::Error::other)?;
                let mut entry = zip.by_name(entry).map_err(std::io::Error::other)?;
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                Ok(Box::new(Cursor::new(bytes)))
            }
            ResourceOrigin::Inline(bytes) => Ok(Box::new(Cursor::new(bytes.as_ref().clone()))),
        }
    }

    /// The on-disk location, when there is one.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            ResourceOrigin::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ResourceOrigin::File(path) => path.display().to_string(),
            ResourceOrigin::Archive { archive, entry } => {
                format!("{}!/{}", archive.display(), entry)
            }
            ResourceOrigin::Inline(bytes) => format!("<{} inline bytes>", bytes.len()),
        }
    }
}

/// A value whose content lives in a separate file next to the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRef {
    /// Path as written in the source: relative to the source file, or
    /// relative to the module's config/content root when it starts with `/`.
    pub path: String,
    pub origin: ResourceOrigin,
    /// Set for resources that do not exist in the module yet; their final
    /// name is chosen when the module is written.
    pub is_new: bool,
}

impl ResourceRef {
    /// A resource that already exists next to its source.
    pub fn existing(path: impl Into<String>, origin: ResourceOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
            is_new: false,
        }
    }

    /// A resource that is written when the module is; `path` is only a name hint.
    pub fn new_resource(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            origin: ResourceOrigin::Inline(Arc::new(bytes)),
            is_new: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Literal(Scalar),
    Resource(ResourceRef),
    /// A reference given by the path of its target node.
    Path(String),
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    value_type: ValueType,
    kind: ValueKind,
}

impl Value {
    /// Creates a value of `value_type`.
    pub fn new(value_type: ValueType, kind: ValueKind) -> Self {
        Self { value_type, kind }
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::text(ValueType::String, text)
    }

    /// A textual value of the given type (name, path, uri, ...).
    pub fn text(value_type: ValueType, text: impl Into<String>) -> Self {
        Self::new(value_type, ValueKind::Literal(Scalar::Text(text.into())))
    }

    pub fn long(value: i64) -> Self {
        Self::new(ValueType::Long, ValueKind::Literal(Scalar::Long(value)))
    }

    pub fn double(value: f64) -> Self {
        Self::new(ValueType::Double, ValueKind::Literal(Scalar::Double(value)))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueType::Boolean, ValueKind::Literal(Scalar::Boolean(value)))
    }

    pub fn date(value: DateTime<FixedOffset>) -> Self {
        Self::new(ValueType::Date, ValueKind::Literal(Scalar::Date(value)))
    }

    pub fn binary(bytes: Vec<u8>) -> Self {
        Self::new(ValueType::Binary, ValueKind::Literal(Scalar::Binary(bytes)))
    }

    /// A value whose content lives in `resource`.
    pub fn resource(value_type: ValueType, resource: ResourceRef) -> Self {
        Self::new(value_type, ValueKind::Resource(resource))
    }

    /// A value given as a repository path.
    pub fn path_reference(value_type: ValueType, path: impl Into<String>) -> Self {
        Self::new(value_type, ValueKind::Path(path.into()))
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.kind, ValueKind::Resource(_))
    }

    pub fn resource_ref(&self) -> Option<&ResourceRef> {
        match &self.kind {
            ValueKind::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn resource_ref_mut(&mut self) -> Option<&mut ResourceRef> {
        match &mut self.kind {
            ValueKind::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// The text of a textual literal.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Literal(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ValueKind::Literal(Scalar::Text(s)) => write!(f, "{}", s),
            ValueKind::Literal(Scalar::Long(v)) => write!(f, "{}", v),
            ValueKind::Literal(Scalar::Double(v)) => write!(f, "{}", v),
            ValueKind::Literal(Scalar::Boolean(v)) => write!(f, "{}", v),
            ValueKind::Literal(Scalar::Date(v)) => write!(f, "{}", v.to_rfc3339()),
            ValueKind::Literal(Scalar::Binary(v)) => write!(f, "<{} bytes>", v.len()),
            ValueKind::Resource(r) => write!(f, "resource:{}", r.path),
            ValueKind::Path(p) => write!(f, "path:{}", p),
        }
    }
}
