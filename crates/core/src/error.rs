use std::fmt;

/// Failure of an operation that needs the active document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// No document is active (or the editor already dropped it).
    Unavailable,
    /// Save requested on a document that has never been given a path.
    NoSavePath,
    /// Reading or writing the backing file failed.
    Io(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "no active document"),
            Self::NoSavePath => write!(f, "document has no file path; use save-as first"),
            Self::Io(msg) => write!(f, "document IO error: {msg}"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// Malformed arguments or an unusable resource passed to a script-facing call.
///
/// Leaf services log these and hand back an empty result instead of raising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUsageError {
    /// Qualified call name, e.g. `data.load_csv`.
    pub call: String,
    pub message: String,
}

impl ApiUsageError {
    pub fn new(call: impl Into<String>, message: impl Into<String>) -> Self {
        Self { call: call.into(), message: message.into() }
    }
}

impl fmt::Display for ApiUsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.call, self.message)
    }
}

impl std::error::Error for ApiUsageError {}

/// Configuration errors raised while assembling the API registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateNamespace(String),
    DuplicateMember { namespace: String, member: String },
    /// Registration attempted after the registry was built.
    Sealed(String),
    UnknownNamespace(String),
    /// Core namespaces cannot be disabled.
    CoreNamespace(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNamespace(ns) => write!(f, "namespace '{ns}' is already registered"),
            Self::DuplicateMember { namespace, member } => {
                write!(f, "member '{namespace}.{member}' is already registered")
            }
            Self::Sealed(ns) => {
                write!(f, "cannot register '{ns}': the API registry is sealed after startup")
            }
            Self::UnknownNamespace(ns) => write!(f, "no namespace named '{ns}'"),
            Self::CoreNamespace(ns) => write!(f, "namespace '{ns}' is part of the core API and cannot be disabled"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(DocumentError::Unavailable.to_string(), "no active document");
        assert_eq!(
            ApiUsageError::new("data.load_csv", "file not found").to_string(),
            "data.load_csv: file not found"
        );
        let dup = RegistryError::DuplicateMember { namespace: "host".into(), member: "log".into() };
        assert_eq!(dup.to_string(), "member 'host.log' is already registered");
    }
}
