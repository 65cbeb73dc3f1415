// Core types shared by the scripting host and the editor surface

pub mod document;
pub mod error;
pub mod host_log;
pub mod policy;
pub mod registry;
pub mod ui;

pub use document::{Document, DocumentCell, DocumentProxy, SharedDocument};
pub use error::{ApiUsageError, DocumentError, RegistryError};
pub use host_log::{HostLog, LogEntry, LogLevel};
pub use registry::{ApiMember, ApiRegistry, MemberKind, Namespace, RegistryBuilder, RegistryConfig};
pub use ui::{ui_channel, UiEvent, UiNotifier};
