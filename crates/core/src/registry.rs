//! API registry: the catalogue of host objects exposed to scripts.
//!
//! Built once at startup through [`RegistryBuilder`], then shared read-only as
//! `Arc<ApiRegistry>`. Script bindings resolve every member access against it,
//! and the completion provider lists members from it.
//!
//! # Built-in surface
//!
//! - `host.log(message)`, `host.active_doc`
//! - `ui.show_message(text, title)`, `ui.status_bar(text)`
//! - `data.load_csv(path)`, `data.process_table(table)`, `data.save_csv(table, path)`
//! - `doc.file_path`, `doc.page_count`, `doc.is_dirty`, `doc.content`, `doc.save(path?)`
//! - `math.*` statistics and number helpers, `fs.*` file and directory helpers
//!
//! `host`, `ui`, `data` and `doc` are core namespaces. `math` and `fs` can be
//! disabled at startup with [`RegistryBuilder::set_enabled`]; a disabled
//! namespace stays in the docs but cannot be resolved, completed or bound.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Method,
    Property,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::Property => "property",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiMember {
    pub name: String,
    pub kind: MemberKind,
    pub namespace: String,
    pub signature: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Lower sorts first in completion lists.
    pub rank: u32,
    /// Only meaningful for properties.
    pub writable: bool,
}

impl ApiMember {
    /// `host.log`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    pub name: String,
    pub description: String,
    /// Core namespaces cannot be disabled.
    pub core: bool,
    pub enabled: bool,
    pub members: Vec<ApiMember>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), core: false, enabled: true, members: Vec::new() }
    }

    pub fn core(mut self) -> Self {
        self.core = true;
        self
    }

    pub fn method(self, name: &str, signature: &str, description: &str) -> Self {
        self.push(name, MemberKind::Method, signature, description, false)
    }

    pub fn property(self, name: &str, signature: &str, description: &str) -> Self {
        self.push(name, MemberKind::Property, signature, description, false)
    }

    pub fn writable_property(self, name: &str, signature: &str, description: &str) -> Self {
        self.push(name, MemberKind::Property, signature, description, true)
    }

    /// Attach a usage example to the most recently added member.
    pub fn example(mut self, example: &str) -> Self {
        if let Some(last) = self.members.last_mut() {
            last.example = Some(example.to_string());
        }
        self
    }

    /// Set the relevance rank of the most recently added member.
    pub fn rank(mut self, rank: u32) -> Self {
        if let Some(last) = self.members.last_mut() {
            last.rank = rank;
        }
        self
    }

    pub fn member(&self, name: &str) -> Option<&ApiMember> {
        self.members.iter().find(|m| m.name == name)
    }

    fn push(mut self, name: &str, kind: MemberKind, signature: &str, description: &str, writable: bool) -> Self {
        self.members.push(ApiMember {
            name: name.to_string(),
            kind,
            namespace: self.name.clone(),
            signature: signature.to_string(),
            description: description.to_string(),
            example: None,
            rank: 0,
            writable,
        });
        self
    }
}

/// Read-only startup configuration handed to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryConfig {
    pub host_name: String,
    pub host_version: String,
    /// Directories searched, in order, when a script is run by name.
    pub script_dirs: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host_name: "macrohost".to_string(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            script_dirs: Vec::new(),
        }
    }
}

/// Collects namespaces during startup. Consumed by [`RegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    namespaces: Vec<Namespace>,
}

impl RegistryBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config, namespaces: Vec::new() }
    }

    pub fn register(&mut self, namespace: Namespace) -> Result<(), RegistryError> {
        if self.namespaces.iter().any(|ns| ns.name == namespace.name) {
            return Err(RegistryError::DuplicateNamespace(namespace.name));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(namespace.members.len());
        for member in &namespace.members {
            if seen.contains(&member.name.as_str()) {
                return Err(RegistryError::DuplicateMember {
                    namespace: namespace.name.clone(),
                    member: member.name.clone(),
                });
            }
            seen.push(&member.name);
        }
        self.namespaces.push(namespace);
        Ok(())
    }

    /// Builder preloaded with the built-in namespaces.
    pub fn standard(config: RegistryConfig) -> Result<Self, RegistryError> {
        let mut builder = Self::new(config);
        for ns in standard_namespaces() {
            builder.register(ns)?;
        }
        Ok(builder)
    }

    /// Enable or disable a registered namespace. Core namespaces stay enabled.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let ns = self
            .namespaces
            .iter_mut()
            .find(|ns| ns.name == name)
            .ok_or_else(|| RegistryError::UnknownNamespace(name.to_string()))?;
        if ns.core && !enabled {
            return Err(RegistryError::CoreNamespace(name.to_string()));
        }
        if ns.enabled != enabled {
            log::info!("namespace '{}' {}", name, if enabled { "enabled" } else { "disabled" });
        }
        ns.enabled = enabled;
        Ok(())
    }

    pub fn build(self) -> ApiRegistry {
        let index = self
            .namespaces
            .iter()
            .enumerate()
            .filter(|(_, ns)| ns.enabled)
            .map(|(i, ns)| (ns.name.clone(), i))
            .collect();
        ApiRegistry { config: self.config, namespaces: self.namespaces, index }
    }
}

/// Output format for [`ApiRegistry::render_docs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Markdown,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Enabled namespaces; `methods` and `properties` count only their members.
    pub namespaces: usize,
    pub disabled: usize,
    pub methods: usize,
    pub properties: usize,
}

/// Immutable catalogue of namespaces and members.
#[derive(Debug)]
pub struct ApiRegistry {
    config: RegistryConfig,
    namespaces: Vec<Namespace>,
    index: HashMap<String, usize>,
}

impl ApiRegistry {
    /// The built-in surface with every namespace enabled.
    pub fn standard(config: RegistryConfig) -> Result<Self, RegistryError> {
        Ok(RegistryBuilder::standard(config)?.build())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Always fails: the registry cannot change once built.
    pub fn register(&self, namespace: Namespace) -> Result<(), RegistryError> {
        log::error!("rejected late registration of namespace '{}'", namespace.name);
        Err(RegistryError::Sealed(namespace.name))
    }

    /// All namespaces in registration order, disabled ones included.
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn enabled_namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter().filter(|ns| ns.enabled)
    }

    /// Enabled namespace by name.
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.index.get(name).map(|&i| &self.namespaces[i])
    }

    /// Members of `namespace`, ordered by rank then name. A trailing `.` or `:`
    /// is ignored, so `lookup("host.")` and `lookup("host")` agree.
    pub fn lookup(&self, namespace: &str) -> Vec<&ApiMember> {
        let name = namespace.trim_end_matches(['.', ':']);
        let Some(ns) = self.namespace(name) else {
            return Vec::new();
        };
        let mut members: Vec<&ApiMember> = ns.members.iter().collect();
        members.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
        members
    }

    pub fn resolve(&self, namespace: &str, member: &str) -> Option<&ApiMember> {
        self.namespace(namespace).and_then(|ns| ns.member(member))
    }

    pub fn stats(&self) -> RegistryStats {
        let members = self.enabled_namespaces().flat_map(|ns| ns.members.iter());
        let (methods, properties) = members.fold((0, 0), |(m, p), member| match member.kind {
            MemberKind::Method => (m + 1, p),
            MemberKind::Property => (m, p + 1),
        });
        let enabled = self.enabled_namespaces().count();
        RegistryStats { namespaces: enabled, disabled: self.namespaces.len() - enabled, methods, properties }
    }

    pub fn render_docs(&self, format: DocFormat) -> Result<String, String> {
        match format {
            DocFormat::Json => {
                let doc = serde_json::json!({
                    "host": self.config.host_name,
                    "version": self.config.host_version,
                    "stats": self.stats(),
                    "namespaces": self.namespaces,
                });
                serde_json::to_string_pretty(&doc).map_err(|e| e.to_string())
            }
            DocFormat::Markdown => Ok(self.render_markdown()),
        }
    }

    fn render_markdown(&self) -> String {
        let mut out = format!("# {} scripting API ({})\n", self.config.host_name, self.config.host_version);
        for ns in &self.namespaces {
            let state = if ns.enabled { "" } else { " (disabled)" };
            out.push_str(&format!("\n## `{}`{}\n\n{}\n\n", ns.name, state, ns.description));
            out.push_str("| Member | Kind | Signature | Description |\n|---|---|---|---|\n");
            let mut members: Vec<&ApiMember> = ns.members.iter().collect();
            members.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
            for member in members {
                let kind = if member.writable { "property (read/write)" } else { member.kind.as_str() };
                out.push_str(&format!(
                    "| `{}` | {} | `{}` | {} |\n",
                    member.name, kind, member.signature, member.description
                ));
            }
            for member in ns.members.iter().filter(|m| m.example.is_some()) {
                if let Some(example) = &member.example {
                    out.push_str(&format!("\n`{}` example:\n\n```lua\n{}\n```\n", member.qualified_name(), example));
                }
            }
        }
        out
    }
}

fn standard_namespaces() -> Vec<Namespace> {
    vec![
        Namespace::new("host", "Host application services.")
            .core()
            .method("log", "host.log(message)", "Append a message to the host log.")
            .example("host.log(\"starting import\")")
            .property("active_doc", "host.active_doc", "The active document, or nil when none is open."),
        Namespace::new("ui", "User interface notifications.")
            .core()
            .method("show_message", "ui.show_message(text, title?)", "Show a modal notification.")
            .example("ui.show_message(\"Import finished\", \"Done\")")
            .method("status_bar", "ui.status_bar(text)", "Update the status bar text."),
        Namespace::new("data", "Tabular data loading and processing.")
            .core()
            .method("load_csv", "data.load_csv(path) -> table", "Load a comma-delimited file with a header line. Returns an empty table on failure.")
            .example("local t = data.load_csv(\"sales.csv\")\nprint(t.row_count)")
            .method("process_table", "data.process_table(table) -> table", "Trim values, drop blank rows and convert columns to their inferred types. Returns a new table.")
            .method("save_csv", "data.save_csv(table, path) -> boolean", "Write a table as CSV. Returns false on failure.")
            .rank(1),
        Namespace::new("doc", "The active document.")
            .core()
            .property("file_path", "doc.file_path", "Path of the document file, or nil if unsaved.")
            .property("page_count", "doc.page_count", "Number of pages (500 characters per page).")
            .property("is_dirty", "doc.is_dirty", "True when there are unsaved changes.")
            .writable_property("content", "doc.content", "Full document text. Assigning replaces it.")
            .method("save", "doc.save(path?)", "Save the document and clear the dirty flag. With a path, save there and adopt it.")
            .example("doc.content = doc.content .. \"\\n-- reviewed\"\ndoc.save()"),
        Namespace::new("math", "Statistics and number helpers. Lua's own math functions stay available.")
            .method("average", "math.average(numbers) -> number", "Mean of a list of numbers.")
            .example("print(math.average({1, 2, 3, 4, 5}))")
            .method("sum", "math.sum(numbers) -> number", "Sum of a list of numbers (0 for an empty list).")
            .method("median", "math.median(numbers) -> number", "Median of a list of numbers.")
            .method("standard_deviation", "math.standard_deviation(numbers) -> number", "Population standard deviation.")
            .rank(1)
            .method("statistics", "math.statistics(numbers) -> table", "count, sum, mean, min, max, median and std_dev in one table.")
            .example("local s = math.statistics({3, 1, 2})\nprint(s.mean, s.median)")
            .method("max", "math.max(numbers) -> number", "Largest value of a list, or of the arguments.")
            .rank(1)
            .method("min", "math.min(numbers) -> number", "Smallest value of a list, or of the arguments.")
            .rank(1)
            .method("power", "math.power(base, exponent) -> number", "base raised to exponent.")
            .rank(2)
            .method("round", "math.round(number, digits?) -> number", "Round half away from zero to `digits` decimals.")
            .rank(2)
            .method("factorial", "math.factorial(n) -> integer", "n! for 0 <= n <= 20.")
            .rank(2)
            .method("gcd", "math.gcd(a, b) -> integer", "Greatest common divisor.")
            .rank(3)
            .method("lcm", "math.lcm(a, b) -> integer", "Least common multiple.")
            .rank(3)
            .method("is_prime", "math.is_prime(n) -> boolean", "True when n is prime.")
            .rank(3)
            .method("fibonacci", "math.fibonacci(count) -> table", "The first `count` Fibonacci numbers, starting at 0.")
            .rank(3),
        Namespace::new("fs", "File and directory helpers. Failures are logged and return nil, false or an empty list.")
            .method("read_text", "fs.read_text(path) -> string", "Whole file as text, or nil on failure.")
            .example("local text = fs.read_text(\"notes.txt\")")
            .method("write_text", "fs.write_text(path, content) -> boolean", "Write text to a file, creating parent directories.")
            .method("file_exists", "fs.file_exists(path) -> boolean", "True when path is an existing file.")
            .method("dir_exists", "fs.dir_exists(path) -> boolean", "True when path is an existing directory.")
            .method("create_dir", "fs.create_dir(path) -> boolean", "Create a directory and its parents.")
            .rank(1)
            .method("list_files", "fs.list_files(dir, pattern?) -> table", "Sorted file paths in dir whose names match the glob pattern (default \"*\").")
            .example("for _, f in ipairs(fs.list_files(\"reports\", \"*.csv\")) do print(f) end")
            .method("list_dirs", "fs.list_dirs(dir) -> table", "Sorted subdirectory paths in dir.")
            .method("delete_file", "fs.delete_file(path) -> boolean", "Delete a file. A missing file counts as deleted.")
            .rank(1)
            .method("copy_file", "fs.copy_file(source, dest, overwrite?) -> boolean", "Copy a file, creating the destination directory. Refuses to overwrite unless asked.")
            .rank(1)
            .method("get_file_info", "fs.get_file_info(path) -> table", "name, full_path, size, modified, extension and is_readonly, or nil."),
    ]
}
