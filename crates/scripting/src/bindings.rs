//! Host object bindings.
//!
//! Each registry namespace becomes one global userdata object. Member access
//! goes through `__index` / `__newindex`, which first resolve the member in the
//! [`ApiRegistry`]: a name that is not registered cannot be reached, even if a
//! binding happens to know it.
//!
//! Methods accept both call styles, `host.log("x")` and `host:log("x")`.
//!
//! Only enabled namespaces are installed. A namespace whose name already holds
//! a table (Lua's own `math`) shadows it: registered members win, anything
//! else is read from the original table, so `math.floor` keeps working.
//!
//! # Tables
//!
//! `data.load_csv` / `data.process_table` return table objects:
//! - `t.row_count`, `t.column_count`, `#t`
//! - `t:columns()` → array of column names
//! - `t:column_type(name)` → `"integer"`, `"text"`, ... or nil
//! - `t:get(row, column)` → value (row 1-indexed, column by name or 1-indexed)
//! - `t:rows()` → array of `{column = value}` tables

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use mlua::{
    Lua, MetaMethod, MultiValue, Result as LuaResult, Table, UserData, UserDataFields, UserDataMethods, Value,
};

use macrohost_core::policy::log_and_suppress;
use macrohost_core::{ApiMember, ApiRegistry, ApiUsageError, DocumentProxy, HostLog, MemberKind, UiNotifier};
use macrohost_io::csv as delimited;
use macrohost_io::table::process;
use macrohost_io::{CellValue, DataTable};

use crate::runtime::lua_value_to_string;
use crate::services::{FsBinding, MathBinding};

/// Everything the bindings need from the host, shared by all namespaces.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub registry: Arc<ApiRegistry>,
    pub documents: DocumentProxy,
    pub log: HostLog,
    pub ui: UiNotifier,
}

/// Behavior behind one registry namespace.
pub trait NamespaceBinding {
    fn namespace(&self) -> &'static str;

    fn get(&self, lua: &Lua, member: &ApiMember) -> LuaResult<Value>;

    fn set(&self, _lua: &Lua, member: &ApiMember, _value: Value) -> LuaResult<()> {
        Err(read_only(member))
    }

    fn call(&self, lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue>;
}

/// Install one global per registered namespace that has a binding.
pub fn install(lua: &Lua, ctx: &HostContext) -> LuaResult<()> {
    let globals = lua.globals();
    for ns in ctx.registry.enabled_namespaces() {
        let Some(binding) = binding_for(&ns.name, ctx) else {
            log::warn!("namespace '{}' is registered but has no binding", ns.name);
            continue;
        };
        let shadowed = match globals.get::<Value>(ns.name.as_str())? {
            Value::Table(table) => Some(table),
            _ => None,
        };
        let object = HostObject { binding, registry: ctx.registry.clone(), shadowed };
        globals.set(ns.name.as_str(), lua.create_userdata(object)?)?;
    }
    Ok(())
}

fn binding_for(namespace: &str, ctx: &HostContext) -> Option<Rc<dyn NamespaceBinding>> {
    let binding: Rc<dyn NamespaceBinding> = match namespace {
        "host" => Rc::new(HostBinding { ctx: ctx.clone() }),
        "ui" => Rc::new(UiBinding { ui: ctx.ui.clone() }),
        "data" => Rc::new(DataBinding { log: ctx.log.clone() }),
        "doc" => Rc::new(DocBinding { documents: ctx.documents.clone() }),
        "math" => Rc::new(MathBinding { log: ctx.log.clone() }),
        "fs" => Rc::new(FsBinding { log: ctx.log.clone() }),
        _ => return None,
    };
    Some(binding)
}

// ============================================================================
// Host object (namespace userdata)
// ============================================================================

pub struct HostObject {
    binding: Rc<dyn NamespaceBinding>,
    registry: Arc<ApiRegistry>,
    shadowed: Option<Table>,
}

impl HostObject {
    /// Non-nil value of `key` in the shadowed table, for unregistered keys.
    fn shadowed_value(&self, key: &str) -> LuaResult<Option<Value>> {
        let Some(table) = &self.shadowed else {
            return Ok(None);
        };
        if self.registry.resolve(self.binding.namespace(), key).is_some() {
            return Ok(None);
        }
        let value: Value = table.raw_get(key)?;
        Ok((!value.is_nil()).then_some(value))
    }

    fn member(&self, key: &str) -> LuaResult<&ApiMember> {
        let ns = self.binding.namespace();
        self.registry
            .resolve(ns, key)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("'{}' has no member '{}'", ns, key)))
    }
}

impl UserData for HostObject {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            if let Some(value) = this.shadowed_value(&key)? {
                return Ok(value);
            }
            let member = this.member(&key)?.clone();
            match member.kind {
                MemberKind::Property => this.binding.get(lua, &member),
                MemberKind::Method => {
                    let binding = this.binding.clone();
                    let func = lua.create_function(move |lua, args: MultiValue| {
                        binding.call(lua, &member, strip_self(args))
                    })?;
                    Ok(Value::Function(func))
                }
            }
        });

        methods.add_meta_method(MetaMethod::NewIndex, |lua, this, (key, value): (String, Value)| {
            let member = this.member(&key)?;
            if member.kind == MemberKind::Property && member.writable {
                this.binding.set(lua, member, value)
            } else {
                Err(read_only(member))
            }
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("<{}>", this.binding.namespace()))
        });
    }
}

/// Drop a leading host object so `ns:method(...)` behaves like `ns.method(...)`.
fn strip_self(mut args: MultiValue) -> MultiValue {
    let is_self = matches!(args.front(), Some(Value::UserData(ud)) if ud.is::<HostObject>());
    if is_self {
        args.pop_front();
    }
    args
}

pub(crate) fn read_only(member: &ApiMember) -> mlua::Error {
    mlua::Error::RuntimeError(format!("'{}' is read-only", member.qualified_name()))
}

pub(crate) fn unbound(member: &ApiMember) -> mlua::Error {
    mlua::Error::RuntimeError(format!("'{}' is not available in this host", member.qualified_name()))
}

pub(crate) fn string_arg(args: &MultiValue, index: usize, name: &str) -> Result<String, String> {
    match args.get(index) {
        Some(Value::String(s)) => s.to_str().map(|s| s.to_string()).map_err(|e| e.to_string()),
        Some(Value::Nil) | None => Err(format!("missing argument '{}'", name)),
        Some(other) => Err(format!("argument '{}' must be a string, got {}", name, other.type_name())),
    }
}

fn table_arg(args: &MultiValue, index: usize) -> Result<Arc<DataTable>, String> {
    match args.get(index) {
        Some(Value::UserData(ud)) if ud.is::<TableObject>() => {
            let table = ud.borrow::<TableObject>().map_err(|e| e.to_string())?;
            Ok(table.0.clone())
        }
        Some(other) => Err(format!("expected a table object, got {}", other.type_name())),
        None => Err("missing table argument".to_string()),
    }
}

fn joined_text(args: &MultiValue) -> String {
    args.iter().map(lua_value_to_string).collect::<Vec<_>>().join("\t")
}

/// Leaf-call failure: log it as an [`ApiUsageError`] and return `fallback()`.
pub(crate) fn suppress_usage<T>(
    log: &HostLog,
    call: &str,
    result: Result<T, String>,
    fallback: impl FnOnce() -> T,
) -> T {
    let result = result.map_err(|e| ApiUsageError::new(call, e));
    log_and_suppress(log, "api usage error", result, fallback)
}

// ============================================================================
// host
// ============================================================================

struct HostBinding {
    ctx: HostContext,
}

impl NamespaceBinding for HostBinding {
    fn namespace(&self) -> &'static str {
        "host"
    }

    fn get(&self, lua: &Lua, member: &ApiMember) -> LuaResult<Value> {
        match member.name.as_str() {
            "active_doc" => {
                if !self.ctx.documents.has_document() {
                    return Ok(Value::Nil);
                }
                let object = HostObject {
                    binding: Rc::new(DocBinding { documents: self.ctx.documents.clone() }),
                    registry: self.ctx.registry.clone(),
                    shadowed: None,
                };
                Ok(Value::UserData(lua.create_userdata(object)?))
            }
            _ => Err(unbound(member)),
        }
    }

    fn call(&self, _lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue> {
        match member.name.as_str() {
            "log" => {
                self.ctx.log.info(joined_text(&args));
                Ok(MultiValue::new())
            }
            _ => Err(unbound(member)),
        }
    }
}

// ============================================================================
// ui
// ============================================================================

struct UiBinding {
    ui: UiNotifier,
}

impl NamespaceBinding for UiBinding {
    fn namespace(&self) -> &'static str {
        "ui"
    }

    fn get(&self, _lua: &Lua, member: &ApiMember) -> LuaResult<Value> {
        Err(unbound(member))
    }

    fn call(&self, lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue> {
        match member.name.as_str() {
            "show_message" => {
                let (text, title): (Value, Option<String>) = lua.unpack_multi(args)?;
                self.ui.show_message(lua_value_to_string(&text), title);
                Ok(MultiValue::new())
            }
            "status_bar" => {
                self.ui.status(joined_text(&args));
                Ok(MultiValue::new())
            }
            _ => Err(unbound(member)),
        }
    }
}

// ============================================================================
// data
// ============================================================================

struct DataBinding {
    log: HostLog,
}

impl DataBinding {
    fn usage<T>(&self, call: &str, result: Result<T, String>, fallback: impl FnOnce() -> T) -> T {
        suppress_usage(&self.log, call, result, fallback)
    }
}

impl NamespaceBinding for DataBinding {
    fn namespace(&self) -> &'static str {
        "data"
    }

    fn get(&self, _lua: &Lua, member: &ApiMember) -> LuaResult<Value> {
        Err(unbound(member))
    }

    fn call(&self, lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue> {
        match member.name.as_str() {
            "load_csv" => {
                let loaded = string_arg(&args, 0, "path").and_then(|path| {
                    let table = delimited::load_csv_file(Path::new(&path))?;
                    self.log.info(format!(
                        "data.load_csv: loaded {} ({} rows, {} columns)",
                        path,
                        table.row_count(),
                        table.column_count()
                    ));
                    Ok(table)
                });
                let table = self.usage("data.load_csv", loaded, DataTable::empty);
                lua.pack_multi(TableObject(Arc::new(table)))
            }
            "process_table" => {
                let processed = table_arg(&args, 0).map(|t| process(&t));
                let table = self.usage("data.process_table", processed, DataTable::empty);
                lua.pack_multi(TableObject(Arc::new(table)))
            }
            "save_csv" => {
                let written = table_arg(&args, 0).and_then(|table| {
                    let path = string_arg(&args, 1, "path")?;
                    delimited::write_csv(&table, Path::new(&path))
                });
                let ok = self.usage("data.save_csv", written.map(|_| true), || false);
                lua.pack_multi(ok)
            }
            _ => Err(unbound(member)),
        }
    }
}

// ============================================================================
// doc
// ============================================================================

struct DocBinding {
    documents: DocumentProxy,
}

fn doc_err(e: macrohost_core::DocumentError) -> mlua::Error {
    mlua::Error::external(e)
}

impl NamespaceBinding for DocBinding {
    fn namespace(&self) -> &'static str {
        "doc"
    }

    fn get(&self, lua: &Lua, member: &ApiMember) -> LuaResult<Value> {
        match member.name.as_str() {
            "file_path" => match self.documents.file_path().map_err(doc_err)? {
                Some(path) => Ok(Value::String(lua.create_string(path.to_string_lossy().as_bytes())?)),
                None => Ok(Value::Nil),
            },
            "page_count" => Ok(Value::Integer(self.documents.page_count().map_err(doc_err)? as i64)),
            "is_dirty" => Ok(Value::Boolean(self.documents.is_dirty().map_err(doc_err)?)),
            "content" => Ok(Value::String(lua.create_string(self.documents.read_content().map_err(doc_err)?)?)),
            _ => Err(unbound(member)),
        }
    }

    fn set(&self, _lua: &Lua, member: &ApiMember, value: Value) -> LuaResult<()> {
        match member.name.as_str() {
            "content" => {
                let text = match &value {
                    Value::String(s) => s.to_str()?.to_string(),
                    Value::Integer(_) | Value::Number(_) => lua_value_to_string(&value),
                    other => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "doc.content must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                self.documents.write_content(text).map_err(doc_err)
            }
            _ => Err(read_only(member)),
        }
    }

    fn call(&self, _lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue> {
        match member.name.as_str() {
            "save" => {
                let saved = match args.front() {
                    None | Some(Value::Nil) => self.documents.save(),
                    Some(Value::String(path)) => self.documents.save_as(path.to_str()?.to_string()),
                    Some(other) => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "doc.save path must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                saved.map_err(doc_err)?;
                Ok(MultiValue::new())
            }
            _ => Err(unbound(member)),
        }
    }
}

// ============================================================================
// Table objects
// ============================================================================

/// Immutable table handed to scripts. Processing produces a new object.
#[derive(Debug, Clone)]
pub struct TableObject(pub Arc<DataTable>);

fn cell_to_lua(lua: &Lua, value: &CellValue) -> LuaResult<Value> {
    Ok(match value {
        CellValue::Null => Value::Nil,
        CellValue::Integer(i) => Value::Integer(*i),
        CellValue::Float(n) => Value::Number(*n),
        CellValue::Boolean(b) => Value::Boolean(*b),
        CellValue::Text(s) => Value::String(lua.create_string(s)?),
    })
}

impl TableObject {
    fn column_index(&self, column: &Value) -> Option<usize> {
        match column {
            Value::String(s) => s.to_str().ok().and_then(|name| self.0.column_index(&name)),
            Value::Integer(i) if *i >= 1 => Some(*i as usize - 1).filter(|&c| c < self.0.column_count()),
            _ => None,
        }
    }
}

impl UserData for TableObject {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("row_count", |_, this| Ok(this.0.row_count()));
        fields.add_field_method_get("column_count", |_, this| Ok(this.0.column_count()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("columns", |_, this, ()| {
            Ok(this.0.column_names().into_iter().map(String::from).collect::<Vec<_>>())
        });

        methods.add_method("column_type", |_, this, name: String| {
            Ok(this.0.column_index(&name).map(|i| this.0.columns()[i].ty.as_str()))
        });

        methods.add_method("get", |lua, this, (row, column): (i64, Value)| {
            if row < 1 {
                return Ok(Value::Nil);
            }
            let Some(col) = this.column_index(&column) else {
                return Ok(Value::Nil);
            };
            match this.0.rows().get(row as usize - 1).and_then(|r| r.get(col)) {
                Some(value) => cell_to_lua(lua, value),
                None => Ok(Value::Nil),
            }
        });

        methods.add_method("rows", |lua, this, ()| {
            let out = lua.create_table()?;
            for (i, row) in this.0.rows().iter().enumerate() {
                let record = lua.create_table()?;
                for (column, value) in this.0.columns().iter().zip(row.values()) {
                    record.set(column.name.as_str(), cell_to_lua(lua, value)?)?;
                }
                out.set(i + 1, record)?;
            }
            Ok(out)
        });

        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.0.row_count()));

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("table({} rows x {} columns)", this.0.row_count(), this.0.column_count()))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{LuaRuntime, RuntimeLimits};
    use macrohost_core::{ui_channel, Document, DocumentCell, LogLevel, RegistryConfig, UiEvent};
    use std::fs;
    use std::sync::mpsc::Receiver;
    use tempfile::tempdir;

    struct Fixture {
        rt: LuaRuntime,
        ctx: HostContext,
        ui_rx: Receiver<UiEvent>,
    }

    fn fixture() -> Fixture {
        let (ui, ui_rx) = ui_channel();
        let ctx = HostContext {
            registry: Arc::new(ApiRegistry::standard(RegistryConfig::default()).unwrap()),
            documents: DocumentProxy::new(),
            log: HostLog::new(),
            ui,
        };
        let rt = LuaRuntime::new(RuntimeLimits::default()).unwrap();
        install(rt.lua(), &ctx).unwrap();
        Fixture { rt, ctx, ui_rx }
    }

    #[test]
    fn test_host_log_both_call_styles() {
        let f = fixture();
        let result = f.rt.exec("host.log('dot')\nhost:log('colon')", "log", None);
        assert!(result.is_ok(), "{:?}", result.error);
        let messages: Vec<String> = f.ctx.log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["dot", "colon"]);
    }

    #[test]
    fn test_unknown_member_is_an_error() {
        let f = fixture();
        let result = f.rt.exec("host.shutdown()", "bad", None);
        assert!(result.error.unwrap().contains("'host' has no member 'shutdown'"));
    }

    #[test]
    fn test_read_only_property() {
        let f = fixture();
        let result = f.rt.exec("host.active_doc = 1", "ro", None);
        assert!(result.error.unwrap().contains("'host.active_doc' is read-only"));
    }

    #[test]
    fn test_active_doc_nil_without_document() {
        let f = fixture();
        let result = f.rt.exec("return host.active_doc == nil", "nodoc", None);
        assert_eq!(result.returned, Some("true".to_string()));
    }

    #[test]
    fn test_doc_without_document_raises() {
        let f = fixture();
        let result = f.rt.exec("return doc.content", "nodoc", None);
        assert!(result.error.unwrap().contains("no active document"));
    }

    #[test]
    fn test_doc_properties_and_write() {
        let f = fixture();
        let cell = DocumentCell::new(Document::with_content("x".repeat(501), None));
        f.ctx.documents.activate(&cell);

        let script = r#"
            print(doc.page_count, doc.is_dirty, doc.file_path)
            doc.content = "short"
            local d = host.active_doc
            print(d.page_count, d.is_dirty, #d.content)
        "#;
        let result = f.rt.exec(script, "doc", None);
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.output, vec!["2\tfalse\tnil", "1\ttrue\t5"]);
        assert_eq!(cell.snapshot().content(), "short");
    }

    #[test]
    fn test_doc_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let f = fixture();
        let cell = DocumentCell::new(Document::with_content("", Some(path.clone())));
        f.ctx.documents.activate(&cell);

        let result = f.rt.exec("doc.content = 'saved text'\ndoc:save()\nreturn doc.is_dirty", "save", None);
        assert_eq!(result.returned, Some("false".to_string()));
        assert_eq!(fs::read_to_string(path).unwrap(), "saved text");
    }

    #[test]
    fn test_doc_save_without_path_raises() {
        let f = fixture();
        let cell = DocumentCell::new(Document::new());
        f.ctx.documents.activate(&cell);
        let result = f.rt.exec("doc.save()", "save", None);
        assert!(result.error.unwrap().contains("no file path"));
    }

    #[test]
    fn test_doc_save_to_given_path() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("original.txt");
        let target = dir.path().join("target.txt");
        fs::write(&original, "on disk").unwrap();
        let f = fixture();
        let cell = DocumentCell::new(Document::with_content("on disk", Some(original.clone())));
        f.ctx.documents.activate(&cell);

        let script = format!(
            "doc.content = 'moved'\ndoc.save({:?})\nreturn doc.file_path, doc.is_dirty",
            target.display().to_string()
        );
        let result = f.rt.exec(&script, "save_as", None);
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.returned, Some(format!("{}, false", target.display())));
        assert_eq!(fs::read_to_string(&target).unwrap(), "moved");
        assert_eq!(fs::read_to_string(&original).unwrap(), "on disk");
    }

    #[test]
    fn test_doc_save_untitled_to_given_path() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("fresh.txt");
        let f = fixture();
        let cell = DocumentCell::new(Document::new());
        f.ctx.documents.activate(&cell);

        let script = format!("doc.content = 'new'\ndoc:save({:?})", target.display().to_string());
        let result = f.rt.exec(&script, "save_as", None);
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(cell.snapshot().file_path(), Some(target.as_path()));
    }

    #[test]
    fn test_doc_save_rejects_non_string_path() {
        let f = fixture();
        let cell = DocumentCell::new(Document::new());
        f.ctx.documents.activate(&cell);
        let result = f.rt.exec("doc.save(42)", "save", None);
        assert!(result.error.unwrap().contains("doc.save path must be a string, got integer"));
    }

    #[test]
    fn test_ui_events() {
        let f = fixture();
        let result = f.rt.exec("ui.show_message('hi')\nui.show_message('bad', 'Error')\nui.status_bar('ready')", "ui", None);
        assert!(result.is_ok(), "{:?}", result.error);
        let events: Vec<UiEvent> = f.ui_rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                UiEvent::Message { text: "hi".into(), title: "Message".into() },
                UiEvent::Message { text: "bad".into(), title: "Error".into() },
                UiEvent::Status("ready".into()),
            ]
        );
    }

    #[test]
    fn test_load_csv_missing_file_fails_open() {
        let f = fixture();
        let script = r#"
            local t = data.load_csv("/definitely/not/here.csv")
            print(t.row_count, t.column_count)
            print("still running")
        "#;
        let result = f.rt.exec(script, "missing", None);
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.output, vec!["0\t0", "still running"]);
        assert!(f.ctx.log.contains(LogLevel::Error, "data.load_csv"));
    }

    #[test]
    fn test_load_csv_bad_argument_fails_open() {
        let f = fixture();
        let result = f.rt.exec("return data.load_csv(42).row_count", "arg", None);
        assert_eq!(result.returned, Some("0".to_string()));
        assert!(f.ctx.log.contains(LogLevel::Error, "must be a string"));
    }

    #[test]
    fn test_load_and_process_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.csv");
        fs::write(&path, "Name,Age\n Ann ,31\n,\nBob,42\n").unwrap();
        let f = fixture();

        let script = format!(
            r#"
            local raw = data.load_csv("{}")
            local t = data:process_table(raw)
            print(raw.row_count, t.row_count, #t)
            print(table.concat(t:columns(), ","))
            print(t:get(1, "Name"), t:get(2, 2), t:column_type("Age"))
            for _, row in ipairs(t:rows()) do print(row.Name, row.Age + 1) end
            return tostring(t)
            "#,
            path.display().to_string().replace('\\', "\\\\")
        );
        let result = f.rt.exec(&script, "tables", None);
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(
            result.output,
            vec!["3\t2\t2", "Name,Age", "Ann\t42\tinteger", "Ann\t32", "Bob\t43"]
        );
        assert_eq!(result.returned, Some("table(2 rows x 2 columns)".to_string()));
        assert!(f.ctx.log.contains(LogLevel::Info, "people.csv (3 rows, 2 columns)"));
    }

    #[test]
    fn test_process_table_wrong_argument_fails_open() {
        let f = fixture();
        let result = f.rt.exec("return data.process_table('nope').row_count", "arg", None);
        assert_eq!(result.returned, Some("0".to_string()));
        assert!(f.ctx.log.contains(LogLevel::Error, "expected a table object"));
    }

    #[test]
    fn test_save_csv() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "a,b\n1,2\n").unwrap();
        let f = fixture();

        let script = format!(
            "local t = data.load_csv({:?})\nreturn data.save_csv(t, {:?})",
            input.display().to_string(),
            output.display().to_string()
        );
        let result = f.rt.exec(&script, "save", None);
        assert_eq!(result.returned, Some("true".to_string()));
        assert_eq!(fs::read_to_string(output).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_pcall_around_doc_error() {
        let f = fixture();
        let result = f.rt.exec("local ok = pcall(function() return doc.content end)\nprint(ok)", "pcall", None);
        assert!(result.is_ok());
        assert_eq!(result.output, vec!["false"]);
    }
}
