//! `math` and `fs` namespaces.
//!
//! Both are leaf services: bad arguments and I/O failures are logged to the
//! host log and the call returns nil, false or an empty list, so a script
//! keeps running.
//!
//! List arguments accept a Lua array or plain arguments:
//! `math.sum({1, 2, 3})` and `math.sum(1, 2, 3)` agree.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use mlua::{Lua, MultiValue, Result as LuaResult, Value};

use macrohost_core::{ApiMember, HostLog};

use crate::bindings::{string_arg, suppress_usage, unbound, NamespaceBinding};

/// Largest `n` whose factorial fits in an i64.
const MAX_FACTORIAL: i64 = 20;

/// F(0)..=F(92) fit in an i64.
const MAX_FIBONACCI: i64 = 93;

const MAX_ROUND_DIGITS: i64 = 15;

const NAME_MATCH: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

// ============================================================================
// Argument helpers
// ============================================================================

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

fn numbers_arg(args: &MultiValue) -> Result<Vec<f64>, String> {
    let values: Vec<Value> = match args.front() {
        Some(Value::Table(table)) if args.len() == 1 => table
            .sequence_values::<Value>()
            .collect::<LuaResult<Vec<_>>>()
            .map_err(|e| e.to_string())?,
        _ => args.iter().cloned().collect(),
    };
    values
        .iter()
        .enumerate()
        .map(|(i, v)| number_of(v).ok_or_else(|| format!("element {} is not a number ({})", i + 1, v.type_name())))
        .collect()
}

fn non_empty(numbers: Vec<f64>) -> Result<Vec<f64>, String> {
    if numbers.is_empty() {
        Err("numbers must not be empty".to_string())
    } else {
        Ok(numbers)
    }
}

fn number_arg(args: &MultiValue, index: usize, name: &str) -> Result<f64, String> {
    match args.get(index) {
        Some(Value::Nil) | None => Err(format!("missing argument '{}'", name)),
        Some(v) => number_of(v).ok_or_else(|| format!("argument '{}' must be a number, got {}", name, v.type_name())),
    }
}

fn integer_arg(args: &MultiValue, index: usize, name: &str) -> Result<i64, String> {
    match args.get(index) {
        Some(Value::Integer(i)) => Ok(*i),
        Some(Value::Number(n)) if n.fract() == 0.0 && n.abs() < 9.0e15 => Ok(*n as i64),
        Some(Value::Nil) | None => Err(format!("missing argument '{}'", name)),
        Some(other) => Err(format!("argument '{}' must be an integer, got {}", name, other.type_name())),
    }
}

fn optional_integer_arg(args: &MultiValue, index: usize, name: &str, default: i64) -> Result<i64, String> {
    match args.get(index) {
        Some(Value::Nil) | None => Ok(default),
        Some(_) => integer_arg(args, index, name),
    }
}

// ============================================================================
// Statistics and number helpers
// ============================================================================

pub fn mean(numbers: &[f64]) -> f64 {
    numbers.iter().sum::<f64>() / numbers.len() as f64
}

/// Middle value; the mean of the two middle values for an even count.
pub fn median(numbers: &[f64]) -> f64 {
    let mut sorted = numbers.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
pub fn standard_deviation(numbers: &[f64]) -> f64 {
    let avg = mean(numbers);
    let squares: f64 = numbers.iter().map(|x| (x - avg).powi(2)).sum();
    (squares / numbers.len() as f64).sqrt()
}

pub fn factorial(n: i64) -> Result<i64, String> {
    if !(0..=MAX_FACTORIAL).contains(&n) {
        return Err(format!("factorial is defined here for 0..={} (got {})", MAX_FACTORIAL, n));
    }
    Ok((1..=n).product())
}

pub fn gcd(a: i64, b: i64) -> Result<i64, String> {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    i64::try_from(a).map_err(|_| "gcd overflows an integer".to_string())
}

pub fn lcm(a: i64, b: i64) -> Result<i64, String> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    (a / gcd(a, b)?)
        .checked_mul(b)
        .and_then(i64::checked_abs)
        .ok_or_else(|| "lcm overflows an integer".to_string())
}

pub fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3i64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

pub fn fibonacci(count: i64) -> Result<Vec<i64>, String> {
    if !(1..=MAX_FIBONACCI).contains(&count) {
        return Err(format!("count must be between 1 and {} (got {})", MAX_FIBONACCI, count));
    }
    let mut seq: Vec<i64> = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let next = if i < 2 { i as i64 } else { seq[i - 1] + seq[i - 2] };
        seq.push(next);
    }
    Ok(seq)
}

/// Half away from zero.
pub fn round_to(number: f64, digits: i64) -> Result<f64, String> {
    if !(0..=MAX_ROUND_DIGITS).contains(&digits) {
        return Err(format!("digits must be between 0 and {} (got {})", MAX_ROUND_DIGITS, digits));
    }
    let factor = 10f64.powi(digits as i32);
    Ok((number * factor).round() / factor)
}

// ============================================================================
// math
// ============================================================================

pub struct MathBinding {
    pub log: HostLog,
}

impl MathBinding {
    fn statistics(&self, lua: &Lua, numbers: &[f64]) -> LuaResult<Value> {
        let table = lua.create_table()?;
        table.set("count", numbers.len())?;
        table.set("sum", numbers.iter().sum::<f64>())?;
        table.set("mean", mean(numbers))?;
        table.set("min", numbers.iter().copied().fold(f64::INFINITY, f64::min))?;
        table.set("max", numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max))?;
        table.set("median", median(numbers))?;
        table.set("std_dev", standard_deviation(numbers))?;
        Ok(Value::Table(table))
    }
}

impl NamespaceBinding for MathBinding {
    fn namespace(&self) -> &'static str {
        "math"
    }

    fn get(&self, _lua: &Lua, member: &ApiMember) -> LuaResult<Value> {
        Err(unbound(member))
    }

    fn call(&self, lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue> {
        let listed = || numbers_arg(&args).and_then(non_empty);
        let value: Result<Value, String> = match member.name.as_str() {
            "average" => listed().map(|xs| Value::Number(mean(&xs))),
            "sum" => numbers_arg(&args).map(|xs| Value::Number(xs.iter().sum())),
            "median" => listed().map(|xs| Value::Number(median(&xs))),
            "standard_deviation" => listed().map(|xs| Value::Number(standard_deviation(&xs))),
            "max" => listed().map(|xs| Value::Number(xs.into_iter().fold(f64::NEG_INFINITY, f64::max))),
            "min" => listed().map(|xs| Value::Number(xs.into_iter().fold(f64::INFINITY, f64::min))),
            "statistics" => match listed() {
                Ok(xs) => Ok(self.statistics(lua, &xs)?),
                Err(e) => Err(e),
            },
            "power" => number_arg(&args, 0, "base")
                .and_then(|base| Ok(Value::Number(base.powf(number_arg(&args, 1, "exponent")?)))),
            "round" => number_arg(&args, 0, "number").and_then(|number| {
                let digits = optional_integer_arg(&args, 1, "digits", 0)?;
                round_to(number, digits).map(Value::Number)
            }),
            "factorial" => integer_arg(&args, 0, "n").and_then(factorial).map(Value::Integer),
            "gcd" => integer_arg(&args, 0, "a")
                .and_then(|a| gcd(a, integer_arg(&args, 1, "b")?))
                .map(Value::Integer),
            "lcm" => integer_arg(&args, 0, "a")
                .and_then(|a| lcm(a, integer_arg(&args, 1, "b")?))
                .map(Value::Integer),
            "is_prime" => integer_arg(&args, 0, "n").map(|n| Value::Boolean(is_prime(n))),
            "fibonacci" => match integer_arg(&args, 0, "count").and_then(fibonacci) {
                Ok(seq) => Ok(Value::Table(lua.create_sequence_from(seq)?)),
                Err(e) => Err(e),
            },
            _ => return Err(unbound(member)),
        };
        let value = suppress_usage(&self.log, &member.qualified_name(), value, || Value::Nil);
        lua.pack_multi(value)
    }
}

// ============================================================================
// fs
// ============================================================================

/// Metadata returned by `fs.get_file_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub full_path: String,
    pub size: u64,
    pub modified: String,
    /// With the leading dot (`".csv"`), empty when there is none.
    pub extension: String,
    pub is_readonly: bool,
}

pub fn write_text(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
    }
    fs::write(path, content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Sorted entries of `dir`: files whose names match `pattern`, or subdirectories.
pub fn list_entries(dir: &Path, pattern: &str, want_dirs: bool) -> Result<Vec<String>, String> {
    let pattern = glob::Pattern::new(pattern).map_err(|e| format!("invalid pattern {:?}: {}", pattern, e))?;
    let entries = fs::read_dir(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if path.is_dir() != want_dirs {
            continue;
        }
        if pattern.matches_with(&entry.file_name().to_string_lossy(), NAME_MATCH) {
            out.push(path.display().to_string());
        }
    }
    out.sort();
    Ok(out)
}

pub fn copy_file(source: &Path, dest: &Path, overwrite: bool) -> Result<(), String> {
    if !source.is_file() {
        return Err(format!("source file not found: {}", source.display()));
    }
    if dest.exists() && !overwrite {
        return Err(format!("destination exists: {} (pass overwrite = true)", dest.display()));
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
    }
    fs::copy(source, dest).map(|_| ()).map_err(|e| format!("{}: {}", dest.display(), e))
}

pub fn file_info(path: &Path) -> Result<FileInfo, String> {
    let meta = fs::metadata(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if !meta.is_file() {
        return Err(format!("not a file: {}", path.display()));
    }
    let modified = meta
        .modified()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let full_path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(FileInfo {
        name: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        full_path: full_path.display().to_string(),
        size: meta.len(),
        modified,
        extension: path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default(),
        is_readonly: meta.permissions().readonly(),
    })
}

pub struct FsBinding {
    pub log: HostLog,
}

impl FsBinding {
    fn usage<T>(&self, call: &str, result: Result<T, String>, fallback: impl FnOnce() -> T) -> T {
        suppress_usage(&self.log, call, result, fallback)
    }

    fn path_arg(args: &MultiValue, index: usize, name: &str) -> Result<String, String> {
        string_arg(args, index, name)
    }
}

impl NamespaceBinding for FsBinding {
    fn namespace(&self) -> &'static str {
        "fs"
    }

    fn get(&self, _lua: &Lua, member: &ApiMember) -> LuaResult<Value> {
        Err(unbound(member))
    }

    fn call(&self, lua: &Lua, member: &ApiMember, args: MultiValue) -> LuaResult<MultiValue> {
        let call = member.qualified_name();
        match member.name.as_str() {
            "read_text" => {
                let text = Self::path_arg(&args, 0, "path")
                    .and_then(|p| fs::read_to_string(&p).map_err(|e| format!("{}: {}", p, e)));
                lua.pack_multi(self.usage(&call, text.map(Some), || None))
            }
            "write_text" => {
                let written = Self::path_arg(&args, 0, "path").and_then(|p| {
                    let content = string_arg(&args, 1, "content")?;
                    write_text(Path::new(&p), &content)?;
                    self.log.info(format!("fs.write_text: wrote {}", p));
                    Ok(true)
                });
                lua.pack_multi(self.usage(&call, written, || false))
            }
            "file_exists" => {
                let exists = Self::path_arg(&args, 0, "path").map(|p| Path::new(&p).is_file());
                lua.pack_multi(self.usage(&call, exists, || false))
            }
            "dir_exists" => {
                let exists = Self::path_arg(&args, 0, "path").map(|p| Path::new(&p).is_dir());
                lua.pack_multi(self.usage(&call, exists, || false))
            }
            "create_dir" => {
                let created = Self::path_arg(&args, 0, "path").and_then(|p| {
                    if !Path::new(&p).is_dir() {
                        fs::create_dir_all(&p).map_err(|e| format!("{}: {}", p, e))?;
                        self.log.info(format!("fs.create_dir: created {}", p));
                    }
                    Ok(true)
                });
                lua.pack_multi(self.usage(&call, created, || false))
            }
            "list_files" | "list_dirs" => {
                let want_dirs = member.name == "list_dirs";
                let listed = Self::path_arg(&args, 0, "dir").and_then(|dir| {
                    let pattern = match args.get(1) {
                        Some(Value::Nil) | None => "*".to_string(),
                        Some(_) if want_dirs => "*".to_string(),
                        Some(_) => string_arg(&args, 1, "pattern")?,
                    };
                    list_entries(Path::new(&dir), &pattern, want_dirs)
                });
                let paths = self.usage(&call, listed, Vec::new);
                lua.pack_multi(lua.create_sequence_from(paths)?)
            }
            "delete_file" => {
                let deleted = Self::path_arg(&args, 0, "path").and_then(|p| {
                    let path = Path::new(&p);
                    if path.is_dir() {
                        return Err(format!("{} is a directory", p));
                    }
                    if path.exists() {
                        fs::remove_file(path).map_err(|e| format!("{}: {}", p, e))?;
                        self.log.info(format!("fs.delete_file: deleted {}", p));
                    }
                    Ok(true)
                });
                lua.pack_multi(self.usage(&call, deleted, || false))
            }
            "copy_file" => {
                let copied = Self::path_arg(&args, 0, "source").and_then(|source| {
                    let dest = Self::path_arg(&args, 1, "dest")?;
                    let overwrite = matches!(args.get(2), Some(Value::Boolean(true)));
                    copy_file(Path::new(&source), Path::new(&dest), overwrite)?;
                    self.log.info(format!("fs.copy_file: {} -> {}", source, dest));
                    Ok(true)
                });
                lua.pack_multi(self.usage(&call, copied, || false))
            }
            "get_file_info" => {
                let info = Self::path_arg(&args, 0, "path").and_then(|p| file_info(Path::new(&p)));
                let Some(info) = self.usage(&call, info.map(Some), || None) else {
                    return lua.pack_multi(Value::Nil);
                };
                let table = lua.create_table()?;
                table.set("name", info.name)?;
                table.set("full_path", info.full_path)?;
                table.set("size", info.size)?;
                table.set("modified", info.modified)?;
                table.set("extension", info.extension)?;
                table.set("is_readonly", info.is_readonly)?;
                lua.pack_multi(table)
            }
            _ => Err(unbound(member)),
        }
    }
}
