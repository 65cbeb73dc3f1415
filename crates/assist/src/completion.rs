//! Completion candidates for the script editor.
//!
//! Candidates come from two groups, listed in this order:
//!
//! - **Api**: namespaces and their members, from the [`ApiRegistry`]
//! - **Keyword**: Lua reserved words, then common builtin functions
//!
//! Within a group, candidates are ordered by rank, then by name.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use macrohost_core::{ApiRegistry, MemberKind};

use crate::lexer::{is_code_position, is_name_byte, is_name_start, LUA_KEYWORDS};

/// Builtin functions offered after the reserved words.
pub const LUA_BUILTINS: &[&str] =
    &["print", "pairs", "ipairs", "tostring", "tonumber", "type", "pcall", "error", "select", "assert"];

const RESERVED_WORD_RANK: u32 = 0;
const BUILTIN_RANK: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionGroup {
    Api,
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Namespace,
    Method,
    Property,
    Keyword,
    Function,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Method => "method",
            Self::Property => "property",
            Self::Keyword => "keyword",
            Self::Function => "function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub group: CompletionGroup,
    pub rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionProvider {
    registry: Arc<ApiRegistry>,
}

impl CompletionProvider {
    pub fn new(registry: Arc<ApiRegistry>) -> Self {
        Self { registry }
    }

    /// Candidate labels for `prefix`, best first.
    ///
    /// `"host."` lists the members of `host`; `"host.l"` filters them; any
    /// other prefix matches namespace names and keywords.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.complete_items(prefix).into_iter().map(|item| item.label).collect()
    }

    pub fn complete_items(&self, prefix: &str) -> Vec<CompletionItem> {
        let mut items = match split_member_prefix(prefix) {
            Some((namespace, partial)) => self.member_items(namespace, partial),
            None => self.top_level_items(prefix),
        };
        items.sort_by(|a, b| {
            a.group
                .cmp(&b.group)
                .then(a.rank.cmp(&b.rank))
                .then_with(|| a.label.cmp(&b.label))
        });
        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.label.clone()));
        items
    }

    fn member_items(&self, namespace: &str, partial: &str) -> Vec<CompletionItem> {
        self.registry
            .lookup(namespace)
            .into_iter()
            .filter(|m| m.name.starts_with(partial))
            .map(|m| CompletionItem {
                label: m.name.clone(),
                kind: match m.kind {
                    MemberKind::Method => CompletionKind::Method,
                    MemberKind::Property => CompletionKind::Property,
                },
                group: CompletionGroup::Api,
                rank: m.rank,
                detail: Some(m.signature.clone()),
            })
            .collect()
    }

    fn top_level_items(&self, prefix: &str) -> Vec<CompletionItem> {
        let namespaces = self
            .registry
            .enabled_namespaces()
            .filter(|ns| ns.name.starts_with(prefix))
            .map(|ns| CompletionItem {
                label: ns.name.clone(),
                kind: CompletionKind::Namespace,
                group: CompletionGroup::Api,
                rank: 0,
                detail: Some(ns.description.clone()),
            });
        let reserved = LUA_KEYWORDS.iter().filter(|k| k.starts_with(prefix)).map(|k| CompletionItem {
            label: k.to_string(),
            kind: CompletionKind::Keyword,
            group: CompletionGroup::Keyword,
            rank: RESERVED_WORD_RANK,
            detail: None,
        });
        let builtins = LUA_BUILTINS.iter().filter(|b| b.starts_with(prefix)).map(|b| CompletionItem {
            label: b.to_string(),
            kind: CompletionKind::Function,
            group: CompletionGroup::Keyword,
            rank: BUILTIN_RANK,
            detail: None,
        });
        namespaces.chain(reserved).chain(builtins).collect()
    }
}

/// `"host.lo"` -> `("host", "lo")`; `None` without a separator.
fn split_member_prefix(prefix: &str) -> Option<(&str, &str)> {
    let idx = prefix.rfind(['.', ':'])?;
    Some((&prefix[..idx], &prefix[idx + 1..]))
}

/// The completion prefix ending at `cursor`: an identifier, optionally
/// preceded by one `name.` or `name:` qualifier.
///
/// `None` inside strings and comments, and after a number literal.
pub fn prefix_at(text: &str, cursor: usize) -> Option<&str> {
    let mut cursor = cursor.min(text.len());
    while !text.is_char_boundary(cursor) {
        cursor -= 1;
    }
    if !is_code_position(text, cursor) {
        return None;
    }

    let bytes = text.as_bytes();
    let word_start = scan_name_back(bytes, cursor);
    if bytes.get(word_start).is_some_and(u8::is_ascii_digit) {
        return None;
    }

    let mut start = word_start;
    if word_start > 0 && matches!(bytes[word_start - 1], b'.' | b':') {
        let sep = word_start - 1;
        let qualifier = scan_name_back(bytes, sep);
        if qualifier < sep && is_name_start(bytes[qualifier]) {
            start = qualifier;
        }
    }
    Some(&text[start..cursor])
}

fn scan_name_back(bytes: &[u8], end: usize) -> usize {
    let mut i = end;
    while i > 0 && is_name_byte(bytes[i - 1]) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrohost_core::{RegistryBuilder, RegistryConfig};
    use proptest::prelude::*;

    fn provider() -> CompletionProvider {
        CompletionProvider::new(Arc::new(ApiRegistry::standard(RegistryConfig::default()).unwrap()))
    }

    #[test]
    fn test_namespace_members() {
        let p = provider();
        assert_eq!(p.complete("host."), vec!["active_doc", "log"]);
        assert_eq!(p.complete("ui."), vec!["show_message", "status_bar"]);
        assert_eq!(p.complete("doc:"), vec!["content", "file_path", "is_dirty", "page_count", "save"]);
    }

    #[test]
    fn test_member_rank_before_name() {
        assert_eq!(provider().complete("data."), vec!["load_csv", "process_table", "save_csv"]);
    }

    #[test]
    fn test_partial_member_filters() {
        let p = provider();
        assert_eq!(p.complete("host.l"), vec!["log"]);
        assert!(p.complete("host.z").is_empty());
    }

    #[test]
    fn test_unknown_namespace_is_empty() {
        let p = provider();
        assert!(p.complete("nothing.").is_empty());
        assert!(p.complete("host.active_doc.").is_empty());
    }

    #[test]
    fn test_api_before_keywords() {
        let p = provider();
        assert_eq!(p.complete("d"), vec!["data", "doc", "do"]);
        // reserved words rank above builtins
        assert_eq!(p.complete("t"), vec!["then", "true", "tonumber", "tostring", "type"]);
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert!(provider().complete("Host").is_empty());
    }

    #[test]
    fn test_empty_prefix_lists_everything() {
        let all = provider().complete("");
        assert_eq!(&all[..6], &["data", "doc", "fs", "host", "math", "ui"]);
        assert_eq!(all.len(), 6 + LUA_KEYWORDS.len() + LUA_BUILTINS.len());
    }

    #[test]
    fn test_disabled_namespace_not_offered() {
        let mut builder = RegistryBuilder::standard(RegistryConfig::default()).unwrap();
        builder.set_enabled("fs", false).unwrap();
        let p = CompletionProvider::new(Arc::new(builder.build()));
        assert!(!p.complete("f").contains(&"fs".to_string()));
        assert!(p.complete("fs.").is_empty());
        assert_eq!(p.complete("ma"), vec!["math"]);
    }

    #[test]
    fn test_items_carry_detail() {
        let items = provider().complete_items("ui.show");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, CompletionKind::Method);
        assert_eq!(items[0].detail.as_deref(), Some("ui.show_message(text, title?)"));
    }

    #[test]
    fn test_prefix_at() {
        assert_eq!(prefix_at("local x = host.lo", 17), Some("host.lo"));
        assert_eq!(prefix_at("host:", 5), Some("host:"));
        assert_eq!(prefix_at("pri", 3), Some("pri"));
        assert_eq!(prefix_at("x = ", 4), Some(""));
        assert_eq!(prefix_at("a.b.c", 5), Some("b.c"));
        assert_eq!(prefix_at("s .. ho", 7), Some("ho"));
    }

    #[test]
    fn test_prefix_at_rejects_strings_comments_numbers() {
        assert_eq!(prefix_at("print('host.", 12), None);
        assert_eq!(prefix_at("-- host.", 8), None);
        assert_eq!(prefix_at("x = 12", 6), None);
    }

    proptest! {
        #[test]
        fn prop_separator_lists_namespace_exactly(ns_idx in 0usize..6, colon in any::<bool>()) {
            let p = provider();
            let registry = ApiRegistry::standard(RegistryConfig::default()).unwrap();
            let ns = &registry.namespaces()[ns_idx];
            let prefix = format!("{}{}", ns.name, if colon { ':' } else { '.' });

            let got = p.complete(&prefix);
            let mut expected: Vec<String> = ns.members.iter().map(|m| m.name.clone()).collect();
            expected.sort();
            let mut sorted = got.clone();
            sorted.sort();
            prop_assert_eq!(sorted, expected);
            let unique: HashSet<_> = got.iter().collect();
            prop_assert_eq!(unique.len(), got.len());
        }

        #[test]
        fn prop_top_level_candidates_match_prefix(prefix in "[a-z]{0,3}") {
            for candidate in provider().complete(&prefix) {
                prop_assert!(candidate.starts_with(&prefix));
            }
        }
    }
}
