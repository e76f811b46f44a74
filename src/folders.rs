//! Folder resolution and traversal.
//!
//! Resolution tries the folder id, then the hierarchical path, then the
//! display name, and never fails: it returns `None` together with one
//! diagnostic per strategy that did not work. Traversals treat a folder
//! whose children cannot be listed as a leaf.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::error::{CallError, Result};
use crate::session::Session;
use crate::store::{DefaultFolder, FolderRef};

/// Canonical form of a folder path: forward slashes become backslashes,
/// surrounding whitespace and a leading `\\` are removed.
///
/// Returns `None` for an empty path.
pub fn normalize_folder_path(path: &str) -> Option<String> {
    let text = path.replace('/', "\\");
    let text = text.trim();
    let text = text.strip_prefix("\\\\").unwrap_or(text);
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Ways a caller can point at a folder. Empty fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSelector {
    pub id: Option<String>,
    pub path: Option<String>,
    pub name: Option<String>,
}

impl FolderSelector {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// `true` when no field carries a value.
    pub fn is_empty(&self) -> bool {
        [&self.id, &self.path, &self.name]
            .iter()
            .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve a folder by id, then path, then name.
pub fn resolve(session: &Session<'_>, selector: &FolderSelector) -> (Option<FolderRef>, Vec<String>) {
    let mut attempts = Vec::new();

    if let Some(id) = non_empty(&selector.id) {
        match session.call("look up folder by id", |store| store.folder_by_id(id)) {
            Ok(Some(folder)) => return (Some(folder), attempts),
            Ok(None) => attempts.push(format!("id '{id}': not found")),
            Err(e) => attempts.push(format!("id '{id}': {}", e.source)),
        }
    }

    if let Some(path) = non_empty(&selector.path) {
        match folder_by_path(session, path) {
            Ok(Some(folder)) => return (Some(folder), attempts),
            Ok(None) => attempts.push(format!("path '{path}': not found")),
            Err(e) => attempts.push(format!("path '{path}': {}", e.source)),
        }
    }

    if let Some(name) = non_empty(&selector.name) {
        match folder_by_name(session, name) {
            Ok(Some(folder)) => return (Some(folder), attempts),
            Ok(None) => attempts.push(format!("name '{name}': not found")),
            Err(e) => attempts.push(format!("name '{name}': {}", e.source)),
        }
    }

    debug!(?selector, attempts = attempts.len(), "Folder not resolved");
    (None, attempts)
}

/// Children of `folder`, or nothing when they cannot be listed.
fn children_or_empty(session: &Session<'_>, folder: &FolderRef) -> Vec<FolderRef> {
    match session.call("list child folders", |store| store.child_folders(folder)) {
        Ok(children) => children,
        Err(e) => {
            debug!(folder = %folder.name, error = %e, "Child folders unavailable");
            Vec::new()
        }
    }
}

fn same_name(folder: &FolderRef, name: &str) -> bool {
    folder.name.trim().to_lowercase() == name.trim().to_lowercase()
}

/// Case-insensitive name search: the inbox's direct children, then every
/// root and its direct children.
pub fn folder_by_name(
    session: &Session<'_>,
    name: &str,
) -> std::result::Result<Option<FolderRef>, CallError> {
    let inbox = session.call("open inbox", |store| store.default_folder(DefaultFolder::Inbox))?;
    if let Some(found) = children_or_empty(session, &inbox)
        .into_iter()
        .find(|f| same_name(f, name))
    {
        return Ok(Some(found));
    }

    let roots = session.call("list root folders", |store| store.root_folders())?;
    for root in roots {
        if same_name(&root, name) {
            return Ok(Some(root));
        }
        if let Some(found) = children_or_empty(session, &root)
            .into_iter()
            .find(|f| same_name(f, name))
        {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Walk a `\\root\child\grandchild` path, matching segments case-insensitively.
pub fn folder_by_path(
    session: &Session<'_>,
    path: &str,
) -> std::result::Result<Option<FolderRef>, CallError> {
    let Some(normalized) = normalize_folder_path(path) else {
        return Ok(None);
    };
    let segments: Vec<&str> = normalized
        .split('\\')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let Some((first, rest)) = segments.split_first() else {
        return Ok(None);
    };

    let mut candidates: Vec<FolderRef> = match session.call("list root folders", |s| s.root_folders()) {
        Ok(roots) => roots.into_iter().filter(|r| same_name(r, first)).collect(),
        Err(e) => {
            debug!(error = %e, "Root folders unavailable during path walk");
            Vec::new()
        }
    };
    if candidates.is_empty() {
        if let Ok(Some(found)) = folder_by_name(session, first) {
            candidates.push(found);
        }
    }

    'candidates: for root in candidates {
        let own_path = root.path.as_deref().and_then(normalize_folder_path);
        if own_path.is_some_and(|p| p.to_lowercase() == normalized.to_lowercase()) {
            return Ok(Some(root));
        }

        let mut current = root;
        for segment in rest {
            match children_or_empty(session, &current)
                .into_iter()
                .find(|f| same_name(f, segment))
            {
                Some(next) => current = next,
                None => continue 'candidates,
            }
        }
        return Ok(Some(current));
    }
    Ok(None)
}

/// One folder in a tree listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FolderNode {
    pub folder: FolderRef,
    pub depth: usize,
}

/// Breadth-first listing down to `max_depth`, from `root` or from every
/// store root. Folders reachable twice are listed once.
pub fn list_folders(
    session: &Session<'_>,
    root: Option<&FolderSelector>,
    max_depth: usize,
) -> Result<Vec<FolderNode>> {
    let starts = match root.filter(|r| !r.is_empty()) {
        Some(selector) => match resolve(session, selector) {
            (Some(folder), _) => vec![folder],
            (None, attempts) => {
                let detail = if attempts.is_empty() {
                    "folder not found".to_string()
                } else {
                    attempts.join("; ")
                };
                return Err(crate::error::ReplyScanError::FolderNotFound(detail));
            }
        },
        None => session.call("list root folders", |store| store.root_folders())?,
    };

    let mut queue: VecDeque<(FolderRef, usize)> = starts.into_iter().map(|f| (f, 0)).collect();
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();

    while let Some((folder, depth)) = queue.pop_front() {
        if depth > max_depth || !seen.insert(folder.identity_key()) {
            continue;
        }
        if depth < max_depth {
            for child in children_or_empty(session, &folder) {
                queue.push_back((child, depth + 1));
            }
        }
        nodes.push(FolderNode { folder, depth });
    }
    Ok(nodes)
}

/// Every reachable folder, depth-first: the inbox subtree first, then the
/// remaining roots. Non-mail folders are included; scans skip them.
pub fn all_mail_folders(session: &Session<'_>) -> Vec<FolderRef> {
    let mut folders = Vec::new();
    let mut visited = HashSet::new();

    let inbox = match session.call("open inbox", |store| store.default_folder(DefaultFolder::Inbox)) {
        Ok(inbox) => {
            visit(session, inbox.clone(), &mut visited, &mut folders);
            Some(inbox)
        }
        Err(e) => {
            warn!(error = %e, "Inbox unavailable for global scan");
            None
        }
    };

    match session.call("list root folders", |store| store.root_folders()) {
        Ok(roots) => {
            for root in roots {
                let is_inbox = inbox
                    .as_ref()
                    .is_some_and(|i| i.entry_id.is_some() && i.entry_id == root.entry_id);
                if !is_inbox {
                    visit(session, root, &mut visited, &mut folders);
                }
            }
        }
        Err(e) => warn!(error = %e, "Root folders unavailable for global scan"),
    }

    debug!(count = folders.len(), "Collected folders for global scan");
    folders
}

fn visit(
    session: &Session<'_>,
    folder: FolderRef,
    visited: &mut HashSet<String>,
    out: &mut Vec<FolderRef>,
) {
    if !visited.insert(folder.path_key()) {
        return;
    }
    let children = children_or_empty(session, &folder);
    out.push(folder);
    for child in children {
        visit(session, child, visited, out);
    }
}

/// Resolve extra folder names, dropping unknown names and repeated paths.
pub fn resolve_additional_folders<S: AsRef<str>>(
    session: &Session<'_>,
    names: &[S],
) -> Vec<FolderRef> {
    let mut resolved = Vec::new();
    let mut seen = HashSet::new();
    for name in names.iter().map(AsRef::as_ref) {
        if name.trim().is_empty() {
            continue;
        }
        match folder_by_name(session, name) {
            Ok(Some(folder)) => {
                if seen.insert(folder.path_key()) {
                    resolved.push(folder);
                }
            }
            Ok(None) => warn!(name, "Additional folder not found"),
            Err(e) => warn!(name, error = %e, "Additional folder lookup failed"),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;
    use crate::store::memory::MemoryStore;
    use crate::store::MailStore;
    use std::time::Duration;

    fn store() -> MemoryStore {
        MemoryStore::from_json_str(
            r#"{
            "default_folders": { "inbox": "inbox" },
            "folders": [
                { "id": "root", "name": "me@example.com", "children": [
                    { "id": "inbox", "name": "Inbox", "children": [
                        { "id": "clients", "name": "Clients", "children": [
                            { "id": "acme", "name": "Acme" }
                        ] }
                    ] },
                    { "id": "locked", "name": "Locked", "inaccessible": true },
                    { "id": "cal", "name": "Calendar", "item_kind": "calendar" }
                ] },
                { "id": "archive-root", "name": "Online Archive", "children": [
                    { "id": "old", "name": "Old Stuff" }
                ] }
            ]
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_folder_path() {
        assert_eq!(
            normalize_folder_path("\\\\me\\Inbox"),
            Some("me\\Inbox".to_string())
        );
        assert_eq!(
            normalize_folder_path(" me/Inbox/Clients "),
            Some("me\\Inbox\\Clients".to_string())
        );
        assert_eq!(normalize_folder_path("  "), None);
        assert_eq!(normalize_folder_path("\\\\"), None);
    }

    #[test]
    fn test_resolve_by_id() {
        let store = store();
        let session = Session::new(&store);
        let (folder, attempts) = resolve(&session, &FolderSelector::by_id("acme"));
        assert_eq!(folder.unwrap().name, "Acme");
        assert!(attempts.is_empty());
    }

    #[test]
    fn test_resolve_unknown_id_falls_through_to_name() {
        let store = store();
        let session = Session::new(&store);
        let selector = FolderSelector {
            id: Some("missing".to_string()),
            name: Some("clients".to_string()),
            ..Default::default()
        };
        let (folder, attempts) = resolve(&session, &selector);
        assert_eq!(folder.unwrap().name, "Clients");
        assert_eq!(attempts.len(), 1);
    }

    #[test]
    fn test_resolve_path_case_insensitive() {
        let store = store();
        let session = Session::new(&store);
        let (folder, _) = resolve(
            &session,
            &FolderSelector::by_path("\\\\ME@EXAMPLE.COM\\inbox\\clients\\ACME"),
        );
        let folder = folder.unwrap();
        assert_eq!(folder.entry_id.as_deref(), Some("acme"));
    }

    #[test]
    fn test_resolve_path_from_named_first_segment() {
        let store = store();
        let session = Session::new(&store);
        // "Clients" is not a root, so the walk starts from the name search.
        let (folder, _) = resolve(&session, &FolderSelector::by_path("Clients/Acme"));
        assert_eq!(folder.unwrap().name, "Acme");
    }

    #[test]
    fn test_resolve_root_path_matches_itself() {
        let store = store();
        let session = Session::new(&store);
        let (folder, _) = resolve(&session, &FolderSelector::by_path("\\\\Online Archive"));
        assert_eq!(folder.unwrap().entry_id.as_deref(), Some("archive-root"));
    }

    #[test]
    fn test_resolve_missing_segment_fails() {
        let store = store();
        let session = Session::new(&store);
        let (folder, attempts) =
            resolve(&session, &FolderSelector::by_path("me@example.com\\Inbox\\Nope"));
        assert!(folder.is_none());
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].contains("not found"));
    }

    #[test]
    fn test_path_walk_retries_busy_hierarchy_calls() {
        let store = store();
        let session = Session::new(&store).with_gateway(Gateway::new(1, Duration::ZERO));
        store.fail_next_lookups(1, "Call was rejected by callee.");
        let (folder, attempts) = resolve(
            &session,
            &FolderSelector::by_path("me@example.com/Inbox/Clients"),
        );
        assert_eq!(folder.unwrap().entry_id.as_deref(), Some("clients"));
        assert!(attempts.is_empty());
        assert!(store.root_folders().is_ok());
    }

    #[test]
    fn test_path_walk_falls_back_to_name_search() {
        let store = store();
        let session = Session::new(&store);
        store.fail_next_lookups(1, "Access denied");
        // The failed root listing falls back to the name search.
        let folder = folder_by_path(&session, "\\\\Online Archive\\Old Stuff").unwrap();
        assert_eq!(folder.unwrap().entry_id.as_deref(), Some("old"));
    }

    #[test]
    fn test_resolve_name_searches_roots_and_their_children() {
        let store = store();
        let session = Session::new(&store);
        let (folder, _) = resolve(&session, &FolderSelector::by_name("old stuff"));
        assert_eq!(folder.unwrap().entry_id.as_deref(), Some("old"));
        // Grandchildren of roots are out of reach of the name search.
        let (folder, attempts) = resolve(&session, &FolderSelector::by_name("Acme"));
        assert!(folder.is_none());
        assert_eq!(attempts, vec!["name 'Acme': not found".to_string()]);
    }

    #[test]
    fn test_resolve_empty_selector_has_no_attempts() {
        let store = store();
        let session = Session::new(&store);
        let (folder, attempts) = resolve(&session, &FolderSelector::default());
        assert!(folder.is_none());
        assert!(attempts.is_empty());
    }

    #[test]
    fn test_list_folders_breadth_first_with_depth() {
        let store = store();
        let session = Session::new(&store);
        let nodes = list_folders(&session, None, 1).unwrap();
        let names: Vec<(&str, usize)> = nodes
            .iter()
            .map(|n| (n.folder.name.as_str(), n.depth))
            .collect();
        assert_eq!(
            names,
            vec![
                ("me@example.com", 0),
                ("Online Archive", 0),
                ("Inbox", 1),
                ("Locked", 1),
                ("Calendar", 1),
                ("Old Stuff", 1),
            ]
        );
    }

    #[test]
    fn test_list_folders_from_unknown_root_fails() {
        let store = store();
        let session = Session::new(&store);
        let err = list_folders(&session, Some(&FolderSelector::by_name("Nope")), 2).unwrap_err();
        assert!(matches!(err, crate::error::ReplyScanError::FolderNotFound(_)));
    }

    #[test]
    fn test_all_mail_folders_inbox_first_without_duplicates() {
        let store = store();
        let session = Session::new(&store);
        let folders = all_mail_folders(&session);
        let ids: Vec<&str> = folders
            .iter()
            .filter_map(|f| f.entry_id.as_deref())
            .collect();
        assert_eq!(
            ids,
            vec!["inbox", "clients", "acme", "root", "locked", "cal", "archive-root", "old"]
        );
    }

    #[test]
    fn test_resolve_additional_folders_dedups() {
        let store = store();
        let session = Session::new(&store);
        let folders = resolve_additional_folders(&session, &["Clients", "clients", "Nope", ""]);
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Clients");
    }
}
