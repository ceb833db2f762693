// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Identifier normalization, the path table, and URL construction

use regex::Regex;
use std::collections::HashMap;

use crate::config::{Config, PackageSpec};

/// Directory part of an identifier: everything before the last `/`.
pub fn parent_of(id: &str) -> &str {
    match id.rfind('/') {
        Some(pos) => &id[..pos],
        None => "",
    }
}

/// Join a path and a trailing segment with a single separator
pub fn join_path(path: &str, file: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        format!("{path}{file}")
    } else {
        format!("{path}/{file}")
    }
}

fn remove_end_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

/// Resolve leading `.`/`..` segments of `name` against the base
/// identifier's directory.
///
/// One leading dot substitutes the base directory itself; each leading
/// double dot climbs one level, saturating at the root. Normalization is
/// idempotent: the result carries no leading dot segments.
pub fn normalize_name(name: &str, base: &str) -> String {
    if !name.starts_with('.') {
        return name.to_string();
    }
    let mut base = base;
    let mut rest = name;
    if let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    while let Some(stripped) = rest.strip_prefix("../") {
        rest = stripped;
        base = parent_of(base);
    }
    if base.is_empty() {
        rest.to_string()
    } else {
        join_path(base, rest)
    }
}

/// Check for an absolute location: a leading `/` or an explicit scheme
pub fn is_absolute_url(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    match path.split_once("://") {
        Some((scheme, _)) => !scheme.is_empty() && !scheme.contains('/'),
        None => false,
    }
}

/// Turn a resolved path into a loadable URL.
///
/// Relative paths are joined onto `base_url`; absolute ones are left
/// untouched. `add_ext` is appended unless the path already carries a
/// query marker.
pub fn resolve_url(path: &str, base_url: &str, add_ext: Option<&str>) -> String {
    let mut url = if !base_url.is_empty() && !is_absolute_url(path) {
        join_path(base_url, path)
    } else {
        path.to_string()
    };
    if let Some(ext) = add_ext {
        if !path.contains('?') {
            url.push_str(ext);
        }
    }
    url
}

struct PathEntry {
    path: String,
    main: Option<String>,
    lib: Option<String>,
}

/// Compiled path table.
///
/// All configured prefixes are folded into one anchored pattern whose
/// alternatives are ordered by descending specificity (separator depth of
/// the prefix), so the deepest matching prefix wins; the `(/|$)` boundary
/// keeps `a` from matching `ab/c`. Plugin-qualified rules are stored
/// under a synthetic `prefix!/id` key and consulted before the
/// unqualified table.
pub struct PathMatcher {
    entries: HashMap<String, PathEntry>,
    pattern: Option<Regex>,
}

impl PathMatcher {
    /// Compile the matcher from a session configuration
    pub fn compile(config: &Config) -> Self {
        let mut entries = HashMap::new();

        for (key, path) in &config.paths {
            let key = remove_end_slash(&key.replacen('!', "!/", 1)).to_string();
            entries.insert(
                key,
                PathEntry {
                    path: remove_end_slash(path).to_string(),
                    main: None,
                    lib: None,
                },
            );
        }

        for (key, spec) in &config.packages {
            let (key, entry) = normalize_package(key, spec);
            entries.insert(key, entry);
        }

        // deepest prefix first; the boundary group disambiguates the rest
        let mut prefixes: Vec<&String> = entries.keys().collect();
        prefixes.sort_by(|a, b| {
            let depth = |p: &str| p.matches('/').count();
            depth(b).cmp(&depth(a)).then_with(|| a.cmp(b))
        });

        let pattern = if prefixes.is_empty() {
            None
        } else {
            let alternation = prefixes
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            // the prefix table is small and built once per session
            Some(
                Regex::new(&format!("^({alternation})(/|$)"))
                    .expect("escaped prefix alternation is a valid pattern"),
            )
        };

        Self { entries, pattern }
    }

    /// Map an identifier through the path table.
    ///
    /// With a plugin prefix, a `prefix!/id`-qualified rule is tried
    /// first, falling back to the unqualified table. An identifier with
    /// no matching rule maps to itself.
    pub fn resolve_path(&self, name: &str, plugin_prefix: Option<&str>) -> String {
        if let Some(prefix) = plugin_prefix {
            let qualified = format!("{prefix}!/{name}");
            if let Some(path) = self.apply(&qualified) {
                return path;
            }
        }
        self.apply(name).unwrap_or_else(|| name.to_string())
    }

    fn apply(&self, name: &str) -> Option<String> {
        let caps = self.pattern.as_ref()?.captures(name)?;
        let whole = caps.get(0)?;
        let prefix = caps.get(1)?.as_str();
        let entry = self.entries.get(prefix)?;
        let rest = &name[whole.end()..];

        if name == prefix {
            // the identifier names the entry itself
            if let Some(main) = &entry.main {
                return Some(main.clone());
            }
        }
        let root = entry.lib.as_deref().unwrap_or(&entry.path);
        if rest.is_empty() && name == prefix {
            Some(root.to_string())
        } else {
            Some(join_path(root, rest))
        }
    }
}

fn normalize_package(key: &str, spec: &PackageSpec) -> (String, PathEntry) {
    // a part starting with a dot goes through normal dot processing
    // against the package path; anything else is path-prefixed
    fn part(path: &str, value: &str) -> String {
        let full = if value.starts_with('.') {
            normalize_name(value, path)
        } else {
            join_path(path, value)
        };
        remove_end_slash(&full).to_string()
    }

    match spec {
        PackageSpec::Location(location) => {
            let path = remove_end_slash(location).to_string();
            let entry = PathEntry {
                main: Some(part(&path, "./lib/main")),
                lib: Some(part(&path, "./lib")),
                path,
            };
            (remove_end_slash(key).to_string(), entry)
        }
        PackageSpec::Descriptor {
            name,
            path,
            main,
            lib,
        } => {
            let path = remove_end_slash(path.as_deref().unwrap_or("")).to_string();
            let entry = PathEntry {
                main: main.as_deref().map(|m| part(&path, m)),
                lib: lib.as_deref().map(|l| part(&path, l)),
                path,
            };
            let key = name.as_deref().unwrap_or(key);
            (remove_end_slash(key).to_string(), entry)
        }
    }
}
