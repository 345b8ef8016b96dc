//! Path resolution shared by every driver.
//!
//! Caller paths are relative. They are normalized on their own (so `..` can never climb
//! out of the root) and then joined under the root prefix, which is normalized once when
//! the driver is built.

const SEPARATOR: char = '/';

/// Maps caller-supplied relative paths to storage keys under a fixed root prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResolver {
    root: String,
}

impl PathResolver {
    pub fn new(root: &str) -> Self {
        Self {
            root: normalize_path(root),
        }
    }

    /// The normalized root prefix: no leading or trailing separator, possibly empty.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolve a relative path to its full key.
    ///
    /// `"."`, `""` and anything that normalizes to nothing resolve to the root itself.
    pub fn resolve(&self, path: &str) -> String {
        join(&self.root, &normalize_path(path))
    }

    /// Resolve a listing prefix.
    ///
    /// A prefix naming the root, or one the caller ended with a separator, is treated as a
    /// directory and gets a trailing `/` so that `uploads` never matches `uploads-old/...`.
    /// Any other prefix keeps plain string-prefix semantics (`a/b` matches `a/b.txt`).
    pub fn resolve_prefix(&self, prefix: &str) -> String {
        let relative = normalize_path(prefix);
        let as_directory = relative.is_empty() || prefix.ends_with(['/', '\\']);
        let mut resolved = join(&self.root, &relative);
        if as_directory && !resolved.is_empty() {
            resolved.push(SEPARATOR);
        }
        resolved
    }

    /// Strip the root back off a full key. `None` if the key lies outside the root.
    pub fn relativize<'a>(&self, key: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            return Some(key);
        }
        key.strip_prefix(self.root.as_str())?.strip_prefix(SEPARATOR)
    }
}

/// Collapse separators, drop `.` segments and apply `..` without going above the start.
///
/// Backslashes are accepted as separators. The result has no leading or trailing `/`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn join(root: &str, relative: &str) -> String {
    match (root.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => root.to_string(),
        (false, false) => format!("{}{}{}", root, SEPARATOR, relative),
    }
}
