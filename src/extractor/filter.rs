//! Skip rules applied during the filesystem walk.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Simple glob matching (supports * as wildcard, which also matches `/`).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Prefix before the first *
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Suffix after the last *
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

/// One line of a `.gitignore` file.
#[derive(Debug, Clone)]
struct IgnoreRule {
    regex: Regex,
    negate: bool,
    dir_only: bool,
    anchored: bool,
}

impl IgnoreRule {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (negate, line) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let dir_only = line.ends_with('/');
        let line = line.trim_end_matches('/');
        let anchored = line.contains('/');
        let pattern = line.trim_start_matches('/');
        if pattern.is_empty() {
            return None;
        }
        Some(Self {
            regex: gitignore_regex(pattern)?,
            negate,
            dir_only,
            anchored,
        })
    }

    /// `path` is relative to the directory holding the `.gitignore`.
    fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            self.regex.is_match(path)
        } else {
            let base = path.rsplit('/').next().unwrap_or(path);
            self.regex.is_match(base)
        }
    }
}

/// Translates a gitignore pattern into an anchored regex. `*` and `?` stop
/// at `/`, `**` crosses directories, `[...]` is a character class.
fn gitignore_regex(pattern: &str) -> Option<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '\\' => {
                i += 1;
                if let Some(c) = chars.get(i) {
                    re.push_str(&regex::escape(&c.to_string()));
                }
            }
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(len) => {
                    re.push('[');
                    for (j, c) in chars[i + 1..i + 1 + len].iter().enumerate() {
                        match c {
                            '!' if j == 0 => re.push('^'),
                            '\\' | '[' => {
                                re.push('\\');
                                re.push(*c);
                            }
                            _ => re.push(*c),
                        }
                    }
                    re.push(']');
                    i += len + 1;
                }
                None => re.push_str("\\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Lazily loaded `.gitignore` rules, keyed by root-relative directory.
#[derive(Debug, Default)]
pub struct GitignoreCache {
    root: PathBuf,
    rules: HashMap<String, Vec<IgnoreRule>>,
}

impl GitignoreCache {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            rules: HashMap::new(),
        }
    }

    fn rules_for(&mut self, dir: &str) -> &[IgnoreRule] {
        let root = &self.root;
        self.rules.entry(dir.to_string()).or_insert_with(|| {
            let path = if dir.is_empty() {
                root.join(".gitignore")
            } else {
                root.join(dir).join(".gitignore")
            };
            fs::read_to_string(path)
                .map(|content| content.lines().filter_map(IgnoreRule::parse).collect())
                .unwrap_or_default()
        })
    }

    /// Whether a root-relative `path` is ignored by the `.gitignore` files
    /// above it. The last matching rule wins, deeper files after shallower
    /// ones, so a `!` rule re-includes what an earlier rule excluded.
    pub fn is_ignored(&mut self, path: &str, is_dir: bool) -> bool {
        let components: Vec<&str> = path.split('/').collect();
        let mut ignored = false;
        for depth in 0..components.len() {
            let dir = components[..depth].join("/");
            let sub = components[depth..].join("/");
            for rule in self.rules_for(&dir) {
                if rule.matches(&sub, is_dir) {
                    ignored = !rule.negate;
                }
            }
        }
        ignored
    }
}

/// Directory and file skip rules for one scan root.
pub struct PathFilter<'a> {
    pub dirs_to_skip: HashSet<String>,
    pub skip_dir_regex: Option<&'a Regex>,
    pub skip_dir_glob: Option<&'a str>,
    pub gitignore: Option<GitignoreCache>,
}

impl PathFilter<'_> {
    /// Whether the walk should skip `path` (root-relative, `/`-separated).
    /// Skipping a directory skips everything inside it.
    pub fn should_skip(&mut self, path: &str, is_dir: bool) -> bool {
        if path.is_empty() {
            return false;
        }
        if is_dir {
            if self.dirs_to_skip.contains(path) {
                return true;
            }
            if let Some(re) = self.skip_dir_regex {
                if re.is_match(path) {
                    return true;
                }
            }
            if let Some(glob) = self.skip_dir_glob {
                if glob_match(glob, path) {
                    return true;
                }
            }
        }
        if let Some(gitignore) = self.gitignore.as_mut() {
            if gitignore.is_ignored(path, is_dir) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("node_modules", "node_modules"));
        assert!(!glob_match("node_modules", "vendor"));
    }

    #[test]
    fn test_glob_match_prefix_suffix() {
        assert!(glob_match("proc*", "proc"));
        assert!(glob_match("proc*", "proc/self"));
        assert!(glob_match("*/.git", "src/.git"));
        assert!(!glob_match("*/.git", "src/.github"));
    }

    #[test]
    fn test_glob_match_contains() {
        assert!(glob_match("*cache*", "home/user/.cache/pip"));
        assert!(!glob_match("*cache*", "home/user/.config"));
    }

    #[test]
    fn test_ignore_rule_parse() {
        assert!(IgnoreRule::parse("# comment").is_none());
        assert!(IgnoreRule::parse("").is_none());
        assert!(IgnoreRule::parse("/").is_none());

        let rule = IgnoreRule::parse("!keep.txt").unwrap();
        assert!(rule.negate);
        assert!(rule.matches("keep.txt", false));

        let rule = IgnoreRule::parse("build/").unwrap();
        assert!(rule.dir_only);
        assert!(!rule.anchored);

        let rule = IgnoreRule::parse("/dist").unwrap();
        assert!(rule.anchored);
        assert!(rule.matches("dist", true));
        assert!(!rule.matches("src/dist", true));
    }

    #[test]
    fn test_ignore_rule_wildcards() {
        let rule = IgnoreRule::parse("docs/**/*.md").unwrap();
        assert!(rule.matches("docs/a.md", false));
        assert!(rule.matches("docs/x/y/a.md", false));
        assert!(!rule.matches("src/a.md", false));

        let rule = IgnoreRule::parse("**/fixtures").unwrap();
        assert!(rule.matches("fixtures", true));
        assert!(rule.matches("a/b/fixtures", true));

        let rule = IgnoreRule::parse("log?.txt").unwrap();
        assert!(rule.matches("log1.txt", false));
        assert!(!rule.matches("log10.txt", false));

        let rule = IgnoreRule::parse("lib/*.so").unwrap();
        assert!(rule.matches("lib/a.so", false));
        assert!(!rule.matches("lib/x/a.so", false));

        let rule = IgnoreRule::parse("*.[oa]").unwrap();
        assert!(rule.matches("main.o", false));
        assert!(rule.matches("libx.a", false));
        assert!(!rule.matches("main.c", false));

        let rule = IgnoreRule::parse("\\#notes").unwrap();
        assert!(rule.matches("#notes", false));
    }

    #[test]
    fn test_gitignore_negation() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "*.json\n!package.json\n").unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("pkg").join(".gitignore"), "package.json\n").unwrap();

        let mut cache = GitignoreCache::new(tmp.path());
        assert!(cache.is_ignored("tsconfig.json", false));
        assert!(!cache.is_ignored("package.json", false));
        assert!(!cache.is_ignored("app/package.json", false));
        // A deeper .gitignore overrides the root one.
        assert!(cache.is_ignored("pkg/package.json", false));
    }

    #[test]
    fn test_gitignore_cache() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "*.log\nbuild/\n/dist\n").unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("pkg").join(".gitignore"), "secret.txt\n").unwrap();

        let mut cache = GitignoreCache::new(tmp.path());
        assert!(cache.is_ignored("app.log", false));
        assert!(cache.is_ignored("pkg/debug.log", false));
        assert!(cache.is_ignored("build", true));
        assert!(!cache.is_ignored("build", false));
        assert!(cache.is_ignored("dist", true));
        assert!(!cache.is_ignored("pkg/dist", true));
        assert!(cache.is_ignored("pkg/secret.txt", false));
        assert!(!cache.is_ignored("secret.txt", false));
        assert!(!cache.is_ignored("package.json", false));
    }

    #[test]
    fn test_path_filter_dirs() {
        let re = Regex::new("^proc$").unwrap();
        let mut filter = PathFilter {
            dirs_to_skip: ["sys".to_string()].into_iter().collect(),
            skip_dir_regex: Some(&re),
            skip_dir_glob: Some("*/.git"),
            gitignore: None,
        };
        assert!(filter.should_skip("sys", true));
        assert!(filter.should_skip("proc", true));
        assert!(filter.should_skip("src/.git", true));
        assert!(!filter.should_skip("usr", true));
        // Directory rules don't apply to files.
        assert!(!filter.should_skip("sys", false));
        assert!(!filter.should_skip("", true));
    }
}
