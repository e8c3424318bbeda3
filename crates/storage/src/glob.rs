//! Glob pattern matching for the sync pipeline's discover stage.
//!
//! Supports `*` (single path segment, any characters), `**` (any number of
//! segments, including zero), and `?` (single character) against
//! `/`-separated virtual paths.

/// Whether `path` matches `pattern` under `*`/`**`/`?` semantics.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    let path_segs: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match_segments(&pattern_segs, &path_segs)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if match_segments(&pattern[1..], path) {
                return true;
            }
            if !path.is_empty() && match_segments(pattern, &path[1..]) {
                return true;
            }
            false
        }
        Some(seg) => {
            if let Some((first, rest)) = path.split_first() {
                match_segment(seg, first) && match_segments(&pattern[1..], rest)
            } else {
                false
            }
        }
    }
}

fn match_segment(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_chars(&p, &t)
}

fn match_chars(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            for i in 0..=t.len() {
                if match_chars(&p[1..], &t[i..]) {
                    return true;
                }
            }
            false
        }
        Some('?') => !t.is_empty() && match_chars(&p[1..], &t[1..]),
        Some(c) => t.first() == Some(c) && match_chars(&p[1..], &t[1..]),
    }
}

/// `true` if `path` matches any of `include` (or `include` is empty) and
/// none of `exclude`.
pub fn passes_filters(path: &str, include: &[String], exclude: &[String]) -> bool {
    let included = include.is_empty() || include.iter().any(|p| glob_match(p, path));
    let excluded = exclude.iter().any(|p| glob_match(p, path));
    included && !excluded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_star() {
        assert!(glob_match("/docs/*.txt", "/docs/readme.txt"));
        assert!(!glob_match("/docs/*.txt", "/docs/sub/readme.txt"));
    }

    #[test]
    fn double_star_any_depth() {
        assert!(glob_match("/docs/**/*.md", "/docs/a/b/c.md"));
        assert!(glob_match("/docs/**/*.md", "/docs/c.md"));
        assert!(!glob_match("/docs/**/*.md", "/other/c.md"));
    }

    #[test]
    fn question_mark_single_char() {
        assert!(glob_match("/a?c", "/abc"));
        assert!(!glob_match("/a?c", "/abbc"));
    }

    #[test]
    fn exclude_overrides_include() {
        assert!(!passes_filters("/docs/secret.txt", &["/docs/*".into()], &["/docs/secret.txt".into()]));
        assert!(passes_filters("/docs/readme.txt", &["/docs/*".into()], &["/docs/secret.txt".into()]));
    }

    #[test]
    fn empty_include_matches_everything() {
        assert!(passes_filters("/anything/at/all.txt", &[], &[]));
    }
}
