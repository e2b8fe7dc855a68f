//! Path normalization and the generic glob helper used by backends that do
//! not support pattern matching natively.

/// Normalize a path coming in from the native layer: either separator is
/// accepted, duplicates collapse, and the result is absolute from the
/// volume root with forward slashes (`/a/b.txt`). Dot segments resolve in
/// place; `..` never climbs above the root. The root itself is `/`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Split a normalized path into parent directory and final component.
/// The root splits into (`/`, ``).
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(n) => (&path[..n], &path[n + 1..]),
        None => ("/", path),
    }
}

/// Case-sensitive glob match supporting `*` (any run, including empty) and
/// `?` (exactly one character). An empty pattern matches everything.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = name.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            // Backtrack: let the last `*` swallow one more character.
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_both_separators() {
        assert_eq!(normalize_path("\\a\\b.txt"), "/a/b.txt");
        assert_eq!(normalize_path("a//b/"), "/a/b");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn normalize_resolves_dot_segments() {
        assert_eq!(normalize_path("/a/./b"), "/a/b");
        assert_eq!(normalize_path("/a/../b"), "/b");
        assert_eq!(normalize_path("/../a"), "/a");
        assert_eq!(normalize_path("/.."), "/");
        assert_eq!(normalize_path("\\..\\secret.txt"), "/secret.txt");
    }

    #[test]
    fn split_parent_and_name() {
        assert_eq!(split_path("/a/b.txt"), ("/a", "b.txt"));
        assert_eq!(split_path("/a.txt"), ("/", "a.txt"));
        assert_eq!(split_path("/"), ("/", ""));
    }

    #[test]
    fn glob_basics() {
        assert!(glob_match("", "anything"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*.txt", "a.txt"));
        assert!(!glob_match("*.txt", "a.txt.bak"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("a*b*c", "a-x-b-y-c"));
        assert!(!glob_match("a*b*c", "a-x-c"));
    }
}
