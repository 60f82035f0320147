//! `Content-Disposition` filename sanitization (spec §4.5 step 3, §9).
//!
//! Adapted from the teacher's `path_sanitizer.rs`, but aggressive per spec:
//! strip to `[A-Za-z0-9 _.-]`, collapse whitespace runs to a single `_`,
//! cap at 100 chars, and fall back to the literal `"download"`.

const MAX_LEN: usize = 100;

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-')
}

/// Sanitizes an already-assembled `title.ext` candidate. Idempotent: running
/// it again on its own output is a no-op.
pub fn sanitize(candidate: &str) -> String {
    let filtered: String = candidate.chars().filter(|c| is_allowed(*c)).collect();

    let mut out = String::with_capacity(filtered.len());
    let mut chars = filtered.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            out.push('_');
            while chars.peek() == Some(&' ') {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }

    let capped: String = out.chars().take(MAX_LEN).collect();
    if capped.is_empty() {
        "download".to_string()
    } else {
        capped
    }
}

/// Joins a title and container extension, then sanitizes the result.
pub fn build(title: &str, ext: &str) -> String {
    let candidate = if ext.is_empty() { title.to_string() } else { format!("{title}.{ext}") };
    sanitize(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_disallowed_characters() {
        assert_eq!(sanitize("My Video!@#.mp4"), "My_Video.mp4");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(sanitize("a    b.mp4"), "a_b.mp4");
    }

    #[test]
    fn falls_back_to_download_when_empty() {
        assert_eq!(sanitize("???"), "download");
        assert_eq!(sanitize(""), "download");
    }

    #[test]
    fn caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize(&long).len(), MAX_LEN);
    }

    #[test]
    fn is_idempotent() {
        let once = sanitize("Weird <Title> // Name.mp4");
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn preserves_alphanumeric_extension() {
        let name = build("My Cool Video", "mp4");
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn strips_path_separators() {
        let name = sanitize("../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
    }
}
