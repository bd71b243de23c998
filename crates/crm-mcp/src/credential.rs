use regex::Regex;
use std::sync::OnceLock;

pub const MASK_TOKEN: &str = "****";
const MAX_VISIBLE_PER_SIDE: usize = 4;

/// Masked display form of a secret: at most four leading and four trailing
/// characters survive, and never more than a quarter of the value per side.
pub fn mask(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let visible = (chars.len() / 4).min(MAX_VISIBLE_PER_SIDE);
    let head: String = chars[..visible].iter().collect();
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("{head}{MASK_TOKEN}{tail}")
}

// Only an `Authorization` header (or a JSON/query echo of one) marks the next
// word as a token; plain prose such as "Bearer token expired" stays intact.
fn bearer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(authorization["']?\s*[:=]\s*["']?bearer)\s+[A-Za-z0-9\-._~+/]+=*"#)
            .expect("static regex is valid")
    })
}

/// Replaces every occurrence of each secret with its masked form and redacts
/// `Authorization: Bearer <token>` headers echoed back by providers.
pub fn scrub<'a>(text: &str, secrets: impl IntoIterator<Item = &'a CredentialDescriptor>) -> String {
    let mut out = text.to_string();
    for secret in secrets {
        if !secret.raw.is_empty() && out.contains(secret.raw.as_str()) {
            out = out.replace(secret.raw.as_str(), &secret.masked);
        }
    }
    bearer_regex()
        .replace_all(&out, format!("$1 {MASK_TOKEN}").as_str())
        .into_owned()
}

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialDescriptor {
    raw: String,
    masked: String,
    source_label: String,
}

impl CredentialDescriptor {
    pub fn new(raw: impl Into<String>, source_label: impl Into<String>) -> Self {
        let raw = raw.into();
        let masked = mask(&raw);
        Self {
            raw,
            masked,
            source_label: source_label.into(),
        }
    }

    pub fn masked(&self) -> &str {
        &self.masked
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Raw secret for building a backend request. Only adapters call this.
    pub(crate) fn expose(&self) -> &str {
        &self.raw
    }

    pub fn scrub(&self, text: &str) -> String {
        scrub(text, [self])
    }
}

impl std::fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDescriptor")
            .field("masked", &self.masked)
            .field("source_label", &self.source_label)
            .finish()
    }
}

impl std::fmt::Display for CredentialDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.masked, self.source_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLES: [&str; 5] = [
        "abcdefghi",
        "eyJraWQiOiIxY2UxZTEzNjE3ZGNmNzY2YjNjZWJjY2Y4ZGM1YmFmYThhNjVlNjg0MDIzZjdjMzJiZTgzNDliMjM4MDEzNWI0",
        "ya29.a0AfH6SMBx-1234567890",
        "short-ish-token!",
        "ключ-доступа-секрет",
    ];

    // Windows holding a `*` can coincide with the marker itself (`abb****cd`
    // masks to `ab****cd`), which reveals nothing, so they are not checked.
    fn middle_windows(raw: &str, width: usize) -> Vec<String> {
        let chars: Vec<char> = raw.chars().collect();
        let visible = (chars.len() / 4).min(MAX_VISIBLE_PER_SIDE);
        let middle = &chars[visible..chars.len() - visible];
        middle
            .windows(width)
            .filter(|w| !w.contains(&'*'))
            .map(|w| w.iter().collect::<String>())
            .collect()
    }

    fn check_mask(raw: &str) -> Result<(), TestCaseError> {
        let masked = mask(raw);
        let chars: Vec<char> = raw.chars().collect();
        let visible = (chars.len() / 4).min(MAX_VISIBLE_PER_SIDE);
        let head: String = chars[..visible].iter().collect();
        let tail: String = chars[chars.len() - visible..].iter().collect();

        prop_assert_ne!(&masked, raw);
        prop_assert_eq!(&masked, &format!("{head}{MASK_TOKEN}{tail}"));
        prop_assert_eq!(&mask(raw), &masked);
        for window in middle_windows(raw, 5) {
            prop_assert!(!masked.contains(&window), "{} leaked {}", raw, window);
        }
        Ok(())
    }

    #[test]
    fn mask_hides_the_middle() {
        for raw in SAMPLES {
            check_mask(raw).expect("mask property");
        }
    }

    #[test]
    fn marker_lookalikes_in_the_secret_are_not_leaks() {
        assert_eq!(mask("abb****cd"), "ab****cd");
        check_mask("abb****cd").expect("mask property");
        check_mask("****************").expect("mask property");
    }

    proptest! {
        #[test]
        fn mask_hides_the_middle_of_any_token(raw in "[A-Za-z0-9*._~+/=-]{9,96}") {
            check_mask(&raw)?;
        }

        #[test]
        fn mask_hides_the_middle_of_any_unicode_value(
            chars in proptest::collection::vec(any::<char>(), 9..64)
        ) {
            let raw: String = chars.into_iter().collect();
            check_mask(&raw)?;
        }
    }

    #[test]
    fn mask_is_deterministic() {
        for raw in SAMPLES {
            assert_eq!(mask(raw), mask(raw));
        }
    }

    #[test]
    fn mask_keeps_at_most_four_chars_per_side() {
        let raw = "0123456789abcdefghijklmnopqrstuvwxyz";
        assert_eq!(mask(raw), "0123****wxyz");
        assert_eq!(mask("abcdefghi"), "ab****hi");
        assert_eq!(mask("abc"), MASK_TOKEN);
        assert_eq!(mask(""), "");
    }

    #[test]
    fn debug_and_display_never_show_raw() {
        let cred = CredentialDescriptor::new("super-secret-calendly-token", "env CALENDLY_API_TOKEN");
        let dbg = format!("{cred:?}");
        let shown = cred.to_string();
        for text in [dbg, shown] {
            assert!(!text.contains("super-secret-calendly-token"), "{text}");
            assert!(text.contains("env CALENDLY_API_TOKEN"));
        }
    }

    #[test]
    fn scrub_replaces_secrets_and_bearer_headers() {
        let cred = CredentialDescriptor::new("tok_1234567890abcdef", "env X");
        let body = "invalid token tok_1234567890abcdef; header was Authorization: Bearer zzzzzzzzzz";
        let out = cred.scrub(body);
        assert!(!out.contains("tok_1234567890abcdef"));
        assert!(!out.contains("zzzzzzzzzz"));
        assert!(out.contains(cred.masked()));
        assert!(out.contains("Authorization: Bearer ****"));

        let json = r#"{"headers":{"authorization":"Bearer abc.def-ghi"}}"#;
        assert_eq!(
            cred.scrub(json),
            r#"{"headers":{"authorization":"Bearer ****"}}"#
        );
    }

    #[test]
    fn bearer_in_plain_prose_is_not_redacted() {
        let cred = CredentialDescriptor::new("tok_1234567890abcdef", "env X");
        for text in [
            "Bearer token is missing or expired",
            "Provide a bearer token in the Authorization header",
        ] {
            assert_eq!(cred.scrub(text), text);
        }
    }

    #[test]
    fn scrub_leaves_clean_text_alone() {
        let cred = CredentialDescriptor::new("tok_1234567890abcdef", "env X");
        assert_eq!(cred.scrub("Resource not found"), "Resource not found");
    }
}
