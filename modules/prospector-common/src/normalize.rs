//! Name, URL, and country normalization used as dedup keys across the pipeline.

use url::Url;

use crate::error::{ProspectorError, Result};

/// Legal-entity suffixes stripped iteratively from company names.
const LEGAL_SUFFIXES: &[&str] = &[
    " ltd",
    " llc",
    " plc",
    " saog",
    " sa",
    " gmbh",
    " ag",
    " inc",
    " corp",
    " corporation",
    " limited",
    " group",
    " holdings",
    " company",
    " co",
];

/// Normalize a company name for dedup: lowercase, strip trailing punctuation,
/// iteratively strip legal-entity suffixes, collapse whitespace.
///
/// Idempotent: normalizing a normalized name yields the same string.
pub fn normalize_company_name(name: &str) -> String {
    let mut normalized = name.trim().to_lowercase();
    strip_trailing_punctuation(&mut normalized);

    let mut changed = true;
    while changed {
        changed = false;
        for suffix in LEGAL_SUFFIXES {
            if let Some(stripped) = normalized.strip_suffix(suffix) {
                normalized = stripped.trim_end().to_string();
                changed = true;
                break;
            }
        }
        if strip_trailing_punctuation(&mut normalized) {
            changed = true;
        }
    }

    collapse_whitespace(&normalized)
}

fn strip_trailing_punctuation(s: &mut String) -> bool {
    let mut changed = false;
    while let Some(last) = s.chars().last() {
        if matches!(last, '.' | ',' | ';' | ':') {
            s.pop();
            while s.ends_with(' ') {
                s.pop();
            }
            changed = true;
        } else {
            break;
        }
    }
    changed
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a person name: lowercase, punctuation to spaces, collapse whitespace.
pub fn normalize_person_name(name: &str) -> String {
    let lowered = name.to_lowercase().replace(['.', ','], " ");
    collapse_whitespace(&lowered)
}

/// Normalize an email for identity matching.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Canonicalize a URL for deduping: default scheme for bare hosts, lowercase
/// scheme/host, drop query/fragment, strip default ports and trailing slashes.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProspectorError::validation("empty_url", "empty url"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| ProspectorError::validation("invalid_host", e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ProspectorError::validation("invalid_host", "url has no host"))?
        .to_lowercase();

    let scheme = parsed.scheme().to_lowercase();
    let default_port = matches!(
        (scheme.as_str(), parsed.port()),
        (_, None) | ("http", Some(80)) | ("https", Some(443))
    );
    let netloc = if default_port {
        host
    } else {
        format!("{host}:{}", parsed.port().unwrap_or_default())
    };

    let mut path = collapse_slashes(parsed.path());
    if path != "/" {
        while path.ends_with('/') {
            path.pop();
        }
        if path.is_empty() {
            path.push('/');
        }
    }

    Ok(format!("{scheme}://{netloc}{path}"))
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Extract a normalized registrable domain from a website URL. Lowercased,
/// `www.` stripped. Returns None for unparseable input.
pub fn normalize_domain(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Map common country aliases to ISO 3166-1 alpha-2 codes, truncating anything
/// longer to two characters. Unrecognized or empty input yields None.
pub fn normalize_country(country: &str) -> Option<String> {
    let trimmed = country.trim().to_uppercase();
    if trimmed.is_empty() {
        return None;
    }
    let mapped = match trimmed.as_str() {
        "UAE" | "UNITED ARAB EMIRATES" => "AE",
        "UK" | "UNITED KINGDOM" => "GB",
        "USA" | "UNITED STATES" => "US",
        "KSA" | "SAUDI ARABIA" => "SA",
        other => other,
    };
    let code: String = mapped.chars().take(2).collect();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_name_strips_legal_suffixes() {
        assert_eq!(normalize_company_name("Acme Corp Inc"), "acme");
        assert_eq!(normalize_company_name("Globex Holdings Ltd."), "globex");
        assert_eq!(normalize_company_name("Initech GmbH"), "initech");
    }

    #[test]
    fn company_name_iterates_until_stable() {
        // "Co" then "Group" both stripped
        assert_eq!(normalize_company_name("Stark Group Co."), "stark");
    }

    #[test]
    fn company_name_normalization_is_idempotent() {
        for raw in [
            "Acme Corp Inc",
            "  Wayne   Enterprises, Ltd. ",
            "plain name",
            "Co Co Co",
        ] {
            let once = normalize_company_name(raw);
            assert_eq!(normalize_company_name(&once), once, "not idempotent: {raw}");
        }
    }

    #[test]
    fn company_name_keeps_distinct_generics_apart() {
        assert_ne!(
            normalize_company_name("First National Group"),
            normalize_company_name("Second National Group")
        );
    }

    #[test]
    fn person_name_replaces_punctuation() {
        assert_eq!(normalize_person_name("Dr. John Q. Smith"), "dr john q smith");
        assert_eq!(normalize_person_name("SMITH, JANE"), "smith jane");
    }

    #[test]
    fn url_normalization_strips_defaults() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/about/").unwrap(),
            "https://example.com/about"
        );
        assert_eq!(
            normalize_url("example.com/path//to///page").unwrap(),
            "http://example.com/path/to/page"
        );
        assert_eq!(normalize_url("http://example.com").unwrap(), "http://example.com/");
    }

    #[test]
    fn url_normalization_drops_query_and_fragment() {
        assert_eq!(
            normalize_url("https://example.com/a?b=1#frag").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn url_normalization_rejects_empty() {
        let err = normalize_url("   ").unwrap_err();
        assert_eq!(err.code(), "empty_url");
    }

    #[test]
    fn domain_strips_www() {
        assert_eq!(normalize_domain("https://www.Acme.com/about"), Some("acme.com".into()));
        assert_eq!(normalize_domain("acme.co.uk"), Some("acme.co.uk".into()));
        assert_eq!(normalize_domain(""), None);
    }

    #[test]
    fn country_aliases_map_to_codes() {
        assert_eq!(normalize_country("UAE"), Some("AE".into()));
        assert_eq!(normalize_country("uk"), Some("GB".into()));
        assert_eq!(normalize_country("USA"), Some("US".into()));
        assert_eq!(normalize_country("KSA"), Some("SA".into()));
        assert_eq!(normalize_country("DE"), Some("DE".into()));
        assert_eq!(normalize_country("Germany"), Some("GE".into()));
        assert_eq!(normalize_country(""), None);
        assert_eq!(normalize_country("12"), None);
    }
}
