//! Loading of the plain-text lists the validator works from: input addresses,
//! disposable domains and well-known provider domains.

use email_vetter_core::{AppError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One domain per line; blank lines and `#` comments are skipped and
/// entries are lower-cased.
pub fn parse_domain_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_end_matches('.').to_lowercase())
        .collect()
}

pub fn load_domain_list(path: &Path) -> Result<HashSet<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::Initialization(format!("Cannot read list '{}': {}", path.display(), e))
    })?;
    let domains = parse_domain_list(&content);
    tracing::info!("Loaded {} entries from {}", domains.len(), path.display());
    Ok(domains)
}

/// A missing path yields an empty list with a warning naming `what`.
pub fn load_optional_list(path: Option<&Path>, what: &str) -> Result<HashSet<String>> {
    match path {
        Some(path) => load_domain_list(path),
        None => {
            tracing::warn!("No {} list configured; continuing without one", what);
            Ok(HashSet::new())
        }
    }
}

/// Input addresses, one per line, trimmed, blanks skipped. Order is kept;
/// de-duplication happens in the dispatcher.
pub fn read_email_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::Initialization(format!("Cannot read input '{}': {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_comments_and_case() {
        let set = parse_domain_list("# disposable\nTempMail.com\n\n  mailinator.com  \nyopmail.com.\n");
        assert_eq!(set.len(), 3);
        assert!(set.contains("tempmail.com"));
        assert!(set.contains("yopmail.com"));
    }

    #[test]
    fn reads_input_preserving_order_and_spelling() {
        let path = std::env::temp_dir().join(format!("email-vetter-input-{}.txt", std::process::id()));
        let mut f = fs::File::create(&path).unwrap();
        write!(f, "B@x.com\n\n  a@y.com \nb@x.com\n").unwrap();
        drop(f);

        let emails = read_email_list(&path).unwrap();
        assert_eq!(emails, vec!["B@x.com", "a@y.com", "b@x.com"]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_initialization_error() {
        let err = load_domain_list(Path::new("/nope/disposable.txt")).unwrap_err();
        assert!(matches!(err, AppError::Initialization(_)));
        assert!(load_optional_list(None, "disposable").unwrap().is_empty());
    }
}
