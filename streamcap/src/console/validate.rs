//! Console input validation.

use thiserror::Error;

use crate::database::repositories::SortKey;

/// Site slugs the console accepts.
pub const VALID_SITES: &[&str] = &["cb", "mfc", "sc"];

/// Full site name for a slug.
pub fn site_name(slug: &str) -> Option<&'static str> {
    match slug {
        "cb" => Some("Chaturbate"),
        "mfc" => Some("MyFreeCams"),
        "sc" => Some("StripChat"),
        _ => None,
    }
}

/// Validation failures, each rendered as one diagnostic line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("command is missing a model name (example: get kandy cb)")]
    MissingInput,
    #[error("model name {0:?} contains invalid characters; use lowercase letters, digits, and underscore")]
    InvalidChars(String),
    #[error("unknown streaming site {0:?}; sites: cb, mfc, sc")]
    UnknownSite(String),
    #[error("add a streamer site to the command; sites: cb, mfc, sc")]
    MissingSite,
    #[error("include a sort option with the command: name, date, num")]
    BadSort,
}

/// A validated `<name> [site]` argument pair.
#[derive(Debug, PartialEq, Eq)]
pub struct TargetArg {
    pub name: String,
    pub slug: String,
    pub site: String,
}

pub fn validate_name(name: &str) -> Result<(), CliError> {
    if name.is_empty() {
        return Err(CliError::MissingInput);
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(CliError::InvalidChars(name.to_string()));
    }
    Ok(())
}

/// Parse `<name> [site]`, falling back to the prompt's site when set.
pub fn parse_target(args: &[&str], prompt_slug: Option<&str>) -> Result<TargetArg, CliError> {
    let name = *args.first().ok_or(CliError::MissingInput)?;
    validate_name(name)?;

    let slug = match args.get(1) {
        Some(slug) => *slug,
        None => prompt_slug.ok_or(CliError::MissingSite)?,
    };
    let site = site_name(slug).ok_or_else(|| CliError::UnknownSite(slug.to_string()))?;

    Ok(TargetArg {
        name: name.to_string(),
        slug: slug.to_string(),
        site: site.to_string(),
    })
}

/// Parse the sort option of the `cap` / `offline` listing commands.
pub fn parse_sort(args: &[&str]) -> Result<SortKey, CliError> {
    let key = args.first().ok_or(CliError::BadSort)?;
    SortKey::parse(key).ok_or(CliError::BadSort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercase_digits_underscore() {
        assert!(validate_name("kandy_22").is_ok());
        assert_eq!(
            validate_name("Kandy"),
            Err(CliError::InvalidChars("Kandy".to_string()))
        );
        assert_eq!(
            validate_name("kandy!"),
            Err(CliError::InvalidChars("kandy!".to_string()))
        );
        assert_eq!(validate_name(""), Err(CliError::MissingInput));
    }

    #[test]
    fn explicit_site_beats_prompt() {
        let arg = parse_target(&["alice", "sc"], Some("cb")).unwrap();
        assert_eq!(arg.site, "StripChat");
    }

    #[test]
    fn prompt_site_fills_in() {
        let arg = parse_target(&["alice"], Some("cb")).unwrap();
        assert_eq!(arg.slug, "cb");
        assert_eq!(arg.site, "Chaturbate");
    }

    #[test]
    fn no_site_anywhere_is_an_error() {
        assert_eq!(parse_target(&["alice"], None), Err(CliError::MissingSite));
    }

    #[test]
    fn unknown_site_is_an_error() {
        assert_eq!(
            parse_target(&["alice", "xyz"], None),
            Err(CliError::UnknownSite("xyz".to_string()))
        );
    }

    #[test]
    fn sort_options() {
        assert_eq!(parse_sort(&["name"]).unwrap(), SortKey::Name);
        assert_eq!(parse_sort(&["date"]).unwrap(), SortKey::Date);
        assert_eq!(parse_sort(&["num"]).unwrap(), SortKey::Num);
        assert_eq!(parse_sort(&["size"]), Err(CliError::BadSort));
        assert_eq!(parse_sort(&[]), Err(CliError::BadSort));
    }
}
