//! Registry of supported card service deployments

use crate::error::CardServiceError;
use url::Url;

// ============================================================================
// Registry Tables
// ============================================================================

/// Deployments following the standard path layout, keyed by institution name
const TEMPLATED: &[(&str, &str)] = &[
    ("Aachen", "https://kartenservice.stw.rwth-aachen.de/"),
    ("Augsburg", "https://kartenservice.studentenwerk-augsburg.de/"),
    ("Dresden", "https://kartenservice.studentenwerk-dresden.de/"),
    ("Freiberg", "https://kartenservice.studentenwerk-freiberg.de/"),
    ("Freiburg", "https://www.swfr.de/"),
    ("Paderborn", "https://kartenservice.studentenwerk-pb.de/"),
    ("Stuttgart", "https://cardservice-sws.cpwas.de/"),
];

/// Deployment whose URLs are listed explicitly
struct Override {
    name: &'static str,
    homepage: &'static str,
    tla: &'static str,
    kasvc: &'static str,
}

const OVERRIDES: &[Override] = &[
    // homepage at the domain root
    Override {
        name: "Leipzig",
        homepage: "https://kartenservice.studentenwerk-leipzig.de/",
        tla: "https://kartenservice.studentenwerk-leipzig.de/TL1/TLA",
        kasvc: "https://kartenservice.studentenwerk-leipzig.de/TL1/TLM/KASVC",
    },
    // homepage below an extra path prefix
    Override {
        name: "Mannheim",
        homepage: "https://app.stw-ma.de/nkp/KartenService",
        tla: "https://app.stw-ma.de/TL1/TLA",
        kasvc: "https://app.stw-ma.de/TL1/TLM/KASVC",
    },
];

const HOMEPAGE_PATH: &str = "KartenService";
const TLA_PATH: &str = "TL1/TLA";
const KASVC_PATH: &str = "TL1/TLM/KASVC";

/// Names of every supported institution
pub fn supported_locations() -> impl Iterator<Item = &'static str> {
    TEMPLATED
        .iter()
        .map(|(name, _)| *name)
        .chain(OVERRIDES.iter().map(|o| o.name))
}

// ============================================================================
// URL Set
// ============================================================================

/// The three base URLs of one deployment
///
/// All three always belong to the same deployment; a set is either resolved
/// from the registry or derived from a single base with [`UrlSet::templated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSet {
    /// Web app homepage, serves `scripts/dataprovider.js`
    pub homepage: Url,
    /// Token-auth base (`.../TL1/TLA`)
    pub tla: Url,
    /// Card-service base (`.../TL1/TLM/KASVC`)
    pub kasvc: Url,
}

impl UrlSet {
    /// Resolve the URL set of a registered institution
    ///
    /// # Errors
    ///
    /// Returns `CardServiceError::UnsupportedLocation` if the name is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use kartenservice_client::UrlSet;
    ///
    /// let urls = UrlSet::for_location("Dresden").unwrap();
    /// assert_eq!(
    ///     urls.kasvc.as_str(),
    ///     "https://kartenservice.studentenwerk-dresden.de/TL1/TLM/KASVC"
    /// );
    /// ```
    pub fn for_location(name: &str) -> Result<Self, CardServiceError> {
        if let Some((_, base)) = TEMPLATED.iter().find(|(n, _)| *n == name) {
            return Self::templated(base);
        }
        if let Some(o) = OVERRIDES.iter().find(|o| o.name == name) {
            return Ok(Self {
                homepage: Url::parse(o.homepage)?,
                tla: Url::parse(o.tla)?,
                kasvc: Url::parse(o.kasvc)?,
            });
        }
        Err(CardServiceError::UnsupportedLocation(name.to_string()))
    }

    /// Derive a URL set from a base URL using the standard path layout
    ///
    /// Useful for deployments missing from the registry and for mock servers.
    pub fn templated(base: &str) -> Result<Self, CardServiceError> {
        let mut base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(CardServiceError::InvalidBaseUrl(base.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            homepage: base.join(HOMEPAGE_PATH)?,
            tla: base.join(TLA_PATH)?,
            kasvc: base.join(KASVC_PATH)?,
        })
    }

    /// URL of the script carrying the application credentials
    pub fn script_url(&self) -> Result<Url, CardServiceError> {
        append_segments(&self.homepage, &["scripts", "dataprovider.js"])
    }
}

/// Append path segments to a base URL, dropping a trailing empty segment first
pub(crate) fn append_segments(base: &Url, segments: &[&str]) -> Result<Url, CardServiceError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| CardServiceError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // **Feature: location-registry, Property 1: Every entry resolves to one deployment**
    #[test]
    fn test_every_location_resolves_to_one_host() {
        for name in supported_locations() {
            let urls = UrlSet::for_location(name).unwrap();
            let host = urls.homepage.host_str();
            assert!(host.is_some(), "{name} has no host");
            assert_eq!(urls.tla.host_str(), host, "{name} tla host differs");
            assert_eq!(urls.kasvc.host_str(), host, "{name} kasvc host differs");
            assert_eq!(urls.homepage.scheme(), "https");
        }
    }

    #[test]
    fn test_templated_layout() {
        let urls = UrlSet::for_location("Aachen").unwrap();
        assert_eq!(
            urls.homepage.as_str(),
            "https://kartenservice.stw.rwth-aachen.de/KartenService"
        );
        assert_eq!(urls.tla.as_str(), "https://kartenservice.stw.rwth-aachen.de/TL1/TLA");
        assert_eq!(
            urls.kasvc.as_str(),
            "https://kartenservice.stw.rwth-aachen.de/TL1/TLM/KASVC"
        );
    }

    #[test]
    fn test_overrides_bypass_template() {
        let leipzig = UrlSet::for_location("Leipzig").unwrap();
        assert_eq!(
            leipzig.script_url().unwrap().as_str(),
            "https://kartenservice.studentenwerk-leipzig.de/scripts/dataprovider.js"
        );

        let mannheim = UrlSet::for_location("Mannheim").unwrap();
        assert_eq!(
            mannheim.script_url().unwrap().as_str(),
            "https://app.stw-ma.de/nkp/KartenService/scripts/dataprovider.js"
        );
        assert_eq!(mannheim.kasvc.as_str(), "https://app.stw-ma.de/TL1/TLM/KASVC");
    }

    #[test]
    fn test_unknown_location() {
        let err = UrlSet::for_location("Atlantis").unwrap_err();
        assert!(matches!(err, CardServiceError::UnsupportedLocation(ref n) if n == "Atlantis"));
    }

    #[test]
    fn test_location_names_are_case_sensitive() {
        assert!(UrlSet::for_location("dresden").is_err());
    }

    #[test]
    fn test_templated_rejects_non_base_url() {
        let err = UrlSet::templated("mailto:someone@example.com").unwrap_err();
        assert!(matches!(err, CardServiceError::InvalidBaseUrl(_)));
    }

    // **Feature: location-registry, Property 2: Templated sets derive from base**
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_templated_with_and_without_trailing_slash(
            host in "[a-z]{3,10}",
            port in 1000u16..10000u16,
            slash in prop::bool::ANY,
        ) {
            let base = format!("http://{}:{}{}", host, port, if slash { "/" } else { "" });
            let urls = UrlSet::templated(&base).unwrap();

            prop_assert_eq!(urls.homepage.path(), "/KartenService");
            prop_assert_eq!(urls.tla.path(), "/TL1/TLA");
            prop_assert_eq!(urls.kasvc.path(), "/TL1/TLM/KASVC");
            prop_assert_eq!(urls.kasvc.port(), Some(port));
            let script = urls.script_url().unwrap();
            prop_assert_eq!(script.path(), "/KartenService/scripts/dataprovider.js");
        }
    }
}
