//! Code classification for raw scanner strings
//!
//! Two grammars are applied:
//! - Data Matrix element strings: `AZ:` codes, SGTIN (`01..21..`), LGTIN (`01..10..`)
//! - GS1 SmartLink URLs on an allow-listed domain, whose path encodes the
//!   same element strings as `/01/<gtin>/21/<serial>` or `/01/<gtin>/10/<lot>`
//!
//! Classification is total: anything that matches neither grammar comes back
//! as `UNKNOWN` with the raw input echoed unchanged.

use crate::domain::gs1::{self, Qualifier};
use crate::domain::types::{ClassifiedCode, CodeType};
use crate::infra::config::Config;
use reqwest::Url;
use tracing::trace;

/// SmartLink domains accepted when no configuration overrides them
pub const DEFAULT_SMARTLINK_DOMAINS: [&str; 2] = ["amazon.com", "transparency.com"];

/// Classify against the Data Matrix grammar only
///
/// Rules are tried in fixed order (AZ code, SGTIN, LGTIN) and the first match
/// wins. Matching is anchored at the start; trailing content is dropped from
/// the normalized code.
pub fn classify_data_matrix(raw: &str) -> ClassifiedCode {
    if let Some(az) = gs1::match_az_code(raw) {
        return ClassifiedCode::valid(az, CodeType::AzCode);
    }
    if let Some(m) = gs1::match_element(raw, Qualifier::Serial) {
        return ClassifiedCode::valid(m.element, CodeType::Sgtin);
    }
    if let Some(m) = gs1::match_element(raw, Qualifier::Lot) {
        return ClassifiedCode::valid(m.element, CodeType::Lgtin);
    }
    ClassifiedCode::unknown(raw)
}

/// Classifies raw strings into typed, normalized product codes
#[derive(Debug, Clone)]
pub struct Classifier {
    smartlink_domains: Vec<String>,
}

impl Classifier {
    /// Create a classifier accepting SmartLinks on the given domains
    ///
    /// A domain also covers its subdomains (`amazon.com` accepts `www.amazon.com`).
    pub fn new<I, S>(smartlink_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let smartlink_domains = smartlink_domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { smartlink_domains }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.smartlink_domains())
    }

    pub fn smartlink_domains(&self) -> &[String] {
        &self.smartlink_domains
    }

    /// Classify one raw string
    ///
    /// The Data Matrix grammar is tried first: an `AZ:` code is also a
    /// syntactically valid URL, so SmartLink parsing must not shadow it.
    pub fn classify(&self, raw: &str) -> ClassifiedCode {
        let data_matrix = classify_data_matrix(raw);
        if data_matrix.is_valid {
            return data_matrix;
        }
        self.classify_smartlink(raw)
    }

    /// Classify against the SmartLink grammar
    ///
    /// Input that is not an absolute URL falls back to the Data Matrix grammar.
    pub fn classify_smartlink(&self, raw: &str) -> ClassifiedCode {
        let Ok(url) = Url::parse(raw) else {
            return classify_data_matrix(raw);
        };

        // Only schemes with a tuple origin (http, https, ws, ...) can match
        if !url.origin().is_tuple() {
            trace!(raw = %raw, scheme = %url.scheme(), "smartlink_opaque_origin");
            return ClassifiedCode::unknown(raw);
        }
        let Some(host) = url.host_str() else {
            trace!(raw = %raw, "smartlink_no_host");
            return ClassifiedCode::unknown(raw);
        };
        if !self.is_smartlink_host(host) {
            trace!(host = %host, "smartlink_domain_rejected");
            return ClassifiedCode::unknown(raw);
        }

        let path = url.path();
        if let Some((gtin, Some(serial))) = gs1::find_path_element(path, Some(Qualifier::Serial)) {
            return ClassifiedCode::valid(gs1::format_sgtin(gtin, serial), CodeType::Sgtin);
        }
        if let Some((gtin, Some(lot))) = gs1::find_path_element(path, Some(Qualifier::Lot)) {
            return ClassifiedCode::valid(gs1::format_lgtin(gtin, lot), CodeType::Lgtin);
        }
        if let Some((gtin, _)) = gs1::find_path_element(path, None) {
            return ClassifiedCode::valid(gtin, CodeType::Gtin);
        }

        trace!(host = %host, path = %path, "smartlink_path_unmatched");
        ClassifiedCode::unknown(raw)
    }

    fn is_smartlink_host(&self, host: &str) -> bool {
        self.smartlink_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_SMARTLINK_DOMAINS)
    }
}
