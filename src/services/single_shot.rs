//! Single-shot decoding - one frame or image, no batching
//!
//! Detections from a still image are tried Data Matrix first, then the QR
//! family, then everything else. The first valid code wins and can be turned
//! into a product page link.

use crate::domain::types::{ClassifiedCode, DetectorFamily, RawDetection};
use crate::services::classifier::Classifier;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

/// Path prefix of product pages
pub const PRODUCT_PATH: &str = "/product/";

/// URI component encoding: everything but `A-Za-z0-9-_.!~*'()` is escaped
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn family_rank(detection: &RawDetection) -> u8 {
    match detection.format.as_ref().map(|f| f.family()) {
        Some(DetectorFamily::DataMatrix) => 0,
        Some(DetectorFamily::QrCode) => 1,
        _ => 2,
    }
}

/// First detection that classifies as valid, Data Matrix before QR
///
/// Detections keep their relative order within a family.
pub fn first_valid_code(classifier: &Classifier, detections: &[RawDetection]) -> Option<ClassifiedCode> {
    let mut ordered: Vec<&RawDetection> = detections.iter().collect();
    ordered.sort_by_key(|d| family_rank(d));

    let found = ordered.into_iter().map(|d| classifier.classify(&d.value)).find(|c| c.is_valid);
    debug!(
        detections = %detections.len(),
        found = ?found.as_ref().map(|c| c.code_type.as_str()),
        "single_shot_classified"
    );
    found
}

/// Relative product page link for a code, percent-encoding it as one URI component
pub fn product_link(code: &str) -> String {
    format!("{}{}", PRODUCT_PATH, utf8_percent_encode(code, URI_COMPONENT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{CodeType, SymbolFormat};

    #[test]
    fn test_data_matrix_preferred_over_qr() {
        let classifier = Classifier::default();
        let detections = vec![
            RawDetection::new("https://amazon.com/01/12345678901234").with_format(SymbolFormat::QrCode),
            RawDetection::new("011234567890123421SERIAL123").with_format(SymbolFormat::DataMatrix),
        ];

        let code = first_valid_code(&classifier, &detections).unwrap();
        assert_eq!(code.code_type, CodeType::Sgtin);
    }

    #[test]
    fn test_invalid_data_matrix_falls_through_to_qr() {
        let classifier = Classifier::default();
        let detections = vec![
            RawDetection::new("garbage").with_format(SymbolFormat::DataMatrix),
            RawDetection::new("https://www.amazon.com/01/12345678901234/10/LOT7")
                .with_format(SymbolFormat::QrCode),
        ];

        let code = first_valid_code(&classifier, &detections).unwrap();
        assert_eq!(code.code, "011234567890123410LOT7");
        assert_eq!(code.code_type, CodeType::Lgtin);
    }

    #[test]
    fn test_no_valid_code() {
        let classifier = Classifier::default();
        let detections = vec![RawDetection::new("hello").with_format(SymbolFormat::QrCode)];
        assert!(first_valid_code(&classifier, &detections).is_none());
        assert!(first_valid_code(&classifier, &[]).is_none());
    }

    #[test]
    fn test_product_link_encodes_code() {
        assert_eq!(product_link("011234567890123421SERIAL123"), "/product/011234567890123421SERIAL123");
        assert_eq!(product_link("AZ:ABC/DEF 1"), "/product/AZ%3AABC%2FDEF%201");
        assert_eq!(
            product_link("AZ:ABCDEFGHIJ0123456789ABCDEF"),
            "/product/AZ%3AABCDEFGHIJ0123456789ABCDEF"
        );
        assert_eq!(product_link("a-b_c.d!e~f*g'h(i)"), "/product/a-b_c.d!e~f*g'h(i)");
        assert_eq!(product_link("a?b#c&d=e+f"), "/product/a%3Fb%23c%26d%3De%2Bf");
    }
}
