//! Shared types for scan classification

use crate::domain::gs1;
use serde::{Deserialize, Serialize};

/// Symbology reported by the detector alongside a raw value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolFormat {
    DataMatrix,
    QrCode,
    MicroQrCode,
    RmQrCode,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Other(String),
}

/// Detector family a symbology belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorFamily {
    DataMatrix,
    QrCode,
    RetailGtin,
    Other,
}

impl std::str::FromStr for SymbolFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "data_matrix" => SymbolFormat::DataMatrix,
            "qr_code" => SymbolFormat::QrCode,
            "micro_qr_code" => SymbolFormat::MicroQrCode,
            "rm_qr_code" => SymbolFormat::RmQrCode,
            "ean_13" => SymbolFormat::Ean13,
            "ean_8" => SymbolFormat::Ean8,
            "upc_a" => SymbolFormat::UpcA,
            "upc_e" => SymbolFormat::UpcE,
            other => SymbolFormat::Other(other.to_string()),
        })
    }
}

impl SymbolFormat {
    pub fn as_str(&self) -> &str {
        match self {
            SymbolFormat::DataMatrix => "data_matrix",
            SymbolFormat::QrCode => "qr_code",
            SymbolFormat::MicroQrCode => "micro_qr_code",
            SymbolFormat::RmQrCode => "rm_qr_code",
            SymbolFormat::Ean13 => "ean_13",
            SymbolFormat::Ean8 => "ean_8",
            SymbolFormat::UpcA => "upc_a",
            SymbolFormat::UpcE => "upc_e",
            SymbolFormat::Other(s) => s,
        }
    }

    pub fn family(&self) -> DetectorFamily {
        match self {
            SymbolFormat::DataMatrix => DetectorFamily::DataMatrix,
            SymbolFormat::QrCode | SymbolFormat::MicroQrCode | SymbolFormat::RmQrCode => {
                DetectorFamily::QrCode
            }
            SymbolFormat::Ean13 | SymbolFormat::Ean8 | SymbolFormat::UpcA | SymbolFormat::UpcE => {
                DetectorFamily::RetailGtin
            }
            SymbolFormat::Other(_) => DetectorFamily::Other,
        }
    }

    /// EAN/UPC symbologies whose value is itself a GTIN
    #[inline]
    pub fn is_retail_gtin(&self) -> bool {
        self.family() == DetectorFamily::RetailGtin
    }
}

impl std::fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw value read by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDetection {
    pub value: String,
    pub format: Option<SymbolFormat>,
}

impl RawDetection {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), format: None }
    }

    pub fn with_format(mut self, format: SymbolFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// GTIN carried directly by a retail linear symbology, padded to 14 digits
    pub fn retail_gtin(&self) -> Option<String> {
        match &self.format {
            Some(format) if format.is_retail_gtin() => gs1::normalize_retail_gtin(&self.value),
            _ => None,
        }
    }
}

/// Identifier type assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeType {
    AzCode,
    Sgtin,
    Lgtin,
    Gtin,
    Unknown,
}

impl CodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::AzCode => "AZ_CODE",
            CodeType::Sgtin => "SGTIN",
            CodeType::Lgtin => "LGTIN",
            CodeType::Gtin => "GTIN",
            CodeType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for CodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one raw string
///
/// A valid result carries the normalized payload for its type; an invalid one
/// echoes the raw input unchanged with type `UNKNOWN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedCode {
    pub is_valid: bool,
    pub code: String,
    #[serde(rename = "type")]
    pub code_type: CodeType,
}

impl ClassifiedCode {
    pub fn valid(code: impl Into<String>, code_type: CodeType) -> Self {
        Self { is_valid: true, code: code.into(), code_type }
    }

    pub fn unknown(raw: &str) -> Self {
        Self { is_valid: false, code: raw.to_string(), code_type: CodeType::Unknown }
    }
}

/// GTIN and serial recovered from a classified code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedIdentity {
    pub gtin: Option<String>,
    pub serial: Option<String>,
}

impl ExtractedIdentity {
    pub fn from_code(classified: &ClassifiedCode) -> Self {
        match classified.code_type {
            CodeType::Sgtin => Self {
                gtin: gs1::extract_gtin(&classified.code),
                serial: gs1::extract_serial(&classified.code),
            },
            CodeType::Lgtin => Self { gtin: gs1::extract_gtin(&classified.code), serial: None },
            CodeType::Gtin => Self { gtin: Some(classified.code.clone()), serial: None },
            CodeType::AzCode | CodeType::Unknown => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_format_from_str() {
        assert_eq!("ean_13".parse::<SymbolFormat>().unwrap(), SymbolFormat::Ean13);
        assert_eq!("qr_code".parse::<SymbolFormat>().unwrap(), SymbolFormat::QrCode);
        assert!(matches!(
            "code_128".parse::<SymbolFormat>().unwrap(),
            SymbolFormat::Other(ref s) if s == "code_128"
        ));
    }

    #[test]
    fn test_symbol_format_family() {
        assert_eq!(SymbolFormat::RmQrCode.family(), DetectorFamily::QrCode);
        assert!(SymbolFormat::UpcE.is_retail_gtin());
        assert!(!SymbolFormat::DataMatrix.is_retail_gtin());
        assert_eq!(SymbolFormat::Other("code_39".into()).family(), DetectorFamily::Other);
    }

    #[test]
    fn test_retail_gtin_requires_retail_format() {
        let plain = RawDetection::new("4006381333931");
        assert_eq!(plain.retail_gtin(), None);

        let ean = RawDetection::new("4006381333931").with_format(SymbolFormat::Ean13);
        assert_eq!(ean.retail_gtin().as_deref(), Some("04006381333931"));
    }

    #[test]
    fn test_code_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&ClassifiedCode::valid("x", CodeType::AzCode)).unwrap();
        assert_eq!(json, r#"{"is_valid":true,"code":"x","type":"AZ_CODE"}"#);
    }

    #[test]
    fn test_extracted_identity_per_type() {
        let sgtin = ClassifiedCode::valid("011234567890123421SERIAL123", CodeType::Sgtin);
        let id = ExtractedIdentity::from_code(&sgtin);
        assert_eq!(id.gtin.as_deref(), Some("12345678901234"));
        assert_eq!(id.serial.as_deref(), Some("SERIAL123"));

        let lgtin = ClassifiedCode::valid("011234567890123410LOT1", CodeType::Lgtin);
        let id = ExtractedIdentity::from_code(&lgtin);
        assert_eq!(id.gtin.as_deref(), Some("12345678901234"));
        assert_eq!(id.serial, None);

        let gtin = ClassifiedCode::valid("12345678901234", CodeType::Gtin);
        assert_eq!(ExtractedIdentity::from_code(&gtin).gtin.as_deref(), Some("12345678901234"));

        let unknown = ClassifiedCode::unknown("011234567890123421SERIAL123");
        assert_eq!(ExtractedIdentity::from_code(&unknown), ExtractedIdentity::default());
    }
}
