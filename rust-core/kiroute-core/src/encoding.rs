//! # Body Encoders
//!
//! XML and CSV response bodies. Encoding happens fully in memory so a failure
//! is reported before anything reaches the client.

use crate::error::{Error, Result};
use serde::Serialize;

/// Serialize a value as an XML document
///
/// Structs become an element named after the type, fields become child
/// elements.
///
/// # Errors
///
/// Returns `Error::Encode` if `value` cannot be represented as XML.
pub fn to_xml_body<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut body = quick_xml::se::to_string(value).map_err(|e| Error::Encode {
        format: "XML",
        reason: e.to_string(),
    })?;
    body.push('\n');
    Ok(body.into_bytes())
}

/// Write records as CSV, one line per record
///
/// # Errors
///
/// Returns `Error::Encode` if records have different lengths.
pub fn to_csv_body<R, F>(records: R) -> Result<Vec<u8>>
where
    R: IntoIterator,
    R::Item: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let encode_error = |reason: String| Error::Encode { format: "CSV", reason };

    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.write_record(record).map_err(|e| encode_error(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| encode_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Item {
        name: String,
        qty: u32,
    }

    #[test]
    fn test_xml_struct() {
        let body = to_xml_body(&Item {
            name: "apple".to_string(),
            qty: 3,
        })
        .unwrap();
        let xml = String::from_utf8(body).unwrap();
        assert!(xml.starts_with("<Item>"));
        assert!(xml.contains("<name>apple</name><qty>3</qty>"));
        assert!(xml.ends_with("</Item>\n"));
    }

    #[test]
    fn test_csv_quotes_fields() {
        let body = to_csv_body([vec!["id", "note"], vec!["1", "a, b"]]).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "id,note\n1,\"a, b\"\n");
    }

    #[test]
    fn test_csv_unequal_lengths() {
        let err = to_csv_body([vec!["a", "b"], vec!["c"]]).unwrap_err();
        assert!(matches!(err, Error::Encode { format: "CSV", .. }));
    }
}
