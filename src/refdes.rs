use crate::error::{Error, Result};

/// A decomposed OOI reference designator.
///
/// Reference designators name one instrument as four hyphen-delimited
/// segments, e.g. `GI03FLMA-RIM01-02-CTDMOG040`: subsite, node, and a
/// two-part sensor. The first two characters of the subsite are the array
/// code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDesignator {
    pub full: String,
    pub array_code: String,
    pub subsite: String,
    pub node: String,
    pub sensor: String,
}

impl ReferenceDesignator {
    pub fn parse(refdes: &str) -> Result<Self> {
        let parts: Vec<&str> = refdes.split('-').collect();
        if parts.len() != 4 {
            return Err(Error::InvalidInput(format!(
                "reference designator must have 4 hyphen-delimited segments: {refdes}"
            )));
        }
        let array_code = refdes.get(0..2).ok_or_else(|| {
            Error::InvalidInput(format!("reference designator too short: {refdes}"))
        })?;
        Ok(Self {
            full: refdes.to_string(),
            array_code: array_code.to_string(),
            subsite: parts[0].to_string(),
            node: parts[1].to_string(),
            sensor: format!("{}-{}", parts[2], parts[3]),
        })
    }

    /// Instrument path segment of a data-request URL.
    ///
    /// Keeps the trailing slash: the delivery method is concatenated flush
    /// against it when the full URL is assembled.
    pub fn instrument_path(&self) -> String {
        format!("{}/{}/{}/", self.subsite, self.node, self.sensor)
    }
}
