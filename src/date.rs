use chrono::NaiveDateTime;

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Validate a user-entered datetime and suffix it for the M2M API.
///
/// Accepts strict `YYYY-MM-DDTHH:MM:SS` only (the re-rendered form must
/// match the input, so shortened components are rejected) and returns the
/// instant with the `.000Z` suffix the API and the catalogs use. Empty
/// input means "no bound" and maps to `None`.
pub fn format_date(date_text: &str) -> Result<Option<String>> {
    let t = date_text.trim();
    if t.is_empty() {
        return Ok(None);
    }
    let parsed = NaiveDateTime::parse_from_str(t, DATE_FORMAT)
        .map_err(|_| Error::InvalidDateFormat(date_text.to_string()))?;
    if parsed.format(DATE_FORMAT).to_string() != t {
        return Err(Error::InvalidDateFormat(date_text.to_string()));
    }
    Ok(Some(format!("{t}.000Z")))
}

/// Requested time bounds for a batch of data requests.
///
/// Holds already-validated `....000Z` strings; `None` means "use the full
/// range the catalog advertises". The only constructors are [`new`] and
/// [`open`], so a held window always satisfies the ordering checks. Catalog
/// timestamps share the fixed-width rendering, so string order is
/// chronological order everywhere these are compared.
///
/// [`new`]: RequestWindow::new
/// [`open`]: RequestWindow::open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestWindow {
    begin: Option<String>,
    end: Option<String>,
}

impl RequestWindow {
    /// Validate raw begin/end input.
    ///
    /// An end date requires a begin date, and the begin must be strictly
    /// earlier than the end. Both are checked here, before any catalog is
    /// fetched.
    pub fn new(begin: &str, end: &str) -> Result<Self> {
        let begin = format_date(begin)?;
        let end = format_date(end)?;
        if end.is_some() && begin.is_none() {
            return Err(Error::InvalidInput(
                "an end date requires a begin date".to_string(),
            ));
        }
        if let (Some(b), Some(e)) = (&begin, &end) {
            if b >= e {
                return Err(Error::InvalidInput(format!(
                    "end date {e} is not after begin date {b}"
                )));
            }
        }
        Ok(Self { begin, end })
    }

    /// A window with no explicit bounds.
    pub fn open() -> Self {
        Self::default()
    }

    /// Requested begin bound, `.000Z` suffixed.
    pub fn begin(&self) -> Option<&str> {
        self.begin.as_deref()
    }

    /// Requested end bound, `.000Z` suffixed.
    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }
}
