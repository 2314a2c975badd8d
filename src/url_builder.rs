//! Data-request URL assembly and time-window negotiation.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::catalog::{ReviewWindow, StreamRecord};
use crate::date::RequestWindow;
use crate::error::Result;
use crate::reconcile::{ComparedStream, Provenance};
use crate::refdes::ReferenceDesignator;

/// Query flags appended to every data request.
const ANNOTATION_FLAGS: &str = "&include_annotations=true&include_provenance=true";

/// Why a requested bound was replaced by the catalog's bound, or a row was
/// skipped outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The requested begin does not fall inside the available range.
    BeginOutOfRange {
        requested: String,
        available_begin: String,
        available_end: String,
    },
    /// The requested end is not after the begin that was actually chosen.
    EndNotAfterBegin {
        requested: String,
        effective_begin: String,
    },
    /// The catalog lists no availability range for the row.
    AvailabilityUnknown,
}

/// Non-fatal diagnostic from building one request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationWarning {
    pub reference_designator: String,
    pub method: String,
    pub stream_name: String,
    pub reason: FallbackReason,
}

impl fmt::Display for NegotiationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}: ",
            self.reference_designator, self.method, self.stream_name
        )?;
        match &self.reason {
            FallbackReason::BeginOutOfRange {
                requested,
                available_begin,
                available_end,
            } => write!(
                f,
                "begin time {requested} is outside the available range \
                 {available_begin} to {available_end}; using the catalog begin"
            ),
            FallbackReason::EndNotAfterBegin {
                requested,
                effective_begin,
            } => write!(
                f,
                "end time {requested} is not after the effective begin \
                 {effective_begin}; using the catalog end"
            ),
            FallbackReason::AvailabilityUnknown => {
                write!(f, "catalog lists no availability range; row skipped")
            }
        }
    }
}

/// The URLs built for one invocation, with any per-row warnings.
#[derive(Debug, Clone, Default)]
pub struct BuiltRequests {
    pub urls: Vec<String>,
    pub warnings: Vec<NegotiationWarning>,
}

/// Build request URLs for reconciled rows.
///
/// Only Science streams confirmed by both catalogs are eligible; everything
/// else is passed over silently. Rows are processed in input order and the
/// output keeps that order.
pub fn build_checked(
    rows: &[ComparedStream],
    window: &RequestWindow,
    api_root: &str,
) -> Result<BuiltRequests> {
    let mut built = BuiltRequests::default();
    for row in rows {
        if row.source != Provenance::QcdbAndGuiCatalog || !row.is_science() {
            continue;
        }
        push_request(
            &mut built,
            api_root,
            &row.reference_designator,
            &row.method,
            &row.stream_name,
            row.begin_time.as_deref(),
            row.end_time.as_deref(),
            window,
        )?;
    }
    Ok(built)
}

/// Build request URLs straight from GUI catalog rows, with no provenance or
/// type gate. Science-only selection happens when the rows are fetched.
pub fn build_unchecked(
    rows: &[StreamRecord],
    window: &RequestWindow,
    api_root: &str,
) -> Result<BuiltRequests> {
    let mut built = BuiltRequests::default();
    for row in rows {
        push_request(
            &mut built,
            api_root,
            &row.reference_designator,
            &row.method,
            &row.stream_name,
            row.begin_time.as_deref(),
            row.end_time.as_deref(),
            window,
        )?;
    }
    Ok(built)
}

/// Build request URLs for QC rows whose instrument carries a review window.
///
/// Rows join the windows on the reference designator; Science rows without
/// one are passed over silently, and every matching method/stream row gets a
/// URL. The review span serves directly as the request bounds, so the only
/// negotiation outcome is the missing-span skip.
pub fn build_review(
    rows: &[StreamRecord],
    windows: &[ReviewWindow],
    api_root: &str,
) -> Result<BuiltRequests> {
    let by_designator: BTreeMap<&str, &ReviewWindow> = windows
        .iter()
        .map(|w| (w.designator.full.as_str(), w))
        .collect();

    let mut built = BuiltRequests::default();
    for row in rows {
        if !row.is_science() {
            continue;
        }
        let Some(window) = by_designator.get(row.reference_designator.as_str()) else {
            continue;
        };
        push_request(
            &mut built,
            api_root,
            &row.reference_designator,
            &row.method,
            &row.stream_name,
            window.begin.as_deref(),
            window.end.as_deref(),
            &RequestWindow::open(),
        )?;
    }
    Ok(built)
}

fn push_request(
    built: &mut BuiltRequests,
    api_root: &str,
    refdes: &str,
    method: &str,
    stream: &str,
    available_begin: Option<&str>,
    available_end: Option<&str>,
    window: &RequestWindow,
) -> Result<()> {
    let (Some(avail_begin), Some(avail_end)) = (available_begin, available_end) else {
        push_warning(
            built,
            refdes,
            method,
            stream,
            FallbackReason::AvailabilityUnknown,
        );
        return Ok(());
    };

    let begin = match window.begin() {
        Some(req) if avail_begin < req && req < avail_end => req.to_string(),
        Some(req) => {
            push_warning(
                built,
                refdes,
                method,
                stream,
                FallbackReason::BeginOutOfRange {
                    requested: req.to_string(),
                    available_begin: avail_begin.to_string(),
                    available_end: avail_end.to_string(),
                },
            );
            avail_begin.to_string()
        }
        None => avail_begin.to_string(),
    };

    // The end is judged against the begin that was actually chosen, not the
    // raw request, so a fallen-back begin can still reject it.
    let end = match window.end() {
        Some(req) if req > begin.as_str() => req.to_string(),
        Some(req) => {
            push_warning(
                built,
                refdes,
                method,
                stream,
                FallbackReason::EndNotAfterBegin {
                    requested: req.to_string(),
                    effective_begin: begin.clone(),
                },
            );
            avail_end.to_string()
        }
        None => avail_end.to_string(),
    };

    let path = ReferenceDesignator::parse(refdes)?.instrument_path();
    built.urls.push(format!(
        "{api_root}/{path}{method}/{stream}?beginDT={begin}&endDT={end}{ANNOTATION_FLAGS}"
    ));
    Ok(())
}

fn push_warning(
    built: &mut BuiltRequests,
    refdes: &str,
    method: &str,
    stream: &str,
    reason: FallbackReason,
) {
    let warning = NegotiationWarning {
        reference_designator: refdes.to_string(),
        method: method.to_string(),
        stream_name: stream.to_string(),
        reason,
    };
    warn!("{warning}");
    built.warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_ROOT: &str = "https://ooinet.oceanobservatories.org/api/m2m/12576/sensor/inv";
    const CTDMO: &str = "GI03FLMA-RIM01-02-CTDMOG040";

    const AVAIL_BEGIN: &str = "2014-09-13T18:45:00.000Z";
    const AVAIL_END: &str = "2015-08-14T04:45:00.000Z";

    fn compared(refdes: &str, source: Provenance, stream_type: &str) -> ComparedStream {
        let rd = ReferenceDesignator::parse(refdes).unwrap();
        ComparedStream {
            array_name: None,
            array_code: rd.array_code,
            subsite: rd.subsite,
            node: rd.node,
            sensor: rd.sensor,
            reference_designator: refdes.to_string(),
            method: "recovered_inst".to_string(),
            stream_name: "ctdmo_recovered".to_string(),
            stream_type: Some(stream_type.to_string()),
            begin_time: Some(AVAIL_BEGIN.to_string()),
            end_time: Some(AVAIL_END.to_string()),
            source,
        }
    }

    fn gui_row(refdes: &str) -> StreamRecord {
        let rd = ReferenceDesignator::parse(refdes).unwrap();
        StreamRecord {
            array_name: None,
            array_code: rd.array_code,
            subsite: rd.subsite,
            node: rd.node,
            sensor: rd.sensor,
            reference_designator: refdes.to_string(),
            method: "recovered_inst".to_string(),
            stream_name: "ctdmo_recovered".to_string(),
            stream_type: None,
            begin_time: Some(AVAIL_BEGIN.to_string()),
            end_time: Some(AVAIL_END.to_string()),
        }
    }

    fn window(begin: &str, end: &str) -> RequestWindow {
        RequestWindow::new(begin, end).unwrap()
    }

    #[test]
    fn builds_the_documented_url_shape() {
        let rows = vec![compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science")];
        let built = build_checked(&rows, &RequestWindow::open(), API_ROOT).unwrap();
        assert_eq!(built.urls.len(), 1);
        assert!(built.warnings.is_empty());
        assert_eq!(
            built.urls[0],
            format!(
                "{API_ROOT}/GI03FLMA/RIM01/02-CTDMOG040/recovered_inst/ctdmo_recovered\
                 ?beginDT={AVAIL_BEGIN}&endDT={AVAIL_END}\
                 &include_annotations=true&include_provenance=true"
            )
        );
    }

    #[test]
    fn url_query_round_trips_the_effective_bounds() {
        let rows = vec![compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science")];
        let w = window("2014-10-01T00:00:00", "2015-01-01T00:00:00");
        let built = build_checked(&rows, &w, API_ROOT).unwrap();

        let parsed = url::Url::parse(&built.urls[0]).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("beginDT".to_string(), "2014-10-01T00:00:00.000Z".to_string())));
        assert!(pairs.contains(&("endDT".to_string(), "2015-01-01T00:00:00.000Z".to_string())));
        assert!(pairs.contains(&("include_annotations".to_string(), "true".to_string())));
        assert!(pairs.contains(&("include_provenance".to_string(), "true".to_string())));
    }

    #[test]
    fn out_of_range_begin_falls_back_with_warning() {
        let rows = vec![compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science")];
        let w = window("2013-01-01T00:00:00", "");
        let built = build_checked(&rows, &w, API_ROOT).unwrap();
        assert!(built.urls[0].contains(&format!("beginDT={AVAIL_BEGIN}")));
        assert_eq!(built.warnings.len(), 1);
        assert!(matches!(
            built.warnings[0].reason,
            FallbackReason::BeginOutOfRange { .. }
        ));
    }

    #[test]
    fn end_not_after_effective_begin_falls_back() {
        let rows = vec![compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science")];
        // A valid window that sits entirely before the available range: the
        // begin falls back and the requested end now precedes it.
        let w = window("2013-01-01T00:00:00", "2014-01-01T00:00:00");
        let built = build_checked(&rows, &w, API_ROOT).unwrap();
        assert!(built.urls[0].contains(&format!("beginDT={AVAIL_BEGIN}")));
        assert!(built.urls[0].contains(&format!("endDT={AVAIL_END}")));
        assert_eq!(built.warnings.len(), 2);
        assert!(matches!(
            built.warnings[1].reason,
            FallbackReason::EndNotAfterBegin { .. }
        ));

        // An end exactly equal to the effective begin also falls back.
        let rows = vec![compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science")];
        let w = window("2013-01-01T00:00:00", "2014-09-13T18:45:00");
        let built = build_checked(&rows, &w, API_ROOT).unwrap();
        assert!(built.urls[0].contains(&format!("endDT={AVAIL_END}")));
        assert_eq!(built.warnings.len(), 2);
    }

    #[test]
    fn requested_end_may_exceed_the_available_end() {
        let rows = vec![compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science")];
        // The begin sits after the available range and falls back to the
        // catalog begin. The end is past the available end too, but ends are
        // only held against the effective begin, so it survives unclamped.
        let w = window("2016-01-01T00:00:00", "2016-06-01T00:00:00");
        let built = build_checked(&rows, &w, API_ROOT).unwrap();
        assert!(built.urls[0].contains(&format!("beginDT={AVAIL_BEGIN}")));
        assert!(built.urls[0].contains("endDT=2016-06-01T00:00:00.000Z"));
        assert_eq!(built.warnings.len(), 1);
        assert!(matches!(
            built.warnings[0].reason,
            FallbackReason::BeginOutOfRange { .. }
        ));
    }

    #[test]
    fn only_science_rows_confirmed_by_both_build_in_checked_mode() {
        let rows = vec![
            compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Engineering"),
            compared(CTDMO, Provenance::QcdbOnly, "Science"),
            compared(CTDMO, Provenance::GuiCatalogOnly, "Science"),
            compared(CTDMO, Provenance::QcdbAndGuiCatalog, "Science"),
        ];
        let built = build_checked(&rows, &RequestWindow::open(), API_ROOT).unwrap();
        assert_eq!(built.urls.len(), 1);
    }

    #[test]
    fn unchecked_mode_builds_without_provenance_gate() {
        let rows = vec![gui_row(CTDMO)];
        let built = build_unchecked(&rows, &RequestWindow::open(), API_ROOT).unwrap();
        assert_eq!(built.urls.len(), 1);
        assert!(built.urls[0].contains("/recovered_inst/ctdmo_recovered?"));
    }

    #[test]
    fn missing_availability_skips_the_row_with_warning() {
        let mut row = gui_row(CTDMO);
        row.begin_time = None;
        row.end_time = None;
        let built = build_unchecked(&[row], &RequestWindow::open(), API_ROOT).unwrap();
        assert!(built.urls.is_empty());
        assert_eq!(built.warnings.len(), 1);
        assert_eq!(
            built.warnings[0].reason,
            FallbackReason::AvailabilityUnknown
        );
    }

    fn qc_row(refdes: &str, method: &str, stream: &str, stream_type: &str) -> StreamRecord {
        let rd = ReferenceDesignator::parse(refdes).unwrap();
        StreamRecord {
            array_name: None,
            array_code: rd.array_code,
            subsite: rd.subsite,
            node: rd.node,
            sensor: rd.sensor,
            reference_designator: refdes.to_string(),
            method: method.to_string(),
            stream_name: stream.to_string(),
            stream_type: Some(stream_type.to_string()),
            begin_time: None,
            end_time: None,
        }
    }

    fn review_span(refdes: &str) -> ReviewWindow {
        ReviewWindow {
            designator: ReferenceDesignator::parse(refdes).unwrap(),
            begin: Some("2014-09-13T18:45:00.000Z".to_string()),
            end: Some("2016-07-15T00:00:00.000Z".to_string()),
            deployments: vec![1, 2],
        }
    }

    #[test]
    fn review_urls_carry_the_review_span() {
        let rows = vec![
            qc_row(CTDMO, "recovered_inst", "ctdmo_recovered", "Science"),
            qc_row(CTDMO, "recovered_host", "ctdmo_host", "Science"),
        ];
        let built = build_review(&rows, &[review_span(CTDMO)], API_ROOT).unwrap();
        // Every method/stream row of the instrument gets its own request.
        assert_eq!(built.urls.len(), 2);
        assert!(built.warnings.is_empty());
        assert_eq!(
            built.urls[0],
            format!(
                "{API_ROOT}/GI03FLMA/RIM01/02-CTDMOG040/recovered_inst/ctdmo_recovered\
                 ?beginDT=2014-09-13T18:45:00.000Z&endDT=2016-07-15T00:00:00.000Z\
                 &include_annotations=true&include_provenance=true"
            )
        );
    }

    #[test]
    fn review_urls_need_a_science_row_and_a_window() {
        const METBK: &str = "CP01CNSM-SBD11-06-METBKA000";
        let rows = vec![
            qc_row(CTDMO, "recovered_inst", "ctdmo_metadata", "Engineering"),
            qc_row(METBK, "telemetered", "metbk_dcl", "Science"),
        ];
        // A window for the engineering instrument only: the engineering row
        // fails the type gate, the science row has no window to join.
        let built = build_review(&rows, &[review_span(CTDMO)], API_ROOT).unwrap();
        assert!(built.urls.is_empty());
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn review_window_without_dates_skips_with_warning() {
        let rows = vec![qc_row(CTDMO, "recovered_inst", "ctdmo_recovered", "Science")];
        let mut window = review_span(CTDMO);
        window.begin = None;
        window.end = None;
        let built = build_review(&rows, &[window], API_ROOT).unwrap();
        assert!(built.urls.is_empty());
        assert_eq!(built.warnings.len(), 1);
        assert_eq!(
            built.warnings[0].reason,
            FallbackReason::AvailabilityUnknown
        );
    }
}
