//! Application of selection criteria to catalog rows.

use crate::catalog::{ReviewWindow, StreamRecord};
use crate::criteria::SelectionCriteria;

/// Filter catalog rows against the selection criteria.
///
/// Array code, subsite, node, and delivery method are narrowing membership
/// tests; an empty list skips its step. Instrument tokens are substring
/// matches against the sensor field, OR-ed together, so a token that
/// matches nothing simply contributes nothing. Source row order is
/// preserved throughout.
///
/// `methods` is the expanded physical method set, not the logical tokens
/// still sitting in `criteria.delivery_methods`.
pub fn filter_streams(
    records: &[StreamRecord],
    criteria: &SelectionCriteria,
    methods: &[String],
) -> Vec<StreamRecord> {
    records
        .iter()
        .filter(|r| matches_selection(&r.array_code, &r.subsite, &r.node, &r.sensor, criteria))
        .filter(|r| methods.is_empty() || methods.contains(&r.method))
        .cloned()
        .collect()
}

/// Filter review windows against the selection criteria.
///
/// Windows are keyed by instrument alone, so the method dimension does not
/// apply; the other criteria read off the decomposed designator.
pub fn filter_review_windows(
    windows: &[ReviewWindow],
    criteria: &SelectionCriteria,
) -> Vec<ReviewWindow> {
    windows
        .iter()
        .filter(|w| {
            matches_selection(
                &w.designator.array_code,
                &w.designator.subsite,
                &w.designator.node,
                &w.designator.sensor,
                criteria,
            )
        })
        .cloned()
        .collect()
}

fn matches_selection(
    array_code: &str,
    subsite: &str,
    node: &str,
    sensor: &str,
    criteria: &SelectionCriteria,
) -> bool {
    (criteria.arrays.is_empty() || criteria.arrays.iter().any(|a| a == array_code))
        && (criteria.subsites.is_empty() || criteria.subsites.iter().any(|s| s == subsite))
        && (criteria.nodes.is_empty() || criteria.nodes.iter().any(|n| n == node))
        && (criteria.instruments.is_empty()
            || criteria.instruments.iter().any(|t| sensor.contains(t.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refdes::ReferenceDesignator;

    fn record(refdes: &str, method: &str, stream: &str) -> StreamRecord {
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
            stream_type: None,
            begin_time: None,
            end_time: None,
        }
    }

    fn fixture() -> Vec<StreamRecord> {
        vec![
            record("GI03FLMA-RIM01-02-CTDMOG040", "recovered_inst", "ctdmo_recovered"),
            record("GI03FLMA-RIM01-02-FLORTD000", "recovered_host", "flort_recovered"),
            record("CP01CNSM-SBD11-06-METBKA000", "telemetered", "metbk_dcl"),
            record("CP01CNSM-RID27-03-CTDBPC000", "streamed", "ctdbp_streamed"),
        ]
    }

    fn criteria_with(instruments: &[&str]) -> SelectionCriteria {
        SelectionCriteria {
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            ..SelectionCriteria::default()
        }
    }

    #[test]
    fn empty_criteria_keep_everything() {
        let records = fixture();
        let kept = filter_streams(&records, &SelectionCriteria::default(), &[]);
        assert_eq!(kept, records);
    }

    #[test]
    fn array_and_node_narrow_in_sequence() {
        let records = fixture();
        let criteria = SelectionCriteria {
            arrays: vec!["CP".to_string()],
            nodes: vec!["SBD11".to_string()],
            ..SelectionCriteria::default()
        };
        let kept = filter_streams(&records, &criteria, &[]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].reference_designator, "CP01CNSM-SBD11-06-METBKA000");
    }

    #[test]
    fn methods_restrict_when_given() {
        let records = fixture();
        let methods = vec!["recovered_inst".to_string(), "recovered_host".to_string()];
        let kept = filter_streams(&records, &SelectionCriteria::default(), &methods);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.method.starts_with("recovered")));
    }

    #[test]
    fn instrument_tokens_union_and_preserve_order() {
        let records = fixture();
        let kept = filter_streams(&records, &criteria_with(&["FLOR", "CTD"]), &[]);
        // Partial matches across both tokens, in source order, no duplicates.
        let names: Vec<_> = kept.iter().map(|r| r.sensor.as_str()).collect();
        assert_eq!(
            names,
            vec!["02-CTDMOG040", "02-FLORTD000", "03-CTDBPC000"]
        );
    }

    #[test]
    fn unmatched_instrument_token_contributes_nothing() {
        let records = fixture();
        let kept = filter_streams(&records, &criteria_with(&["SPKIR", "METBK"]), &[]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sensor, "06-METBKA000");
        assert!(filter_streams(&records, &criteria_with(&["SPKIR"]), &[]).is_empty());
    }

    #[test]
    fn subsite_mismatch_empties_the_subset() {
        let records = fixture();
        let criteria = SelectionCriteria {
            subsites: vec!["GA01SUMO".to_string()],
            ..SelectionCriteria::default()
        };
        assert!(filter_streams(&records, &criteria, &[]).is_empty());
    }

    fn review_window(refdes: &str) -> ReviewWindow {
        ReviewWindow {
            designator: ReferenceDesignator::parse(refdes).unwrap(),
            begin: Some("2014-09-13T18:45:00.000Z".to_string()),
            end: Some("2015-08-14T04:45:00.000Z".to_string()),
            deployments: vec![1],
        }
    }

    #[test]
    fn review_windows_filter_on_the_designator() {
        let windows = vec![
            review_window("GI03FLMA-RIM01-02-CTDMOG040"),
            review_window("CP01CNSM-SBD11-06-METBKA000"),
        ];

        let kept = filter_review_windows(&windows, &criteria_with(&["CTD"]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].designator.subsite, "GI03FLMA");

        let criteria = SelectionCriteria {
            arrays: vec!["CP".to_string()],
            ..SelectionCriteria::default()
        };
        let kept = filter_review_windows(&windows, &criteria);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].designator.node, "SBD11");

        assert_eq!(
            filter_review_windows(&windows, &SelectionCriteria::default()).len(),
            2
        );
    }
}
