//! Reconciliation of the QC database against the GUI data catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::catalog::{CatalogSource, StreamRecord};
use crate::error::{Error, Result};

/// Which catalog(s) confirmed a reconciled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    #[serde(rename = "qcdb_and_gui_catalog")]
    QcdbAndGuiCatalog,
    #[serde(rename = "qcdb_only")]
    QcdbOnly,
    #[serde(rename = "gui_catalog_only")]
    GuiCatalogOnly,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provenance::QcdbAndGuiCatalog => "qcdb_and_gui_catalog",
            Provenance::QcdbOnly => "qcdb_only",
            Provenance::GuiCatalogOnly => "gui_catalog_only",
        };
        f.write_str(s)
    }
}

/// A stream after reconciliation, tagged with its provenance.
///
/// Stream type comes from the QC side and availability times from the GUI
/// side, so a row confirmed by both catalogs carries all of them. This is
/// also the row shape of the comparison artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparedStream {
    pub array_name: Option<String>,
    pub array_code: String,
    pub subsite: String,
    pub node: String,
    pub sensor: String,
    pub reference_designator: String,
    pub method: String,
    pub stream_name: String,
    pub stream_type: Option<String>,
    pub begin_time: Option<String>,
    pub end_time: Option<String>,
    pub source: Provenance,
}

impl ComparedStream {
    pub fn is_science(&self) -> bool {
        self.stream_type.as_deref() == Some("Science")
    }
}

type StreamKey = (String, String, String, String, String, String, String);

fn stream_key(r: &StreamRecord) -> StreamKey {
    (
        r.array_code.clone(),
        r.subsite.clone(),
        r.node.clone(),
        r.sensor.clone(),
        r.reference_designator.clone(),
        r.method.clone(),
        r.stream_name.clone(),
    )
}

/// Outer-join the two filtered catalogs and classify every row.
///
/// Rows join on the full identifying key (array code, subsite, node,
/// sensor, reference designator, method, stream name). Matched rows take
/// the QC spelling of the array name where both sides carry one. Output is
/// sorted by reference designator, then method, then stream name.
///
/// An empty QC subset is an error: there is nothing to reconcile. An empty
/// GUI subset is not; the output then tags every row `qcdb_only` and the
/// caller decides what that means.
pub fn reconcile(qc: &[StreamRecord], gui: &[StreamRecord]) -> Result<Vec<ComparedStream>> {
    if qc.is_empty() {
        return Err(Error::NoMatchInCatalog(CatalogSource::Qcdb));
    }

    let mut gui_by_key: BTreeMap<StreamKey, Vec<&StreamRecord>> = BTreeMap::new();
    for g in gui {
        gui_by_key.entry(stream_key(g)).or_default().push(g);
    }

    let mut matched: BTreeSet<StreamKey> = BTreeSet::new();
    let mut rows = Vec::new();

    for q in qc {
        let key = stream_key(q);
        match gui_by_key.get(&key) {
            Some(counterparts) => {
                for g in counterparts {
                    rows.push(ComparedStream {
                        array_name: q.array_name.clone().or_else(|| g.array_name.clone()),
                        array_code: q.array_code.clone(),
                        subsite: q.subsite.clone(),
                        node: q.node.clone(),
                        sensor: q.sensor.clone(),
                        reference_designator: q.reference_designator.clone(),
                        method: q.method.clone(),
                        stream_name: q.stream_name.clone(),
                        stream_type: q.stream_type.clone(),
                        begin_time: g.begin_time.clone(),
                        end_time: g.end_time.clone(),
                        source: Provenance::QcdbAndGuiCatalog,
                    });
                }
                matched.insert(key);
            }
            None => rows.push(one_sided(q, Provenance::QcdbOnly)),
        }
    }

    for g in gui {
        if !matched.contains(&stream_key(g)) {
            rows.push(one_sided(g, Provenance::GuiCatalogOnly));
        }
    }

    rows.sort_by(|a, b| {
        (&a.reference_designator, &a.method, &a.stream_name)
            .cmp(&(&b.reference_designator, &b.method, &b.stream_name))
    });

    Ok(rows)
}

fn one_sided(r: &StreamRecord, source: Provenance) -> ComparedStream {
    ComparedStream {
        array_name: r.array_name.clone(),
        array_code: r.array_code.clone(),
        subsite: r.subsite.clone(),
        node: r.node.clone(),
        sensor: r.sensor.clone(),
        reference_designator: r.reference_designator.clone(),
        method: r.method.clone(),
        stream_name: r.stream_name.clone(),
        stream_type: r.stream_type.clone(),
        begin_time: r.begin_time.clone(),
        end_time: r.end_time.clone(),
        source,
    }
}
