//! The two stream catalogs: the QC database and the live GUI catalog.
//!
//! Both are flattened into [`StreamRecord`] rows keyed by reference
//! designator, delivery method, and stream name. QC rows carry the stream
//! type and no availability times; GUI rows carry availability times and no
//! stream type.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::date::format_date;
use crate::error::{Error, Result};
use crate::refdes::ReferenceDesignator;
use crate::sources::Endpoints;

/// Which remote catalog an operation was talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Qcdb,
    GuiCatalog,
    ReviewList,
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::Qcdb => write!(f, "QC database"),
            CatalogSource::GuiCatalog => write!(f, "GUI data catalog"),
            CatalogSource::ReviewList => write!(f, "data review list"),
        }
    }
}

/// One (instrument, delivery method, stream) row of a catalog.
///
/// Timestamps are fixed-width ISO-8601 `....000Z` strings as served, so
/// comparing them as strings compares instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRecord {
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
}

impl StreamRecord {
    pub fn is_science(&self) -> bool {
        self.stream_type.as_deref() == Some("Science")
    }
}

/// Row of the QC database's instrument/stream association CSV.
#[derive(Debug, Deserialize)]
struct DataStreamRow {
    reference_designator: Option<String>,
    method: Option<String>,
    stream_name: Option<String>,
}

/// Row of the QC database's stream-description CSV.
#[derive(Debug, Deserialize)]
struct StreamDescriptionRow {
    #[serde(rename = "name")]
    stream_name: Option<String>,
    stream_type: Option<String>,
}

/// Row of the QC database's regions CSV. Its `reference_designator` column
/// holds the two-character array code, not a full designator.
#[derive(Debug, Deserialize)]
struct RegionRow {
    #[serde(rename = "reference_designator")]
    array_code: Option<String>,
    #[serde(rename = "name")]
    array_name: Option<String>,
}

/// Wire shape of one GUI catalog entry (`/api/uframe/stream`).
#[derive(Debug, Clone, Deserialize)]
struct GuiStreamEntry {
    reference_designator: String,
    #[serde(default)]
    stream_method: Option<String>,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    stream_dataset: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    array_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuiStreamListing {
    streams: Vec<GuiStreamEntry>,
}

/// Row of the data-review list, one per instrument deployment.
#[derive(Debug, Deserialize)]
struct ReviewListRow {
    #[serde(rename = "Reference Designator")]
    reference_designator: Option<String>,
    status: Option<String>,
    #[serde(rename = "startDateTime")]
    start: Option<String>,
    #[serde(rename = "stopDateTime")]
    stop: Option<String>,
    #[serde(rename = "deploymentNumber")]
    deployment_number: Option<f64>,
}

/// One instrument's aggregated review span: the union of its for-review
/// deployment windows, plus the deployment numbers involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewWindow {
    pub designator: ReferenceDesignator,
    pub begin: Option<String>,
    pub end: Option<String>,
    pub deployments: Vec<u32>,
}

/// Download and assemble the QC database.
///
/// Three CSV sources are joined: instrument/stream associations, stream
/// descriptions (on stream name; unmatched rows keep an absent type), and
/// region names (on array code). Failure of any source is fatal, since
/// reconciliation cannot work against a partial database.
pub fn fetch_qc_catalog(http: &HttpClient, endpoints: &Endpoints) -> Result<Vec<StreamRecord>> {
    let streams: Vec<DataStreamRow> =
        fetch_csv(http, &endpoints.qc_data_streams_url, CatalogSource::Qcdb)?;
    let descriptions: Vec<StreamDescriptionRow> =
        fetch_csv(http, &endpoints.qc_stream_descriptions_url, CatalogSource::Qcdb)?;
    let regions: Vec<RegionRow> = fetch_csv(http, &endpoints.qc_regions_url, CatalogSource::Qcdb)?;
    debug!(
        streams = streams.len(),
        descriptions = descriptions.len(),
        regions = regions.len(),
        "fetched QC database sources"
    );
    assemble_qc_catalog(streams, descriptions, regions)
}

/// Download the full GUI data catalog.
pub fn fetch_gui_catalog(http: &HttpClient, endpoints: &Endpoints) -> Result<Vec<StreamRecord>> {
    let listing = fetch_gui_listing(http, endpoints)?;
    debug!(streams = listing.streams.len(), "fetched GUI data catalog");
    listing.streams.iter().map(gui_entry_to_record).collect()
}

/// Download only the Science rows of the GUI data catalog.
///
/// This is the no-check selection: rows are kept when the catalog itself
/// types them as Science, with no QC database involved. Streams whose name
/// contains `bad` are test artifacts in the catalog and are dropped.
pub fn fetch_gui_catalog_science(
    http: &HttpClient,
    endpoints: &Endpoints,
) -> Result<Vec<StreamRecord>> {
    let listing = fetch_gui_listing(http, endpoints)?;
    let records = science_records(&listing)?;
    debug!(streams = records.len(), "fetched GUI data catalog science rows");
    Ok(records)
}

fn science_records(listing: &GuiStreamListing) -> Result<Vec<StreamRecord>> {
    let mut records = Vec::new();
    for entry in &listing.streams {
        if entry.stream_dataset.as_deref() != Some("Science") {
            continue;
        }
        let record = gui_entry_to_record(entry)?;
        if record.stream_name.contains("bad") {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

/// Download and aggregate the data-review list.
///
/// The list tracks OOI 1.0 instrument deployments and their review status.
/// Rows whose status is `for review` are grouped by reference designator;
/// each group yields the earliest start, the latest stop (validated and
/// `.000Z` suffixed) and its deployment numbers, in first-appearance order.
/// Rows with any other status never participate, so only participating rows
/// are held to the designator and date formats.
pub fn fetch_review_windows(http: &HttpClient, endpoints: &Endpoints) -> Result<Vec<ReviewWindow>> {
    let rows: Vec<ReviewListRow> =
        fetch_csv(http, &endpoints.review_list_url, CatalogSource::ReviewList)?;
    debug!(rows = rows.len(), "fetched data review list");
    aggregate_review_windows(rows)
}

fn aggregate_review_windows(rows: Vec<ReviewListRow>) -> Result<Vec<ReviewWindow>> {
    struct Group {
        designator: ReferenceDesignator,
        start: Option<String>,
        stop: Option<String>,
        deployments: Vec<u32>,
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        if row.status.as_deref() != Some("for review") {
            continue;
        }
        let Some(refdes) = row.reference_designator else {
            continue;
        };
        let i = match index.get(&refdes) {
            Some(&i) => i,
            None => {
                let designator = ReferenceDesignator::parse(&refdes).map_err(|e| {
                    Error::CatalogUnavailable(CatalogSource::ReviewList, e.to_string())
                })?;
                groups.push(Group {
                    designator,
                    start: None,
                    stop: None,
                    deployments: Vec::new(),
                });
                index.insert(refdes, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[i];
        if let Some(start) = row.start {
            if group.start.as_deref().is_none_or(|s| start.as_str() < s) {
                group.start = Some(start);
            }
        }
        if let Some(stop) = row.stop {
            if group.stop.as_deref().is_none_or(|s| stop.as_str() > s) {
                group.stop = Some(stop);
            }
        }
        if let Some(n) = row.deployment_number {
            group.deployments.push(n as u32);
        }
    }

    groups
        .into_iter()
        .map(|g| {
            let begin = format_date(g.start.as_deref().unwrap_or_default()).map_err(|e| {
                Error::CatalogUnavailable(CatalogSource::ReviewList, e.to_string())
            })?;
            let end = format_date(g.stop.as_deref().unwrap_or_default()).map_err(|e| {
                Error::CatalogUnavailable(CatalogSource::ReviewList, e.to_string())
            })?;
            Ok(ReviewWindow {
                designator: g.designator,
                begin,
                end,
                deployments: g.deployments,
            })
        })
        .collect()
}

fn fetch_csv<T: serde::de::DeserializeOwned>(
    http: &HttpClient,
    url: &str,
    source: CatalogSource,
) -> Result<Vec<T>> {
    let body = http
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .map_err(|e| Error::CatalogUnavailable(source, e.to_string()))?;
    parse_csv(&body, source)
}

fn parse_csv<T: serde::de::DeserializeOwned>(data: &str, source: CatalogSource) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.map_err(|e| Error::CatalogUnavailable(source, e.to_string()))?);
    }
    Ok(rows)
}

fn fetch_gui_listing(http: &HttpClient, endpoints: &Endpoints) -> Result<GuiStreamListing> {
    http.get(&endpoints.gui_catalog_url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.json())
        .map_err(|e| Error::CatalogUnavailable(CatalogSource::GuiCatalog, e.to_string()))
}

/// Join the three QC database tables into catalog rows.
///
/// Association rows without a reference designator are dropped; rows whose
/// method column is blank get the `no_method` placeholder. A stream name
/// described with several types joins once per type. Exact-duplicate rows
/// collapse, keeping first occurrence order.
fn assemble_qc_catalog(
    streams: Vec<DataStreamRow>,
    descriptions: Vec<StreamDescriptionRow>,
    regions: Vec<RegionRow>,
) -> Result<Vec<StreamRecord>> {
    let mut types_by_stream: HashMap<String, Vec<Option<String>>> = HashMap::new();
    for d in descriptions {
        if let Some(name) = d.stream_name {
            types_by_stream.entry(name).or_default().push(d.stream_type);
        }
    }

    let mut region_names: HashMap<String, String> = HashMap::new();
    for r in regions {
        if let (Some(code), Some(name)) = (r.array_code, r.array_name) {
            region_names.entry(code).or_insert(name);
        }
    }

    let mut seen: BTreeSet<(String, String, String, Option<String>)> = BTreeSet::new();
    let mut records = Vec::new();

    for row in streams {
        let Some(refdes) = row.reference_designator else {
            continue;
        };
        let method = row.method.unwrap_or_else(|| "no_method".to_string());
        let stream_name = row.stream_name.unwrap_or_default();

        let types = types_by_stream
            .get(&stream_name)
            .cloned()
            .unwrap_or_else(|| vec![None]);

        for stream_type in types {
            let key = (
                refdes.clone(),
                method.clone(),
                stream_name.clone(),
                stream_type.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            let rd = ReferenceDesignator::parse(&refdes)
                .map_err(|e| Error::CatalogUnavailable(CatalogSource::Qcdb, e.to_string()))?;
            records.push(StreamRecord {
                array_name: region_names.get(&rd.array_code).cloned(),
                array_code: rd.array_code,
                subsite: rd.subsite,
                node: rd.node,
                sensor: rd.sensor,
                reference_designator: refdes.clone(),
                method: method.clone(),
                stream_name: stream_name.clone(),
                stream_type,
                begin_time: None,
                end_time: None,
            });
        }
    }

    Ok(records)
}

fn gui_entry_to_record(entry: &GuiStreamEntry) -> Result<StreamRecord> {
    let rd = ReferenceDesignator::parse(&entry.reference_designator)
        .map_err(|e| Error::CatalogUnavailable(CatalogSource::GuiCatalog, e.to_string()))?;
    // Methods come over the wire hyphenated (recovered-host); the QC
    // database and the M2M API use underscores.
    let method = match entry.stream_method.as_deref() {
        None | Some("") => "na".to_string(),
        Some(m) => m.replace('-', "_"),
    };
    let stream_name = match entry.stream.as_deref() {
        None | Some("") => "no_stream".to_string(),
        Some(s) => s.to_string(),
    };
    Ok(StreamRecord {
        array_name: entry.array_name.clone(),
        array_code: rd.array_code,
        subsite: rd.subsite,
        node: rd.node,
        sensor: rd.sensor,
        reference_designator: entry.reference_designator.clone(),
        method,
        stream_name,
        stream_type: None,
        begin_time: entry.start.clone(),
        end_time: entry.end.clone(),
    })
}
