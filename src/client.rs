use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{
    CatalogSource, ReviewWindow, fetch_gui_catalog, fetch_gui_catalog_science, fetch_qc_catalog,
    fetch_review_windows,
};
use crate::criteria::{SelectionCriteria, define_methods};
use crate::date::RequestWindow;
use crate::error::{Error, Result};
use crate::filter::{filter_review_windows, filter_streams};
use crate::reconcile::{ComparedStream, reconcile};
use crate::sources::Endpoints;
use crate::url_builder::{NegotiationWarning, build_checked, build_review, build_unchecked};

/// Placeholder recorded when uFrame returns no THREDDS location.
const NO_OUTPUT_URL: &str = "no_output_url";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Directory receiving artifacts and downloaded files.
    pub output_dir: PathBuf,
    /// Remote catalog, API, and file-server locations.
    pub endpoints: Endpoints,
    /// M2M API username, sent as the basic-auth user.
    pub username: String,
    /// M2M API token, sent as the basic-auth password.
    pub token: String,
    /// Wait between retries after an HTTP 400 from the M2M API.
    pub retry_backoff: Duration,
    /// Wait between fulfillment probes against the THREDDS server.
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            endpoints: Endpoints::default(),
            username: String::new(),
            token: String::new(),
            retry_backoff: Duration::from_secs(60),
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of a URL-building invocation.
#[derive(Debug, Clone)]
pub struct UrlBuildReport {
    pub urls: Vec<String>,
    pub warnings: Vec<NegotiationWarning>,
    /// Comparison artifact; written in checked mode only.
    pub compare_path: Option<PathBuf>,
    /// Aggregated review-window ledger; written in review mode only.
    pub review_path: Option<PathBuf>,
    /// Flat one-URL-per-line artifact.
    pub urls_path: PathBuf,
}

/// One dispatched request and what uFrame said about it. Row shape of the
/// dispatch summary artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub status: String,
    pub request_url: String,
    #[serde(rename = "outputUrl")]
    pub output_url: String,
}

impl DispatchRecord {
    pub fn has_output(&self) -> bool {
        self.output_url != NO_OUTPUT_URL
    }
}

/// Outcome of an end-to-end retrieve.
#[derive(Debug, Clone)]
pub struct RetrieveReport {
    pub build: UrlBuildReport,
    pub dispatches: Vec<DispatchRecord>,
    pub files_downloaded: usize,
}

/// Blocking client for the OOI M2M data-download workflow.
#[derive(Debug, Clone)]
pub struct Client {
    opts: ClientOptions,
    http: HttpClient,
}

impl Client {
    pub fn new(opts: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("ooi-m2m-rs/0.1"));
        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self { opts, http })
    }

    /// Convenience constructor with default options.
    pub fn default_client() -> Result<Self> {
        Self::new(ClientOptions::default())
    }

    /// Build data-request URLs for streams confirmed by both catalogs.
    ///
    /// Fetches and filters the QC database and the GUI data catalog,
    /// reconciles them, writes the comparison artifact, and assembles URLs
    /// for the Science rows present in both. The comparison artifact is
    /// written even when the GUI side matches nothing (every row then tags
    /// `qcdb_only`), so the mismatch can be audited before the error
    /// surfaces.
    pub fn build_request_urls(
        &self,
        criteria: &SelectionCriteria,
        window: &RequestWindow,
    ) -> Result<UrlBuildReport> {
        fs::create_dir_all(&self.opts.output_dir)?;
        let now = invocation_stamp();
        let methods = define_methods(&criteria.delivery_methods)?;

        let qc = fetch_qc_catalog(&self.http, &self.opts.endpoints)?;
        let qc_subset = filter_streams(&qc, criteria, &methods);
        if qc_subset.is_empty() {
            return Err(Error::NoMatchInCatalog(CatalogSource::Qcdb));
        }

        let gui = fetch_gui_catalog(&self.http, &self.opts.endpoints)?;
        let gui_subset = filter_streams(&gui, criteria, &methods);

        let compared = reconcile(&qc_subset, &gui_subset)?;
        let compare_path = self.write_compare_artifact(&compared, &now)?;
        info!(
            rows = compared.len(),
            path = %compare_path.display(),
            "catalog comparison complete"
        );

        if gui_subset.is_empty() {
            return Err(Error::NoMatchInCatalog(CatalogSource::GuiCatalog));
        }

        let built = build_checked(&compared, window, &self.opts.endpoints.m2m_api_root)?;
        let urls_path = self.write_url_artifact(&built.urls, &now)?;
        info!(
            requests = built.urls.len(),
            path = %urls_path.display(),
            "data request urls complete"
        );

        Ok(UrlBuildReport {
            urls: built.urls,
            warnings: built.warnings,
            compare_path: Some(compare_path),
            review_path: None,
            urls_path,
        })
    }

    /// Build data-request URLs from the GUI data catalog alone.
    ///
    /// Science rows are filtered and time windows negotiated exactly as in
    /// the checked mode, but no QC database confirmation is required and no
    /// comparison artifact is produced.
    pub fn build_request_urls_unchecked(
        &self,
        criteria: &SelectionCriteria,
        window: &RequestWindow,
    ) -> Result<UrlBuildReport> {
        fs::create_dir_all(&self.opts.output_dir)?;
        let now = invocation_stamp();
        let methods = define_methods(&criteria.delivery_methods)?;

        let gui = fetch_gui_catalog_science(&self.http, &self.opts.endpoints)?;
        let gui_subset = filter_streams(&gui, criteria, &methods);
        if gui_subset.is_empty() {
            return Err(Error::NoMatchInCatalog(CatalogSource::GuiCatalog));
        }

        let built = build_unchecked(&gui_subset, window, &self.opts.endpoints.m2m_api_root)?;
        let urls_path = self.write_url_artifact(&built.urls, &now)?;
        info!(
            requests = built.urls.len(),
            path = %urls_path.display(),
            "data request urls complete"
        );

        Ok(UrlBuildReport {
            urls: built.urls,
            warnings: built.warnings,
            compare_path: None,
            review_path: None,
            urls_path,
        })
    }

    /// Build data-request URLs for the instruments flagged for data review.
    ///
    /// The review list names which deployments of each instrument await
    /// review; their aggregated spans are appended to the running
    /// `data_review_dates_deployments.csv` ledger, then QC database rows
    /// join the spans on the reference designator and each matching Science
    /// row gets a URL bounded by the span as-is. No time window is taken
    /// from the caller.
    pub fn build_review_request_urls(
        &self,
        criteria: &SelectionCriteria,
    ) -> Result<UrlBuildReport> {
        fs::create_dir_all(&self.opts.output_dir)?;
        let now = invocation_stamp();
        let methods = define_methods(&criteria.delivery_methods)?;

        let windows = fetch_review_windows(&self.http, &self.opts.endpoints)?;
        let window_subset = filter_review_windows(&windows, criteria);
        if window_subset.is_empty() {
            return Err(Error::NoMatchInCatalog(CatalogSource::ReviewList));
        }
        let review_path = self.write_review_artifact(&window_subset)?;
        info!(
            instruments = window_subset.len(),
            path = %review_path.display(),
            "review windows recorded"
        );

        let qc = fetch_qc_catalog(&self.http, &self.opts.endpoints)?;
        let qc_subset = filter_streams(&qc, criteria, &methods);
        if qc_subset.is_empty() {
            return Err(Error::NoMatchInCatalog(CatalogSource::Qcdb));
        }

        let built = build_review(&qc_subset, &window_subset, &self.opts.endpoints.m2m_api_root)?;
        let urls_path = self.write_url_artifact(&built.urls, &now)?;
        info!(
            requests = built.urls.len(),
            path = %urls_path.display(),
            "data request urls complete"
        );

        Ok(UrlBuildReport {
            urls: built.urls,
            warnings: built.warnings,
            compare_path: None,
            review_path: Some(review_path),
            urls_path,
        })
    }

    /// Send each data-request URL to the M2M API.
    ///
    /// Requests carry basic auth. A 400 response means uFrame is refusing
    /// new requests for the moment; those are retried indefinitely after
    /// the configured backoff. Every outcome is appended to the summary
    /// artifact as it lands, and the pending-URL artifact is rewritten
    /// after each send so an interrupted run can resume from it.
    pub fn send_requests(&self, urls: &[String]) -> Result<Vec<DispatchRecord>> {
        fs::create_dir_all(&self.opts.output_dir)?;
        let now = invocation_stamp();
        let summary_path = self
            .opts
            .output_dir
            .join(format!("data_request_summary_{now}.csv"));
        let not_sent_path = self
            .opts
            .output_dir
            .join(format!("urls_not_sent_{now}.csv"));

        let mut summary = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&summary_path)?;
        summary.write_record(["status", "request_url", "outputUrl"])?;
        summary.flush()?;

        let mut records = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            info!(request = i + 1, total = urls.len(), %url, "sending data request");
            let record = self.send_one(url)?;
            debug!(status = %record.status, output_url = %record.output_url, "request acknowledged");
            summary.serialize(&record)?;
            summary.flush()?;
            records.push(record);
            write_pending(&not_sent_path, &urls[i + 1..])?;
        }

        info!(sent = records.len(), path = %summary_path.display(), "dispatch complete");
        Ok(records)
    }

    fn send_one(&self, url: &str) -> Result<DispatchRecord> {
        loop {
            let resp = self
                .http
                .get(url)
                .basic_auth(&self.opts.username, Some(&self.opts.token))
                .send()?;
            let status_code = resp.status();
            let body: Value = resp.json().unwrap_or(Value::Null);

            if status_code == StatusCode::BAD_REQUEST {
                let uframe_status = body
                    .pointer("/message/status")
                    .and_then(Value::as_str)
                    .unwrap_or("no uFrame status provided");
                warn!(
                    %url,
                    status = uframe_status,
                    backoff = ?self.opts.retry_backoff,
                    "data request refused; retrying"
                );
                thread::sleep(self.opts.retry_backoff);
                continue;
            }

            let (status, output_url) = classify_response(status_code.as_u16(), &body);
            return Ok(DispatchRecord {
                status,
                request_url: url.to_string(),
                output_url,
            });
        }
    }

    /// Block until a fulfilled request's output directory reports complete.
    ///
    /// The THREDDS directory gains a `status.txt` once uFrame has finished
    /// writing every output file; probe for it until it answers 200.
    pub fn wait_until_complete(&self, output_url: &str) -> Result<()> {
        let probe = status_probe_url(output_url);
        loop {
            if self.http.get(&probe).send()?.status() == StatusCode::OK {
                info!(%output_url, "data request has fulfilled");
                return Ok(());
            }
            info!(
                %output_url,
                interval = ?self.opts.poll_interval,
                "data request still fulfilling; waiting"
            );
            thread::sleep(self.opts.poll_interval);
        }
    }

    /// Download the fulfilled files behind one THREDDS catalog URL.
    ///
    /// Lists the directory's catalog XML, keeps the NetCDF files and their
    /// provenance/annotation JSON sidecars, and mirrors them under
    /// `{output_dir}/{subsite}/{reference_designator}/{request_folder}/`.
    /// Returns the number of files written.
    pub fn download_fulfilled(&self, output_url: &str) -> Result<usize> {
        let catalog_url = output_url.replace(".html", ".xml");
        let xml = self
            .http
            .get(&catalog_url)
            .send()?
            .error_for_status()?
            .text()?;
        let paths = dataset_paths(&xml)?;

        let folder = request_folder(output_url)?;
        let target = self
            .opts
            .output_dir
            .join(&folder.subsite)
            .join(&folder.reference_designator)
            .join(&folder.name);
        fs::create_dir_all(&target)?;

        let mut count = 0;
        for path in paths.iter().filter(|p| keep_output_file(p)) {
            let file_url = format!(
                "{}/thredds/fileServer/{path}",
                self.opts.endpoints.thredds_root
            );
            let name = path.rsplit('/').next().unwrap_or(path.as_str());
            let mut resp = self.http.get(&file_url).send()?.error_for_status()?;
            let mut out = File::create(target.join(name))?;
            resp.copy_to(&mut out)?;
            count += 1;
            debug!(file = name, "downloaded");
        }

        info!(files = count, dir = %target.display(), "download complete");
        Ok(count)
    }

    /// Checked mode end to end: build URLs, dispatch them, then wait for
    /// each fulfilled output and download it.
    pub fn retrieve(
        &self,
        criteria: &SelectionCriteria,
        window: &RequestWindow,
    ) -> Result<RetrieveReport> {
        let build = self.build_request_urls(criteria, window)?;
        self.dispatch_and_download(build)
    }

    /// No-check mode end to end.
    pub fn retrieve_unchecked(
        &self,
        criteria: &SelectionCriteria,
        window: &RequestWindow,
    ) -> Result<RetrieveReport> {
        let build = self.build_request_urls_unchecked(criteria, window)?;
        self.dispatch_and_download(build)
    }

    /// Review mode end to end.
    pub fn retrieve_review(&self, criteria: &SelectionCriteria) -> Result<RetrieveReport> {
        let build = self.build_review_request_urls(criteria)?;
        self.dispatch_and_download(build)
    }

    fn dispatch_and_download(&self, build: UrlBuildReport) -> Result<RetrieveReport> {
        let dispatches = self.send_requests(&build.urls)?;
        let mut files_downloaded = 0;
        for (i, record) in dispatches.iter().enumerate() {
            if !record.has_output() {
                warn!(request = %record.request_url, "no output url; nothing to download");
                continue;
            }
            info!(
                dataset = i + 1,
                total = dispatches.len(),
                url = %record.output_url,
                "collecting fulfilled output"
            );
            self.wait_until_complete(&record.output_url)?;
            files_downloaded += self.download_fulfilled(&record.output_url)?;
        }
        Ok(RetrieveReport {
            build,
            dispatches,
            files_downloaded,
        })
    }

    fn write_compare_artifact(&self, rows: &[ComparedStream], now: &str) -> Result<PathBuf> {
        let path = self
            .opts
            .output_dir
            .join(format!("compare_qcdb_gui_catalog_{now}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn write_url_artifact(&self, urls: &[String], now: &str) -> Result<PathBuf> {
        let path = self
            .opts
            .output_dir
            .join(format!("data_request_urls_{now}.csv"));
        let mut file = File::create(&path)?;
        for url in urls {
            writeln!(file, "{url}")?;
        }
        Ok(path)
    }

    /// Append the aggregated review windows to the running ledger.
    ///
    /// Unlike the stamped artifacts, `data_review_dates_deployments.csv`
    /// accumulates across invocations; the header goes in only when the
    /// file is fresh.
    fn write_review_artifact(&self, windows: &[ReviewWindow]) -> Result<PathBuf> {
        let path = self
            .opts
            .output_dir
            .join("data_review_dates_deployments.csv");
        let fresh = !path.exists();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(["reference_designator", "begin", "end", "deployments"])?;
        }
        for window in windows {
            writer.write_record([
                window.designator.full.as_str(),
                window.begin.as_deref().unwrap_or_default(),
                window.end.as_deref().unwrap_or_default(),
                format_deployments(&window.deployments).as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }
}

/// Timestamp suffix shared by all artifacts of one invocation.
fn invocation_stamp() -> String {
    Utc::now().format("%Y%m%dT%H%M").to_string()
}

/// Render deployment numbers the way the review ledger records them,
/// bracketed and comma separated.
fn format_deployments(deployments: &[u32]) -> String {
    let nums: Vec<String> = deployments.iter().map(u32::to_string).collect();
    format!("[{}]", nums.join(", "))
}

/// Classify a uFrame response into the summary (status, outputUrl) pair.
///
/// A 200 carries the acknowledgement and the THREDDS location; anything
/// else gets the placeholder location and whatever status uFrame put in the
/// error envelope.
fn classify_response(status_code: u16, body: &Value) -> (String, String) {
    if status_code == 200 {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("Data available for request")
            .to_string();
        let output_url = body
            .get("outputURL")
            .and_then(Value::as_str)
            .unwrap_or(NO_OUTPUT_URL)
            .to_string();
        (status, output_url)
    } else {
        let status = body
            .pointer("/message/status")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "Data request failed: no uFrame status provided".to_string());
        (status, NO_OUTPUT_URL.to_string())
    }
}

/// Derive the completion probe from a THREDDS catalog URL.
fn status_probe_url(output_url: &str) -> String {
    output_url
        .replace("/catalog/", "/fileServer/")
        .replace("/catalog.html", "/status.txt")
}

/// Rewrite the pending-URL artifact with whatever has not been sent yet.
fn write_pending(path: &Path, remaining: &[String]) -> Result<()> {
    let mut file = File::create(path)?;
    if remaining.is_empty() {
        writeln!(file, "Attempted to send all requests")?;
    } else {
        for url in remaining {
            writeln!(file, "{url}")?;
        }
    }
    Ok(())
}

/// Pull every `<dataset urlPath="...">` out of a THREDDS catalog listing.
fn dataset_paths(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paths = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"dataset" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"urlPath" {
                        paths.push(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paths)
}

/// A fulfilled request's files are the NetCDF outputs plus their
/// provenance and annotation sidecars; THREDDS also lists status and
/// metadata entries that are not worth mirroring.
fn keep_output_file(path: &str) -> bool {
    path.ends_with(".nc")
        || path.ends_with("_provenance.json")
        || path.ends_with("_annotations.json")
}

#[derive(Debug, PartialEq, Eq)]
struct RequestFolder {
    name: String,
    subsite: String,
    reference_designator: String,
}

/// Parse the request directory name out of a THREDDS catalog URL.
///
/// Directory names look like
/// `{user}-{subsite}-{node}-{sensor1}-{sensor2}-{method}-{stream}`, so the
/// subsite and the reconstructed reference designator fall out of the
/// hyphen split.
fn request_folder(output_url: &str) -> Result<RequestFolder> {
    let name = output_url
        .split('/')
        .rev()
        .nth(1)
        .ok_or_else(|| Error::InvalidInput(format!("unexpected THREDDS url: {output_url}")))?;
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() < 5 {
        return Err(Error::InvalidInput(format!(
            "unexpected THREDDS directory name: {name}"
        )));
    }
    Ok(RequestFolder {
        name: name.to_string(),
        subsite: parts[1].to_string(),
        reference_designator: format!("{}-{}-{}-{}", parts[1], parts[2], parts[3], parts[4]),
    })
}
