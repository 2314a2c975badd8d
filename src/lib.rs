#![forbid(unsafe_code)]

//! Rust client for bulk OOI data downloads over the uFrame
//! Machine-to-Machine (M2M) interface.
//!
//! The Ocean Observatories Initiative serves instrument data through
//! asynchronous requests: you name an instrument stream and a time window,
//! uFrame acknowledges with a THREDDS location, and the NetCDF files appear
//! there once the request fulfills. This crate covers that whole workflow:
//! it cross-checks the data team's QC database against the live GUI data
//! catalog, negotiates each request's time window against the advertised
//! availability, builds the request URLs, dispatches them with basic auth,
//! and mirrors the fulfilled files locally. Every stage leaves a CSV
//! artifact so a batch can be audited or resumed.
//!
//! **Quick start**
//! ```no_run
//! use ooi_m2m::{Client, ClientOptions, RequestWindow, SelectionCriteria};
//!
//! let opts = ClientOptions {
//!     output_dir: "/data/ooi".into(),
//!     username: "OOIAPI-USER".to_string(),
//!     token: "TEMP-TOKEN".to_string(),
//!     ..ClientOptions::default()
//! };
//! let client = Client::new(opts)?;
//!
//! let criteria = SelectionCriteria {
//!     subsites: vec!["GI03FLMA".to_string()],
//!     instruments: vec!["CTDMO".to_string()],
//!     delivery_methods: vec!["recovered".to_string()],
//!     ..SelectionCriteria::default()
//! };
//! let window = RequestWindow::new("2014-09-01T00:00:00", "2015-09-01T00:00:00")?;
//!
//! let report = client.build_request_urls(&criteria, &window)?;
//! println!("{} requests ready", report.urls.len());
//! for warning in &report.warnings {
//!     eprintln!("{warning}");
//! }
//! # Ok::<(), ooi_m2m::Error>(())
//! ```
//!
//! Notes:
//! - Credentials come from your ooinet.oceanobservatories.org profile; the
//!   API refuses unauthenticated data requests.
//! - Build and dispatch are separate steps, so a URL list can be reviewed
//!   (or trimmed) before anything is sent.
//! - [`Client::build_review_request_urls`] covers the data-review workflow:
//!   instead of a caller-supplied window, request bounds come from the data
//!   team's review list of deployments awaiting evaluation.

mod catalog;
mod client;
mod criteria;
mod date;
mod error;
mod filter;
mod reconcile;
mod refdes;
mod sources;
mod url_builder;

pub use crate::catalog::{
    CatalogSource, ReviewWindow, StreamRecord, fetch_gui_catalog, fetch_gui_catalog_science,
    fetch_qc_catalog, fetch_review_windows,
};
pub use crate::client::{
    Client, ClientOptions, DispatchRecord, RetrieveReport, UrlBuildReport,
};
pub use crate::criteria::{SelectionCriteria, define_methods, parse_input_list};
pub use crate::date::{RequestWindow, format_date};
pub use crate::error::{Error, Result};
pub use crate::filter::{filter_review_windows, filter_streams};
pub use crate::reconcile::{ComparedStream, Provenance, reconcile};
pub use crate::refdes::ReferenceDesignator;
pub use crate::sources::Endpoints;
pub use crate::url_builder::{
    BuiltRequests, FallbackReason, NegotiationWarning, build_checked, build_review,
    build_unchecked,
};
