const QCDB_RAW_ROOT: &str =
    "https://raw.githubusercontent.com/seagrinch/data-team-python/master/infrastructure";

/// Remote locations of the catalogs and servers the client talks to.
///
/// Defaults point at the production OOI hosts. Override individual fields
/// to aim at a mirror or a fixture server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// QC database CSV of (reference designator, method, stream) rows.
    pub qc_data_streams_url: String,
    /// QC database CSV describing each stream, including its type.
    pub qc_stream_descriptions_url: String,
    /// QC database CSV mapping array codes to array names.
    pub qc_regions_url: String,
    /// CSV listing OOI 1.0 deployments and their review status.
    pub review_list_url: String,
    /// JSON listing of every stream the GUI data catalog serves.
    pub gui_catalog_url: String,
    /// Root of the M2M sensor inventory that data-request URLs extend.
    pub m2m_api_root: String,
    /// THREDDS server holding fulfilled request outputs.
    pub thredds_root: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            qc_data_streams_url: format!("{QCDB_RAW_ROOT}/data_streams.csv"),
            qc_stream_descriptions_url: format!("{QCDB_RAW_ROOT}/stream_descriptions.csv"),
            qc_regions_url: format!("{QCDB_RAW_ROOT}/regions.csv"),
            review_list_url: "https://raw.githubusercontent.com/ooi-data-lab/data-review-prep\
                              /master/review_list/data_review_list.csv"
                .to_string(),
            gui_catalog_url: "https://ooinet.oceanobservatories.org/api/uframe/stream".to_string(),
            m2m_api_root: "https://ooinet.oceanobservatories.org/api/m2m/12576/sensor/inv"
                .to_string(),
            thredds_root: "https://opendap.oceanobservatories.org".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_production() {
        let e = Endpoints::default();
        assert!(e.qc_data_streams_url.ends_with("/data_streams.csv"));
        assert!(e.review_list_url.ends_with("/review_list/data_review_list.csv"));
        assert!(e.gui_catalog_url.starts_with("https://ooinet.oceanobservatories.org"));
        assert!(e.m2m_api_root.ends_with("/sensor/inv"));
    }
}
