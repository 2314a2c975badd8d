use std::env;
use std::path::PathBuf;

use ooi_m2m::{Client, ClientOptions, RequestWindow, SelectionCriteria, UrlBuildReport};

fn main() {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage:\n  cargo run --example cli -- urls <output_dir> [key=value ...]\n  cargo run --example cli -- urls-nocheck <output_dir> [key=value ...]\n  cargo run --example cli -- urls-review <output_dir> [key=value ...]\n  cargo run --example cli -- retrieve <output_dir> [key=value ...]\n\nFilter keys: array, subsite, node, inst, method, begin, end\n\nExample (Irminger Sea CTDMOs, recovered data for one deployment year):\n  cargo run --example cli -- urls ./out subsite=GI03FLMA inst=CTDMO \\\n      method=recovered begin=2014-09-01T00:00:00 end=2015-09-01T00:00:00\n\nNotes:\n- urls / urls-nocheck only build and write the request-URL artifacts.\n- urls-review takes its time bounds from the data-review list, so begin\n  and end are ignored.\n- retrieve also dispatches the requests and downloads the fulfilled files;\n  it needs OOI_API_USER and OOI_API_TOKEN in the environment."
        );
        return;
    }

    let command = args[1].as_str();
    let output_dir = PathBuf::from(&args[2]);

    let mut array = String::new();
    let mut subsite = String::new();
    let mut node = String::new();
    let mut inst = String::new();
    let mut method = String::new();
    let mut begin = String::new();
    let mut end = String::new();

    for arg in &args[3..] {
        let Some((key, value)) = arg.split_once('=') else {
            eprintln!("ignoring argument without '=': {arg}");
            continue;
        };
        match key {
            "array" => array = value.to_string(),
            "subsite" => subsite = value.to_string(),
            "node" => node = value.to_string(),
            "inst" => inst = value.to_string(),
            "method" => method = value.to_string(),
            "begin" => begin = value.to_string(),
            "end" => end = value.to_string(),
            _ => eprintln!("ignoring unknown filter key: {key}"),
        }
    }

    let criteria = SelectionCriteria::from_inputs(&array, &subsite, &node, &inst, &method);
    let window = match RequestWindow::new(&begin, &end) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("invalid time window: {e}");
            std::process::exit(2);
        }
    };

    let opts = ClientOptions {
        output_dir,
        username: env::var("OOI_API_USER").unwrap_or_default(),
        token: env::var("OOI_API_TOKEN").unwrap_or_default(),
        ..ClientOptions::default()
    };
    let client = Client::new(opts).expect("create client");

    match command {
        "urls" => match client.build_request_urls(&criteria, &window) {
            Ok(report) => print_build_report(&report),
            Err(e) => {
                eprintln!("building request urls failed: {e}");
                eprintln!(
                    "Tip: check the comparison artifact (if written) to see which catalog dropped your selection."
                );
                std::process::exit(1);
            }
        },

        "urls-nocheck" => match client.build_request_urls_unchecked(&criteria, &window) {
            Ok(report) => print_build_report(&report),
            Err(e) => {
                eprintln!("building request urls failed: {e}");
                std::process::exit(1);
            }
        },

        "urls-review" => match client.build_review_request_urls(&criteria) {
            Ok(report) => print_build_report(&report),
            Err(e) => {
                eprintln!("building request urls failed: {e}");
                std::process::exit(1);
            }
        },

        "retrieve" => match client.retrieve(&criteria, &window) {
            Ok(report) => {
                println!(
                    "Dispatched {sent} requests, downloaded {files} files",
                    sent = report.dispatches.len(),
                    files = report.files_downloaded
                );
                println!("Summary artifacts in {}", args[2]);
            }
            Err(e) => {
                eprintln!("retrieve failed: {e}");
                eprintln!(
                    "Tip: uFrame throttles aggressively; re-run later or resume from the urls_not_sent artifact."
                );
                std::process::exit(1);
            }
        },

        _ => {
            eprintln!("Unknown command. Use: urls|urls-nocheck|urls-review|retrieve");
            std::process::exit(2);
        }
    }
}

fn print_build_report(report: &UrlBuildReport) {
    println!("Built {count} request urls", count = report.urls.len());
    println!("URL artifact: {}", report.urls_path.display());
    if let Some(compare) = &report.compare_path {
        println!("Comparison artifact: {}", compare.display());
    }
    if let Some(review) = &report.review_path {
        println!("Review ledger: {}", review.display());
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
}
