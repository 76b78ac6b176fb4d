//! End-to-end pipeline: discover → extract → merge → persist → report.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use strata_quotes::documents;
use strata_quotes::engine::batch::{BatchDriver, FailureStage};
use strata_quotes::engine::projector::{project, PanelMember, ReportSettings};
use strata_quotes::llm::QuoteExtractor;
use strata_quotes::schema::QuoteSchema;
use strata_quotes::storage;
use strata_quotes::types::PricingParams;

use crate::mock_extractor::MockExtractor;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn chu_extraction() -> Value {
    json!({
        "general_info": {"scheme_name": "Clearlake", "renewal_date": ""},
        "quotes": {
            "CHU": {
                "underwriter": "QBE Insurance (Australia) Limited",
                "base": "$10,000.00",
                "total": 12000,
                "commission_without_gst": 2000,
                "uwgst_fee": 423.5,
                "features": {"Flood": "Included", "Building": 5000000}
            }
        }
    })
}

/// Input directory with extracts, text, a broken file and noise.
fn seed_inputs(dir: &Path) {
    write(dir, "01_chu.txt", "CHU strata quote schedule");
    write(
        dir,
        "02_iis.json",
        &json!({"quotes": {"IIS": {"base": 8000, "total": 9000, "commission_without_gst": 1600}}}).to_string(),
    );
    write(dir, "03_suu.txt", "SUU quote that the extractor cannot read");
    write(
        dir,
        "04_chu_update.json",
        &json!({"quotes": {"CHU": {"total": 12500, "base": 0, "features": {"Flood": ""}}}}).to_string(),
    );
    write(dir, "05_broken.json", "{\"quotes\": ");
    write(dir, "notes.pdf", "%PDF-1.7");
}

fn mock() -> Arc<MockExtractor> {
    // A slow first extraction must not change the merge order.
    Arc::new(MockExtractor::new().with_delayed_response(
        "CHU strata quote",
        chu_extraction(),
        Duration::from_millis(50),
    ))
}

fn driver(extractor: Arc<MockExtractor>) -> BatchDriver {
    let extractor: Arc<dyn QuoteExtractor> = extractor;
    BatchDriver::new(Arc::new(QuoteSchema::builtin()), Some(extractor), 4)
}

fn file_names(paths: impl Iterator<Item = impl AsRef<Path>>) -> Vec<String> {
    paths
        .map(|p| p.as_ref().file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn test_batch_merges_sorted_and_tolerates_failures() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let extractor = mock();
    let driver = driver(extractor.clone());

    let paths = documents::discover(dir.path(), &[]).unwrap();
    assert_eq!(paths.len(), 5);

    let mut master = driver.schema().base_record();
    let report = driver.run(&mut master, paths).await;

    assert_eq!(
        file_names(report.merged.iter().map(|m| &m.path)),
        vec!["01_chu.txt", "02_iis.json", "04_chu_update.json"]
    );
    assert_eq!(file_names(report.failed.iter().map(|f| &f.path)), vec!["03_suu.txt", "05_broken.json"]);
    assert!(report.failed.iter().all(|f| f.stage == FailureStage::Load));
    assert_eq!(extractor.calls().len(), 2);

    assert_eq!(master.quotes.insurers().collect::<Vec<_>>(), vec!["CHU", "IIS"]);
    assert_eq!(master.general_info["scheme_name"], json!("Clearlake"));

    let chu = master.quotes.get("CHU").unwrap();
    assert_eq!(chu.get("base"), Some(&json!(10000)));
    assert_eq!(chu.get("total"), Some(&json!(12500)));
    assert_eq!(chu.get("uw"), Some(&json!(385)));
    assert_eq!(chu.get("uwgst"), Some(&json!(38.5)));
    assert_eq!(chu.mapping("features").unwrap()["Flood"], json!("Included"));
}

#[tokio::test]
async fn test_persist_and_report() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let out = tempfile::tempdir().unwrap();
    let master_path = out.path().join("combined_quotes.json");
    let report_path = out.path().join("report_data.json");

    let driver = driver(mock());
    let mut master = driver.schema().base_record();
    driver
        .run(&mut master, documents::discover(dir.path(), &[]).unwrap())
        .await;
    storage::save_master(&master, &master_path).unwrap();

    let loaded = storage::load_master(&master_path).unwrap().unwrap();
    assert_eq!(loaded, master);

    let settings = ReportSettings {
        panel: vec![
            PanelMember {
                insurer: "Axis".into(),
                underwriter: "XL Insurance Company".into(),
            },
            PanelMember {
                insurer: "CHU".into(),
                underwriter: "QBE Insurance (Australia) Limited".into(),
            },
        ],
        ..ReportSettings::default()
    };
    let data = project(&loaded, &PricingParams::default(), &settings);
    storage::save_report(&data, &report_path).unwrap();

    // CHU: 12500 + 2000 + 200. IIS: 9000 + 1600 + 160.
    assert_eq!(data.fields["CHU.final_total"], "$14,700.00");
    assert_eq!(data.fields["IIS.final_total"], "$10,760.00");
    assert_eq!(data.fields["CHU.uw"], "385");
    assert_eq!(data.fields["CHU.uwgst"], "38.5");
    assert_eq!(data.fields["CHU.features.Building"], "$5,000,000.00");
    assert_eq!(data.fields["recommended.insurer"], "IIS");
    assert_eq!(data.fields["broker_fee_pct"], "20%");

    let written: Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(written["recommended"]["insurer"], json!("IIS"));
    assert_eq!(written["enriched"]["CHU"]["broker_fee"], json!(2000));
    let summary = written["summary"].as_array().unwrap();
    assert_eq!(summary.len(), 3);
    assert_eq!(summary[0]["comment"], json!("Insurer did not respond in time"));
    assert_eq!(summary[2]["comment"], json!("Recommended"));
}

#[tokio::test]
async fn test_rerun_over_persisted_master_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let master_path = dir.path().join("combined_quotes.json");

    let driver = driver(mock());
    let mut master = driver.schema().base_record();
    driver
        .run(&mut master, documents::discover(dir.path(), &[]).unwrap())
        .await;
    storage::save_master(&master, &master_path).unwrap();

    // The master record now sits in the input directory; it must not be
    // picked up as an input document.
    let paths = documents::discover(dir.path(), &[master_path.as_path()]).unwrap();
    assert_eq!(paths.len(), 5);

    let mut rerun = storage::load_master(&master_path).unwrap().unwrap();
    let report = driver.run(&mut rerun, paths).await;

    // 01 briefly restores CHU's earlier total; 04 then reapplies the update.
    assert_eq!(rerun, master);
    assert_eq!(report.merged.len(), 3);
    assert!(report.merged[1].summary.is_noop());
    assert!(report.merged[2].summary.insurers_updated.contains(&"CHU".to_string()));
}

#[tokio::test]
async fn test_extractor_outage_only_fails_text_documents() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let extractor = mock();
    extractor.set_error("HTTP 503: upstream unavailable");

    let driver = driver(extractor);
    let mut master = driver.schema().base_record();
    let report = driver
        .run(&mut master, documents::discover(dir.path(), &[]).unwrap())
        .await;

    assert_eq!(
        file_names(report.failed.iter().map(|f| &f.path)),
        vec!["01_chu.txt", "03_suu.txt", "05_broken.json"]
    );
    assert!(report.failed[0].error.contains("mock-extractor"));
    assert_eq!(master.quotes.insurers().collect::<Vec<_>>(), vec!["IIS", "CHU"]);

    // Only the structured update reached CHU.
    let chu = master.quotes.get("CHU").unwrap();
    assert_eq!(chu.get("total"), Some(&json!(12500)));
    assert_eq!(chu.get("base"), Some(&json!(0)));
}
