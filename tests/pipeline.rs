//! Train, persist, reload and serve against a small synthetic loan book.

use credit_risk_pipeline::dataset::{load_accepted, load_for_reconciliation};
use credit_risk_pipeline::encoder::Encoder;
use credit_risk_pipeline::evaluation::evaluate;
use credit_risk_pipeline::models::{
    predict_json, predict_one, train_artifact, Classifier, GbdtFitter, Hyperparameters,
    TrainedArtifact,
};
use credit_risk_pipeline::split::split;
use credit_risk_pipeline::{PredictionResponse, RawRecord, RawValue};
use serde_json::json;
use std::fmt::Write as _;
use std::path::Path;

const GRADES: [&str; 4] = ["A", "B", "C", "D"];
const HOMES: [&str; 3] = ["RENT", "MORTGAGE", "OWN"];

/// Loans with a FICO score under 660 are charged off.
fn write_accepted(path: &Path, rows: usize) {
    let mut csv = String::from(
        "id,loan_amnt,grade,home_ownership,dti,fico_score,emp_title,loan_status\n",
    );
    for i in 0..rows {
        let fico = 600 + (i * 37) % 200;
        let status = if fico < 660 { "Charged Off" } else { "Fully Paid" };
        let dti = if i % 11 == 0 {
            String::new()
        } else {
            format!("{}.{}", (i * 7) % 35, i % 10)
        };
        writeln!(
            csv,
            "{},{},{},{},{},{},engineer {},{}",
            i,
            5_000 + (i * 311) % 30_000,
            GRADES[i % GRADES.len()],
            HOMES[(i / 3) % HOMES.len()],
            dti,
            fico,
            i,
            status
        )
        .unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn write_rejected(path: &Path) {
    let csv = "\
Amount Requested,Application Date,Loan Title,Risk_Score,Debt-To-Income Ratio,Zip Code,State,Employment Length
1000,2007-05-26,Wedding,680,10%,481xx,NM,4 years
5000,2007-05-27,Consolidation,,38.64%,010xx,MA,< 1 year
";
    std::fs::write(path, csv).unwrap();
}

fn params() -> Hyperparameters {
    Hyperparameters {
        n_estimators: 30,
        max_depth: 3,
        learning_rate: 0.3,
        subsample: 1.0,
        colsample_bytree: 1.0,
        min_leaf_size: 1,
    }
}

#[test]
fn test_train_save_load_predict() {
    let dir = tempfile::tempdir().unwrap();
    let accepted_path = dir.path().join("accepted.csv");
    let rejected_path = dir.path().join("rejected.csv");
    let artifact_path = dir.path().join("models").join("artifact.json");
    write_accepted(&accepted_path, 300);
    write_rejected(&rejected_path);

    let dataset = load_accepted(&accepted_path, &Encoder::accepted()).unwrap();
    let names: Vec<&str> = dataset.schema.names().collect();
    assert_eq!(
        names,
        vec!["loan_amnt", "grade", "home_ownership", "dti", "fico_score"]
    );

    let split = split(&dataset.features, &dataset.labels, 0.2, 42).unwrap();
    assert_eq!(split.test_x.n_rows(), 60);

    let artifact = train_artifact(
        &GbdtFitter,
        dataset.schema.clone(),
        &split.train_x,
        &split.train_y,
        &params(),
    )
    .unwrap();

    let report = evaluate(&artifact, &split.test_x, &split.test_y, 0.5).unwrap();
    assert!(report.accuracy >= 0.8, "holdout accuracy {}", report.accuracy);

    artifact.save(&artifact_path).unwrap();
    let loaded: TrainedArtifact = TrainedArtifact::load(&artifact_path).unwrap();
    assert_eq!(loaded.schema(), artifact.schema());
    assert_eq!(
        loaded.model().predict_proba(&split.test_x).unwrap(),
        artifact.model().predict_proba(&split.test_x).unwrap()
    );

    // Unseen grade, missing dti and an extra field still score
    let record = RawRecord::new()
        .with("loan_amnt", RawValue::Number(12_000.0))
        .with("grade", RawValue::Text("Z".into()))
        .with("home_ownership", RawValue::Text("RENT".into()))
        .with("fico_score", RawValue::Number(610.0))
        .with("referral_code", RawValue::Text("abc".into()));
    match predict_one(&record, &loaded) {
        PredictionResponse::Success { probability, .. } => {
            assert!((probability[0] + probability[1] - 1.0).abs() < 1e-9);
        }
        other => panic!("expected a prediction, got {:?}", other),
    }

    let response = predict_json(&json!({}), &loaded);
    assert!(response.is_success());

    let response = predict_json(&json!("not an object"), &loaded);
    assert_eq!(response.error_kind(), Some("malformed_input"));

    // Rejected applications conform to the accepted schema unchanged
    let rejected = load_for_reconciliation(&rejected_path, loaded.schema()).unwrap();
    assert_eq!(rejected.n_rows(), 2);
    assert_eq!(rejected.n_features(), loaded.schema().len());
    let fico_slot = loaded.schema().index_of("fico_score").unwrap();
    let dti_slot = loaded.schema().index_of("dti").unwrap();
    assert_eq!(rejected.row(0)[fico_slot], 680.0);
    assert_eq!(rejected.row(0)[dti_slot], 10.0);
    assert_eq!(rejected.row(1)[fico_slot], 0.0);
    assert_eq!(loaded.schema(), &dataset.schema);
}
