//! Test Request Producer
//!
//! Sends randomized loan applications to the prediction service over NATS
//! request/reply and logs the responses. Some requests deliberately carry
//! unseen categories, omit fields or add fields the model never saw.

use anyhow::Context;
use credit_risk_pipeline::{config::AppConfig, logging::init_tracing, PredictionResponse};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Application generator for testing
struct ApplicationGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
}

impl ApplicationGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
        }
    }

    /// A complete, well-formed application
    fn generate_typical(&mut self) -> Map<String, Value> {
        self.counter += 1;
        let loan_amnt = self.rng.gen_range(1_000..40_000) as f64;
        let term = self.random_choice(&[" 36 months", " 60 months"]);
        let grade = self.random_choice(&["A", "B", "C", "D", "E", "F", "G"]);
        let emp_length = self.random_choice(&["< 1 year", "2 years", "5 years", "10+ years"]);
        let home = self.random_choice(&["RENT", "MORTGAGE", "OWN"]);
        let purpose =
            self.random_choice(&["debt_consolidation", "credit_card", "home_improvement", "car"]);
        let state = self.random_choice(&["CA", "NY", "TX", "FL", "IL"]);

        let value = json!({
            "loan_amnt": loan_amnt,
            "term": term,
            "int_rate": (self.rng.gen_range(5.0..30.0_f64) * 100.0).round() / 100.0,
            "grade": grade,
            "emp_length": emp_length,
            "home_ownership": home,
            "annual_inc": self.rng.gen_range(20_000..250_000),
            "purpose": purpose,
            "addr_state": state,
            "dti": format!("{:.1}%", self.rng.gen_range(0.0..40.0_f64)),
            "fico_score": self.rng.gen_range(580..850),
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// An application the encoder has to repair: unseen categories, missing
    /// fields and fields outside the schema.
    fn generate_irregular(&mut self) -> Map<String, Value> {
        let mut application = self.generate_typical();

        if self.rng.gen_bool(0.5) {
            application.insert("grade".into(), json!("Z"));
            application.insert("home_ownership".into(), json!("HOUSEBOAT"));
        }
        for field in ["dti", "emp_length", "fico_score"] {
            if self.rng.gen_bool(0.4) {
                application.remove(field);
            }
        }
        if self.rng.gen_bool(0.5) {
            application.insert("referral_code".into(), json!(format!("ref_{}", self.counter)));
        }
        if self.rng.gen_bool(0.2) {
            application.insert("annual_inc".into(), Value::Null);
        }
        application
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging, env!("CARGO_BIN_NAME"))?;

    info!("Starting Test Request Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or(&config.serving.nats_url);
    let subject = args
        .get(2)
        .map(|s| s.as_str())
        .unwrap_or(&config.serving.request_subject);
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let irregular_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.2);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        irregular_rate = irregular_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, irregular_rate, delay_ms).await;
        }
    };

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();

    let (mut scored, mut failed, mut defaults) = (0u64, 0u64, 0u64);

    for i in 0..count {
        let application = if rng.gen_bool(irregular_rate) {
            generator.generate_irregular()
        } else {
            generator.generate_typical()
        };
        let payload = serde_json::to_vec(&application)?;

        let reply = client
            .request(subject.to_string(), payload.into())
            .await
            .context("Prediction request failed")?;

        match serde_json::from_slice::<PredictionResponse>(&reply.payload) {
            Ok(PredictionResponse::Success {
                prediction,
                probability,
            }) => {
                scored += 1;
                defaults += u64::from(prediction);
                info!(
                    request = i + 1,
                    prediction = prediction,
                    p_default = probability[1],
                    "Scored"
                );
            }
            Ok(PredictionResponse::Failure { error, kind }) => {
                failed += 1;
                warn!(request = i + 1, kind = %kind, error = %error, "Service returned an error");
            }
            Err(e) => {
                failed += 1;
                warn!(request = i + 1, error = %e, "Unreadable response");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} scored, {} predicted default, {} failed)",
        count, scored, defaults, failed
    );

    Ok(())
}

async fn run_dry_mode(count: u64, irregular_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let application = if rng.gen_bool(irregular_rate) {
            generator.generate_irregular()
        } else {
            generator.generate_typical()
        };

        let json = serde_json::to_string_pretty(&application)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample application {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
