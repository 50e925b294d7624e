use chrono::Utc;
use tracing::info;

use crate::encode::Encoder;
use crate::error::PriceError;
use crate::extract::RawListing;
use crate::regress::{LinearModel, Metrics};
use crate::store::{ModelArtifact, ModelStore};
use crate::vocab::{CategoryVocabulary, ATTRIBUTES, DEFAULT_LABEL};

/// Below this many priced rows there is no hold-out split: the model trains
/// and evaluates on the same rows (diagnostic only, logged as such).
const MIN_ROWS_FOR_HOLDOUT: usize = 10;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Whether rows whose every field normalized to the default bucket stay in
    /// the training set.
    pub keep_all_default_rows: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            keep_all_default_rows: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub rows_total: usize,
    pub rows_used: usize,
    pub held_out: usize,
    pub metrics: Metrics,
}

/// One prediction request. All six fields are required non-empty; the field
/// names are exactly the trained model's feature columns.
#[derive(Debug, Clone)]
pub struct PredictionInput {
    pub processor: String,
    pub graphic_card: String,
    pub ram: String,
    pub disk: String,
    pub os: String,
    pub condition: String,
}

impl PredictionInput {
    pub fn get(&self, attribute: &str) -> Option<&str> {
        match attribute {
            "processor" => Some(&self.processor),
            "graphic_card" => Some(&self.graphic_card),
            "ram" => Some(&self.ram),
            "disk" => Some(&self.disk),
            "os" => Some(&self.os),
            "condition" => Some(&self.condition),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), PriceError> {
        for attr in ATTRIBUTES {
            match self.get(attr) {
                Some(v) if !v.trim().is_empty() => {}
                _ => return Err(PriceError::MissingField(attr)),
            }
        }
        Ok(())
    }
}

/// Train a model from raw listings and build the persistable artifact.
///
/// Rows with an absent price are dropped (training-invalid). The artifact
/// carries the vocabulary used here so inference normalizes with exactly the
/// same rules.
pub fn train_artifact(
    listings: &[RawListing],
    opts: &TrainOptions,
) -> Result<(ModelArtifact, TrainReport), PriceError> {
    if listings.is_empty() {
        return Err(PriceError::DataEmpty("no data fetched".into()));
    }

    let vocabulary = CategoryVocabulary::builtin();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut prices: Vec<f64> = Vec::new();
    for listing in listings {
        let Some(price) = listing.price else {
            continue;
        };
        let labels: Vec<String> = ATTRIBUTES
            .iter()
            .map(|attr| vocabulary.normalize(attr, listing.field(attr)))
            .collect();
        if !opts.keep_all_default_rows && labels.iter().all(|l| l == DEFAULT_LABEL) {
            continue;
        }
        rows.push(labels);
        prices.push(price);
    }

    if rows.is_empty() {
        return Err(PriceError::DataEmpty(
            "no rows with a price after extraction".into(),
        ));
    }

    // Deterministic tail hold-out; tiny datasets train on everything.
    let held_out = if rows.len() >= MIN_ROWS_FOR_HOLDOUT {
        rows.len() / 5
    } else {
        0
    };
    let split = rows.len() - held_out;
    let (train_rows, test_rows) = rows.split_at(split);
    let (train_y, test_y) = prices.split_at(split);

    let encoder = Encoder::fit(&ATTRIBUTES, train_rows);
    if encoder.is_empty() {
        return Err(PriceError::DataEmpty("empty feature set".into()));
    }

    let x = encoder.transform(train_rows);
    let model = LinearModel::fit(&x, train_y)?;

    let metrics = if held_out > 0 {
        model.evaluate(&encoder.transform(test_rows), test_y)
    } else {
        info!("dataset too small for a hold-out split, evaluating on training rows");
        model.evaluate(&x, train_y)
    };

    let artifact = ModelArtifact {
        vocabulary,
        encoder,
        model,
        columns: ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
        trained_rows: train_rows.len(),
        metrics,
        trained_at: Utc::now(),
    };
    let report = TrainReport {
        rows_total: listings.len(),
        rows_used: rows.len(),
        held_out,
        metrics,
    };
    Ok((artifact, report))
}

/// Predict a price from a validated input using a trained artifact: normalize
/// with the artifact's vocabulary, encode with its frozen layout, apply the
/// linear model. Unknown raw values land in the default bucket or an all-zero
/// encoding and still produce a finite, non-negative price.
pub fn predict_with(artifact: &ModelArtifact, input: &PredictionInput) -> Result<f64, PriceError> {
    let labels: Vec<String> = artifact
        .columns
        .iter()
        .map(|attr| artifact.vocabulary.normalize(attr, input.get(attr)))
        .collect();
    let features = artifact.encoder.transform_row(&labels);
    Ok(artifact.model.predict_row(&features))
}

/// Owns the current model. The artifact is replaced wholesale after a
/// successful retrain, never mutated field by field, so a reader can never
/// observe a half-updated model.
pub struct Predictor {
    store: ModelStore,
    artifact: Option<ModelArtifact>,
}

impl Predictor {
    /// Load the persisted model if a valid one exists; otherwise start in the
    /// NoModel state (normal for a first run).
    pub fn open(store: ModelStore) -> Self {
        let artifact = store.load();
        Self { store, artifact }
    }

    pub fn is_ready(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.as_ref()
    }

    /// Train, persist, then swap the in-memory model. On any failure the
    /// previous state (Ready or NoModel) is left untouched.
    pub fn train(
        &mut self,
        listings: &[RawListing],
        opts: &TrainOptions,
    ) -> Result<TrainReport, PriceError> {
        let (artifact, report) = train_artifact(listings, opts)?;
        self.store
            .save(&artifact)
            .map_err(|e| PriceError::Persist(e.to_string()))?;
        self.artifact = Some(artifact);
        Ok(report)
    }

    /// Single-item prediction. Rejected immediately while no model is loaded;
    /// never attempts a best-effort guess.
    pub fn predict(&self, input: &PredictionInput) -> Result<f64, PriceError> {
        let artifact = self.artifact.as_ref().ok_or(PriceError::ModelNotReady)?;
        input.validate()?;
        predict_with(artifact, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(
        processor: Option<&str>,
        graphic_card: Option<&str>,
        ram: Option<&str>,
        disk: Option<&str>,
        os: Option<&str>,
        condition: Option<&str>,
        price: Option<f64>,
    ) -> RawListing {
        RawListing {
            processor: processor.map(str::to_string),
            disk: disk.map(str::to_string),
            ram: ram.map(str::to_string),
            os: os.map(str::to_string),
            condition: condition.map(str::to_string),
            graphic_card: graphic_card.map(str::to_string),
            price,
        }
    }

    fn three_row_dataset() -> Vec<RawListing> {
        vec![
            listing(
                Some("Intel i5-4570"),
                Some("GTX 1050"),
                Some("8GB"),
                Some("SSD 256GB"),
                Some("Windows 10"),
                Some("Bardzo dobry"),
                Some(800.0),
            ),
            listing(
                Some("Ryzen 5 3600"),
                Some("RTX 3060"),
                Some("16GB"),
                Some("NVMe"),
                Some("Windows 11"),
                Some("Nowy"),
                Some(1500.0),
            ),
            listing(
                Some("Xeon E5"),
                None,
                Some("32GB"),
                Some("HDD 1TB"),
                None,
                Some("Używany"),
                Some(600.0),
            ),
        ]
    }

    #[test]
    fn end_to_end_monotonic_sanity() {
        let (artifact, report) =
            train_artifact(&three_row_dataset(), &TrainOptions::default()).unwrap();
        assert_eq!(report.rows_used, 3);
        assert_eq!(report.held_out, 0);

        let input = PredictionInput {
            processor: "Ryzen 5 3600".into(),
            graphic_card: "RTX 3060".into(),
            ram: "16GB".into(),
            disk: "NVMe".into(),
            os: "Windows 11".into(),
            condition: "Nowy".into(),
        };
        let price = predict_with(&artifact, &input).unwrap();
        assert!(price.is_finite() && price >= 0.0);
        assert!((price - 1500.0).abs() < (price - 600.0).abs());
        assert!((price - 1500.0).abs() < (price - 800.0).abs());
    }

    #[test]
    fn unseen_category_still_predicts() {
        let (artifact, _) =
            train_artifact(&three_row_dataset(), &TrainOptions::default()).unwrap();
        let input = PredictionInput {
            processor: "PowerPC G5".into(),
            graphic_card: "Voodoo 3".into(),
            ram: "2 GB".into(),
            disk: "ZIP drive".into(),
            os: "BeOS".into(),
            condition: "muzealny".into(),
        };
        let price = predict_with(&artifact, &input).unwrap();
        assert!(price.is_finite());
        assert!(price >= 0.0);
    }

    #[test]
    fn empty_dataset_is_a_named_failure() {
        let err = train_artifact(&[], &TrainOptions::default()).unwrap_err();
        assert!(matches!(err, PriceError::DataEmpty(_)));
    }

    #[test]
    fn all_prices_absent_is_a_named_failure() {
        let rows = vec![listing(Some("Intel i5"), None, None, None, None, None, None)];
        let err = train_artifact(&rows, &TrainOptions::default()).unwrap_err();
        assert!(matches!(err, PriceError::DataEmpty(_)));
    }

    #[test]
    fn all_default_rows_policy() {
        let mut rows = three_row_dataset();
        rows.push(listing(None, None, None, None, None, None, Some(100.0)));

        let keep = TrainOptions {
            keep_all_default_rows: true,
        };
        let (_, report) = train_artifact(&rows, &keep).unwrap();
        assert_eq!(report.rows_used, 4);

        let drop = TrainOptions {
            keep_all_default_rows: false,
        };
        let (_, report) = train_artifact(&rows, &drop).unwrap();
        assert_eq!(report.rows_used, 3);
    }

    #[test]
    fn large_dataset_gets_a_holdout_split() {
        let mut rows = Vec::new();
        for i in 0..20 {
            let price = if i % 2 == 0 { 700.0 } else { 1400.0 };
            let cpu = if i % 2 == 0 { "Intel i5" } else { "Intel i7" };
            rows.push(listing(
                Some(cpu),
                Some("GTX 1050"),
                Some("8GB"),
                Some("SSD"),
                Some("Windows 10"),
                Some("Dobry"),
                Some(price),
            ));
        }
        let (_, report) = train_artifact(&rows, &TrainOptions::default()).unwrap();
        assert_eq!(report.held_out, 4);
        assert!(report.metrics.mse < 1.0);
    }

    #[test]
    fn input_keys_match_trained_columns() {
        let (artifact, _) =
            train_artifact(&three_row_dataset(), &TrainOptions::default()).unwrap();
        let input = PredictionInput {
            processor: "x".into(),
            graphic_card: "x".into(),
            ram: "x".into(),
            disk: "x".into(),
            os: "x".into(),
            condition: "x".into(),
        };
        assert_eq!(artifact.columns.len(), ATTRIBUTES.len());
        for col in &artifact.columns {
            assert!(input.get(col).is_some(), "unrecognized column {}", col);
        }
    }

    #[test]
    fn predictor_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        let mut predictor = Predictor::open(store);
        assert!(!predictor.is_ready());

        let input = PredictionInput {
            processor: "Intel i5".into(),
            graphic_card: "GTX 1050".into(),
            ram: "8GB".into(),
            disk: "SSD".into(),
            os: "Windows 10".into(),
            condition: "Dobry".into(),
        };
        assert!(matches!(
            predictor.predict(&input),
            Err(PriceError::ModelNotReady)
        ));

        // Failed training leaves the state unchanged.
        assert!(predictor.train(&[], &TrainOptions::default()).is_err());
        assert!(!predictor.is_ready());

        predictor
            .train(&three_row_dataset(), &TrainOptions::default())
            .unwrap();
        assert!(predictor.is_ready());
        assert!(predictor.predict(&input).is_ok());

        // Retrain replaces the artifact wholesale and stays Ready.
        predictor
            .train(&three_row_dataset(), &TrainOptions::default())
            .unwrap();
        assert!(predictor.is_ready());

        // A fresh Predictor over the same store reloads to Ready.
        let reopened = Predictor::open(ModelStore::new(dir.path().join("model.json")));
        assert!(reopened.is_ready());
    }

    #[test]
    fn missing_input_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut predictor = Predictor::open(ModelStore::new(dir.path().join("model.json")));
        predictor
            .train(&three_row_dataset(), &TrainOptions::default())
            .unwrap();

        let input = PredictionInput {
            processor: "Intel i5".into(),
            graphic_card: "".into(),
            ram: "8GB".into(),
            disk: "SSD".into(),
            os: "Windows 10".into(),
            condition: "Dobry".into(),
        };
        assert!(matches!(
            predictor.predict(&input),
            Err(PriceError::MissingField("graphic_card"))
        ));
    }
}
