use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use regex::Regex;
use serde::Deserialize;

use crate::config::DEFAULT_CLASSIFIER_THRESHOLD;
use crate::error::AppError;
use crate::models::asset::AssetTarget;
use crate::models::tag::TagScore;
use crate::services::image_io;
use crate::services::inference::InferenceBackend;

/// Leading output slots that hold rating categories rather than content tags.
pub const RATING_SLOTS: usize = 4;

/// Produces labels for one asset.
///
/// Engines are built once by the caller and shared with tagging tasks through
/// an `Arc`; they hold no per-task state.
pub trait TaggingEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether produced labels are model predictions (as opposed to
    /// deterministic extractions).
    fn is_prediction(&self) -> bool;

    fn predict(&self, target: &AssetTarget) -> Result<Vec<TagScore>, AppError>;
}

// ---------------------------------------------------------------- label table

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelEntry {
    Name(String),
    Record { tag: String },
}

impl LabelEntry {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Record { tag: name } => name,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabelTable {
    List(Vec<LabelEntry>),
    Mapping(BTreeMap<String, LabelEntry>),
}

/// Index-to-label table for classifier output positions.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.is_file() {
            return Err(AppError::Config(format!(
                "label table not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    /// Accepts a JSON list or an object keyed by integer position. Entries are
    /// names, or objects with a `tag` field.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let table: RawLabelTable = serde_json::from_str(raw).map_err(|e| {
            AppError::Config(format!(
                "label table must be a list or an integer-keyed object: {e}"
            ))
        })?;

        let labels = match table {
            RawLabelTable::List(entries) => entries.into_iter().map(LabelEntry::into_name).collect(),
            RawLabelTable::Mapping(mapping) => {
                let mut indexed = mapping
                    .into_iter()
                    .map(|(key, entry)| {
                        key.trim()
                            .parse::<i64>()
                            .map(|index| (index, entry.into_name()))
                            .map_err(|_| {
                                AppError::Config(format!("label table key is not an integer: {key}"))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, name)| name).collect()
            }
        };
        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ---------------------------------------------------------------- classifier

/// Turns a probability vector into labels: rating slots are dropped, positions
/// at or below `threshold` are dropped, the rest is sorted by descending
/// probability.
pub fn select_labels(probs: &[f32], labels: &LabelTable, threshold: f32) -> Vec<TagScore> {
    let mut selected: Vec<TagScore> = probs
        .iter()
        .enumerate()
        .skip(RATING_SLOTS)
        .filter(|(_, p)| **p > threshold)
        .filter_map(|(index, p)| {
            labels
                .get(index)
                .map(|name| TagScore::new(name, f64::from(*p)))
        })
        .collect();
    selected.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    selected
}

/// Decodes, orients and resizes an image into a `[1, 3, size, size]`
/// channel-first tensor with values in `[0, 1]`.
pub fn preprocess(path: &Path, size: u32) -> Result<(Vec<f32>, [usize; 4]), AppError> {
    let rgb = image_io::load_oriented(path)?.into_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Lanczos3);

    let side = size as usize;
    let plane = side * side;
    let mut tensor = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for channel in 0..3 {
            tensor[channel * plane + offset] = f32::from(pixel[channel]) / 255.0;
        }
    }
    Ok((tensor, [1, 3, side, side]))
}

/// Preprocessing runs outside the backend lock, so tasks sharing one engine
/// only take turns for inference itself.
pub struct ClassifierEngine {
    backend: Mutex<Box<dyn InferenceBackend>>,
    input_size: u32,
    labels: LabelTable,
    threshold: f32,
}

impl ClassifierEngine {
    pub fn new(backend: Box<dyn InferenceBackend>, labels: LabelTable) -> Self {
        Self {
            input_size: backend.input_size(),
            backend: Mutex::new(backend),
            labels,
            threshold: DEFAULT_CLASSIFIER_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Loads the ONNX model and label table named by `config`. Missing files
    /// are configuration errors.
    #[cfg(feature = "onnx")]
    pub fn from_config(config: &crate::config::CatalogConfig) -> Result<Self, AppError> {
        let labels = LabelTable::load(&config.label_path())?;
        let backend = crate::services::inference::OnnxBackend::load(
            &config.model_path(),
            config.model_input_size,
        )?;
        Ok(Self::new(Box::new(backend), labels).with_threshold(config.classifier_threshold))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl TaggingEngine for ClassifierEngine {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn is_prediction(&self) -> bool {
        true
    }

    fn predict(&self, target: &AssetTarget) -> Result<Vec<TagScore>, AppError> {
        let (input, shape) = preprocess(Path::new(&target.file_path), self.input_size)?;
        let probs = self
            .backend
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .infer(input, shape)?;

        Ok(select_labels(&probs, &self.labels, self.threshold))
    }
}

// ---------------------------------------------------------------- pattern

/// Extracts labels from file names with a regular expression.
///
/// Each match contributes its first capture group, or the whole match when the
/// pattern has no groups. A pattern that does not compile is reported on every
/// call instead of at construction, so a bad pattern costs labels, not the task.
pub struct PatternEngine {
    pattern: String,
    compiled: Result<Regex, regex::Error>,
}

impl PatternEngine {
    pub fn new(pattern: &str) -> Self {
        let compiled = Regex::new(pattern);
        if let Err(err) = &compiled {
            tracing::warn!(pattern, error = %err, "tagging pattern does not compile");
        }
        Self {
            pattern: pattern.to_string(),
            compiled,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn extract(&self, file_name: &str) -> Result<Vec<TagScore>, AppError> {
        let regex = self
            .compiled
            .as_ref()
            .map_err(|e| AppError::Pattern(e.clone()))?;
        let group = usize::from(regex.captures_len() > 1);

        let mut seen = HashSet::new();
        let mut labels = Vec::new();
        for captures in regex.captures_iter(file_name) {
            let Some(found) = captures.get(group) else {
                continue;
            };
            let label = found.as_str().trim();
            if !label.is_empty() && seen.insert(label) {
                labels.push(TagScore::new(label, 1.0));
            }
        }
        Ok(labels)
    }
}

impl TaggingEngine for PatternEngine {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn is_prediction(&self) -> bool {
        false
    }

    fn predict(&self, target: &AssetTarget) -> Result<Vec<TagScore>, AppError> {
        self.extract(&target.file_name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Backend returning a fixed probability vector and recording input shapes.
    pub(crate) struct FixedBackend {
        pub probs: Vec<f32>,
        pub size: u32,
    }

    impl InferenceBackend for FixedBackend {
        fn input_size(&self) -> u32 {
            self.size
        }

        fn infer(&mut self, input: Vec<f32>, shape: [usize; 4]) -> Result<Vec<f32>, AppError> {
            assert_eq!(input.len(), shape.iter().product::<usize>());
            Ok(self.probs.clone())
        }
    }

    fn labels(names: &[&str]) -> LabelTable {
        LabelTable::new(names.iter().map(|n| n.to_string()).collect())
    }

    fn target(path: &Path, name: &str) -> AssetTarget {
        AssetTarget {
            id: 1,
            file_path: path.to_string_lossy().to_string(),
            file_name: name.to_string(),
        }
    }

    #[test]
    fn test_select_labels_skips_ratings_and_sorts() {
        let table = labels(&["r1", "r2", "r3", "r4", "cat", "dog", "tree"]);
        let probs = [0.1, 0.1, 0.1, 0.1, 0.5, 0.2, 0.9];

        let result = select_labels(&probs, &table, 0.35);

        let names: Vec<&str> = result.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["tree", "cat"]);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_select_labels_excludes_ratings_even_when_confident() {
        let table = labels(&["general", "sensitive", "questionable", "explicit", "cat"]);
        let probs = [0.99, 0.99, 0.99, 0.99, 0.1];
        assert!(select_labels(&probs, &table, 0.35).is_empty());
    }

    #[test]
    fn test_select_labels_threshold_is_strict() {
        let table = labels(&["r1", "r2", "r3", "r4", "edge"]);
        assert!(select_labels(&[0.0, 0.0, 0.0, 0.0, 0.35], &table, 0.35).is_empty());
    }

    #[test]
    fn test_select_labels_ignores_positions_past_table() {
        let table = labels(&["r1", "r2", "r3", "r4", "cat"]);
        let result = select_labels(&[0.0, 0.0, 0.0, 0.0, 0.8, 0.9], &table, 0.35);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "cat");
    }

    #[test]
    fn test_label_table_from_list() {
        let table = LabelTable::from_json(r#"["a", "b", {"tag": "c", "count": 3}]"#).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(2), Some("c"));
    }

    #[test]
    fn test_label_table_from_mapping_sorts_numerically() {
        let table = LabelTable::from_json(r#"{"10": "ten", "2": "two", "0": "zero"}"#).unwrap();
        assert_eq!(table, labels(&["zero", "two", "ten"]));
    }

    #[test]
    fn test_label_table_mapping_accepts_tag_records() {
        let table =
            LabelTable::from_json(r#"{"1": {"tag": "dog", "count": 9}, "0": "cat"}"#).unwrap();
        assert_eq!(table, labels(&["cat", "dog"]));
    }

    #[test]
    fn test_label_table_rejects_other_shapes() {
        assert!(matches!(LabelTable::from_json("42"), Err(AppError::Config(_))));
        assert!(matches!(
            LabelTable::from_json(r#"{"first": "a"}"#),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            LabelTable::from_json(r#"{"0": 7}"#),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_label_table_missing_file_is_config_error() {
        let err = LabelTable::load(Path::new("/nonexistent/tag_mapping.json")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_preprocess_produces_channel_first_unit_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(30, 20, Rgb([255, 0, 51])).save(&path).unwrap();

        let (tensor, shape) = preprocess(&path, 8).unwrap();

        assert_eq!(shape, [1, 3, 8, 8]);
        assert_eq!(tensor.len(), 3 * 64);
        assert!(tensor[..64].iter().all(|v| (v - 1.0).abs() < 1e-3));
        assert!(tensor[64..128].iter().all(|v| v.abs() < 1e-3));
        assert!(tensor[128..].iter().all(|v| (v - 0.2).abs() < 1e-2));
    }

    #[test]
    fn test_classifier_engine_runs_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        RgbImage::from_pixel(16, 16, Rgb([0, 128, 0])).save(&path).unwrap();

        let engine = ClassifierEngine::new(
            Box::new(FixedBackend {
                probs: vec![0.1, 0.1, 0.1, 0.1, 0.5, 0.2, 0.9],
                size: 8,
            }),
            labels(&["r1", "r2", "r3", "r4", "cat", "dog", "tree"]),
        );

        let result = engine.predict(&target(&path, "photo.png")).unwrap();
        let names: Vec<&str> = result.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["tree", "cat"]);
        assert!(engine.is_prediction());
    }

    #[test]
    fn test_classifier_engine_fails_on_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"nope").unwrap();

        let engine = ClassifierEngine::new(
            Box::new(FixedBackend {
                probs: vec![],
                size: 8,
            }),
            labels(&[]),
        );
        assert!(engine.predict(&target(&path, "broken.png")).is_err());
    }

    /// Signals when inference starts and blocks until released.
    struct GatedBackend {
        entered: std::sync::mpsc::Sender<()>,
        release: std::sync::mpsc::Receiver<()>,
    }

    impl InferenceBackend for GatedBackend {
        fn input_size(&self) -> u32 {
            8
        }

        fn infer(&mut self, _input: Vec<f32>, _shape: [usize; 4]) -> Result<Vec<f32>, AppError> {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_decoding_does_not_wait_for_running_inference() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::from_pixel(8, 8, Rgb([9, 9, 9])).save(&good).unwrap();
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"nope").unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let engine = ClassifierEngine::new(
            Box::new(GatedBackend {
                entered: entered_tx,
                release: release_rx,
            }),
            labels(&[]),
        );

        std::thread::scope(|scope| {
            let running = scope.spawn(|| engine.predict(&target(&good, "good.png")));
            entered_rx.recv().unwrap();

            // inference holds the backend; decoding another file still proceeds
            let err = engine.predict(&target(&broken, "broken.png")).unwrap_err();
            assert!(matches!(err, AppError::Image(_) | AppError::Io(_)));

            release_tx.send(()).unwrap();
            assert!(running.join().unwrap().unwrap().is_empty());
        });
    }

    #[test]
    fn test_pattern_extracts_capture_group() {
        let engine = PatternEngine::new("(.*?)_image");
        let result = engine.extract("sunset_image_02").unwrap();
        assert_eq!(result, vec![TagScore::new("sunset", 1.0)]);
        assert!(!engine.is_prediction());
    }

    #[test]
    fn test_pattern_without_group_uses_whole_match_and_dedups() {
        let engine = PatternEngine::new("[a-z]+");
        let result = engine.extract("cat_dog_cat.png").unwrap();
        let names: Vec<&str> = result.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "dog", "png"]);
    }

    #[test]
    fn test_pattern_drops_empty_matches() {
        let engine = PatternEngine::new("(x*)");
        assert!(engine.extract("abc").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern_errors_per_call() {
        let engine = PatternEngine::new("(unclosed");
        assert_eq!(engine.pattern(), "(unclosed");
        let err = engine
            .predict(&target(Path::new("/x/a.png"), "a.png"))
            .unwrap_err();
        assert!(matches!(err, AppError::Pattern(_)));
    }
}
