use crate::error::AppError;

/// Runs a fixed-resolution image classifier on one preprocessed image.
///
/// Input is a `[1, 3, S, S]` channel-first tensor of values in `[0, 1]`;
/// output is the flattened probability vector of the first model output.
pub trait InferenceBackend: Send {
    fn input_size(&self) -> u32;

    fn infer(&mut self, input: Vec<f32>, shape: [usize; 4]) -> Result<Vec<f32>, AppError>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;

    use ort::session::Session;
    use ort::value::Tensor;

    use super::InferenceBackend;
    use crate::error::AppError;

    pub struct OnnxBackend {
        session: Session,
        input_name: String,
        input_size: u32,
    }

    impl OnnxBackend {
        pub fn load(model_path: &Path, input_size: u32) -> Result<Self, AppError> {
            if !model_path.is_file() {
                return Err(AppError::Config(format!(
                    "model file not found: {}",
                    model_path.display()
                )));
            }

            let session = Session::builder()
                .and_then(|builder| builder.commit_from_file(model_path))
                .map_err(|e| AppError::Config(format!("model load failed: {e}")))?;
            let input_name = session
                .inputs
                .first()
                .map(|input| input.name.clone())
                .ok_or_else(|| AppError::Config("model declares no inputs".to_string()))?;

            tracing::info!(model = %model_path.display(), input = %input_name, "classifier model loaded");
            Ok(Self {
                session,
                input_name,
                input_size,
            })
        }
    }

    impl InferenceBackend for OnnxBackend {
        fn input_size(&self) -> u32 {
            self.input_size
        }

        fn infer(&mut self, input: Vec<f32>, shape: [usize; 4]) -> Result<Vec<f32>, AppError> {
            let tensor = Tensor::from_array((shape, input))
                .map_err(|e| AppError::Inference(e.to_string()))?;
            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| AppError::Inference(e.to_string()))?;
            let (_, probs) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| AppError::Inference(e.to_string()))?;
            Ok(probs.to_vec())
        }
    }
}
