//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify and render. Backends work on in-memory buffers only;
//! reading and writing files is the file store's job.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::RenderParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` so independent renders can run on rayon's pool.
pub trait ImageBackend: Sync {
    /// Get the pixel dimensions of an encoded image.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Crop `source` to `params.crop`, resize to `params.width` x
    /// `params.height`, and encode.
    fn render(&self, source: &[u8], params: &RenderParams) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::geometry::CropBox;
    use crate::imaging::params::{OutputFormat, Quality};
    use std::sync::Mutex;

    /// Mock backend that records operations without touching pixels.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub identify_results: Mutex<Vec<Dimensions>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        /// When set, every render fails with this message.
        pub fail_renders: Mutex<Option<String>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(usize),
        Render {
            source_len: usize,
            crop: CropBox,
            width: u32,
            height: u32,
            format: OutputFormat,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(dims: Vec<Dimensions>) -> Self {
            Self {
                identify_results: Mutex::new(dims),
                ..Self::default()
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                fail_renders: Mutex::new(Some(message.to_string())),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn render_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Render { .. }))
                .count()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(source.len()));

            self.identify_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))
        }

        fn render(&self, source: &[u8], params: &RenderParams) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Render {
                source_len: source.len(),
                crop: params.crop,
                width: params.width,
                height: params.height,
                format: params.format,
                quality: params.quality.value(),
            });
            if let Some(message) = self.fail_renders.lock().unwrap().clone() {
                return Err(BackendError::ProcessingFailed(message));
            }
            // Output depends on every input so changed inputs change the bytes
            let mut out = format!(
                "{} {}x{} {:?}|",
                params.crop, params.width, params.height, params.format
            )
            .into_bytes();
            out.extend_from_slice(source);
            Ok(out)
        }
    }

    fn params(w: u32, h: u32) -> RenderParams {
        RenderParams {
            crop: CropBox::new(0, 0, 100, 100).unwrap(),
            width: w,
            height: h,
            format: OutputFormat::Png,
            quality: Quality::new(85),
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(vec![Dimensions {
            width: 800,
            height: 600,
        }]);

        let result = backend.identify(b"abc").unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Identify(3)]);
    }

    #[test]
    fn mock_identify_without_results_errors() {
        assert!(MockBackend::new().identify(b"x").is_err());
    }

    #[test]
    fn mock_records_render() {
        let backend = MockBackend::new();
        backend.render(b"source", &params(50, 40)).unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Render {
                width: 50,
                height: 40,
                quality: 85,
                source_len: 6,
                ..
            }
        ));
    }

    #[test]
    fn mock_render_output_tracks_inputs() {
        let backend = MockBackend::new();
        let a = backend.render(b"one", &params(50, 40)).unwrap();
        let b = backend.render(b"one", &params(50, 40)).unwrap();
        let c = backend.render(b"two", &params(50, 40)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn mock_failing_render() {
        let backend = MockBackend::failing("boom");
        let err = backend.render(b"x", &params(1, 1)).unwrap_err();
        assert_eq!(err.to_string(), "Processing failed: boom");
    }
}
