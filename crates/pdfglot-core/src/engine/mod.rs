//! Document translation engines.
//!
//! An engine takes a whole PDF and produces translated output documents,
//! delegating the text itself to the translation bridge. The layout-preserving
//! work (parsing, re-typesetting, font handling) lives in the engine.

mod babeldoc;

pub use crate::config::OutputFormats;
pub use babeldoc::BabelDocEngine;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::config::Lang;
use crate::error::Result;

/// A single document to translate.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    /// Input PDF path
    pub input: PathBuf,
    /// Directory the outputs land in
    pub output_dir: PathBuf,
    pub source_lang: Lang,
    pub target_lang: Lang,
    /// Which output documents to produce
    pub formats: OutputFormats,
}

/// Kind of output document an engine produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Target language only
    Translated,
    /// Original and translation interleaved
    Dual,
}

impl OutputKind {
    /// Output file name for a given input stem, e.g. "paper" -> "paper_translated.pdf".
    pub fn file_name(self, stem: &str) -> String {
        match self {
            Self::Translated => format!("{stem}_translated.pdf"),
            Self::Dual => format!("{stem}_dual.pdf"),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Translated => "translated",
            Self::Dual => "dual",
        }
    }
}

/// Paths of the documents produced for one input
#[derive(Debug, Clone, Default)]
pub struct JobOutputs {
    pub translated: Option<PathBuf>,
    pub dual: Option<PathBuf>,
}

impl JobOutputs {
    /// All produced paths, translated first.
    pub fn paths(&self) -> Vec<&Path> {
        [self.translated.as_deref(), self.dual.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub const fn is_empty(&self) -> bool {
        self.translated.is_none() && self.dual.is_none()
    }
}

/// Progress and log events emitted by an engine while it runs
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Overall progress for the current document, 0.0 to 100.0
    Progress { percent: f32, stage: String },
    /// A diagnostic line from the engine
    Log { line: String },
}

/// Shared cancellation flag checked across the job pipeline.
///
/// Clones observe the same flag; once set it stays set for the lifetime
/// of the job.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trait for document translation engines
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Engine name for logs and UI
    fn name(&self) -> &'static str;

    /// Translate one document, emitting progress events as it goes.
    ///
    /// Returns the outputs that were produced. Implementations check `cancel`
    /// periodically and return [`Error::Cancelled`](crate::Error::Cancelled)
    /// once it is set.
    async fn translate_document(
        &self,
        job: &DocumentJob,
        events: &mpsc::UnboundedSender<EngineEvent>,
        cancel: &CancelFlag,
    ) -> Result<JobOutputs>;
}

/// Stem used for output naming, e.g. "paper" for "/docs/paper.pdf".
pub fn output_stem(input: &Path) -> String {
    input.file_stem().map_or_else(
        || "document".to_string(),
        |s| s.to_string_lossy().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem(Path::new("/docs/paper.pdf")), "paper");
        assert_eq!(output_stem(Path::new("report.v2.pdf")), "report.v2");
        assert_eq!(output_stem(Path::new("/")), "document");
    }

    #[test]
    fn test_output_kind_file_names() {
        assert_eq!(
            OutputKind::Translated.file_name("paper"),
            "paper_translated.pdf"
        );
        assert_eq!(OutputKind::Dual.file_name("paper"), "paper_dual.pdf");
    }

    #[test]
    fn test_cancel_flag_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_job_outputs_paths() {
        let outputs = JobOutputs {
            translated: Some(PathBuf::from("a_translated.pdf")),
            dual: None,
        };
        assert_eq!(outputs.paths().len(), 1);
        assert!(!outputs.is_empty());
        assert!(JobOutputs::default().is_empty());
    }
}
