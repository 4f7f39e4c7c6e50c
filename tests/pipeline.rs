//! Service-level tests with in-process fakes for the engine and the PDF
//! backend. No external tools or pdfium needed.
//!
//! Fake documents are small text files:
//!
//! ```text
//! %PDF-fake
//! pages=60
//! text=no
//! ranges=0-25,25-50
//! ```

use async_trait::async_trait;
use edgequake_pdfocr::{
    ChunkJob, DocumentBackend, ErrorCode, ExistingTextPolicy, JobStatus, OcrConfig, OcrEngine,
    OcrService, PdfOcrError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────

fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|l| l.strip_prefix(key).and_then(|r| r.strip_prefix('=')))
}

fn write_fake(path: &Path, pages: usize, text: bool, ranges: &str) {
    std::fs::write(
        path,
        format!(
            "%PDF-fake\npages={pages}\ntext={}\nranges={ranges}\n",
            if text { "yes" } else { "no" }
        ),
    )
    .unwrap();
}

#[derive(Default)]
struct FakeBackend {
    missing: bool,
    /// `has_text_layer` fails, like a page with a broken font.
    text_unreadable: bool,
    /// `concatenate` writes one page fewer than it was given.
    merge_drops_page: bool,
    /// `concatenate` fails outright.
    merge_errors: bool,
}

impl FakeBackend {
    fn read(path: &Path) -> Result<String, PdfOcrError> {
        std::fs::read_to_string(path).map_err(|e| PdfOcrError::io(path, e))
    }
}

impl DocumentBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn check_available(&self) -> Result<(), PdfOcrError> {
        if self.missing {
            Err(PdfOcrError::DependencyMissing {
                tools: vec!["pdfium".into()],
            })
        } else {
            Ok(())
        }
    }

    fn page_count(&self, path: &Path) -> Result<usize, PdfOcrError> {
        let text = Self::read(path)?;
        field(&text, "pages")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| PdfOcrError::InvalidDocument {
                path: path.to_path_buf(),
                detail: "no page count".into(),
            })
    }

    fn has_text_layer(&self, path: &Path) -> Result<bool, PdfOcrError> {
        if self.text_unreadable {
            return Err(PdfOcrError::InvalidDocument {
                path: path.to_path_buf(),
                detail: "page 2: cannot load text".into(),
            });
        }
        Ok(field(&Self::read(path)?, "text") == Some("yes"))
    }

    fn extract_range(
        &self,
        source: &Path,
        start: usize,
        end: usize,
        dest: &Path,
    ) -> Result<(), PdfOcrError> {
        let total = self.page_count(source)?;
        assert!(start < end && end <= total, "bad range {start}..{end} of {total}");
        write_fake(dest, end - start, false, &format!("{start}-{end}"));
        Ok(())
    }

    fn concatenate(&self, sources: &[PathBuf], dest: &Path) -> Result<(), PdfOcrError> {
        if self.merge_errors {
            return Err(PdfOcrError::MergeFailure {
                detail: "chunk 2 has a damaged xref table".into(),
            });
        }
        let mut pages = 0;
        let mut ranges = Vec::new();
        for s in sources {
            let text = Self::read(s)?;
            pages += self.page_count(s)?;
            ranges.push(field(&text, "ranges").unwrap_or("").to_string());
        }
        if self.merge_drops_page {
            pages -= 1;
        }
        write_fake(dest, pages, true, &ranges.join(","));
        Ok(())
    }
}

#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<usize>>,
    fail_on: Option<usize>,
    timeout_on: Option<usize>,
    panic_on: Option<usize>,
    delay: Duration,
    missing: Vec<String>,
}

impl FakeEngine {
    fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_dependencies(&self) -> Result<(), PdfOcrError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(PdfOcrError::DependencyMissing {
                tools: self.missing.clone(),
            })
        }
    }

    async fn process(&self, job: &ChunkJob<'_>) -> Result<PathBuf, PdfOcrError> {
        self.calls.lock().unwrap().push(job.chunk);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_on == Some(job.chunk) {
            panic!("engine exploded on chunk {}", job.chunk);
        }
        if self.timeout_on == Some(job.chunk) {
            return Err(PdfOcrError::EngineTimeout {
                chunk: job.chunk,
                secs: job.timeout.as_secs(),
            });
        }
        if self.fail_on == Some(job.chunk) {
            return Err(PdfOcrError::EngineFailure {
                chunk: job.chunk,
                exit_code: Some(2),
                tail: "tesseract: boom".into(),
            });
        }
        std::fs::copy(job.input, job.output).map_err(|e| PdfOcrError::io(job.output, e))?;
        Ok(job.output.to_path_buf())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    dir: TempDir,
    engine: Arc<FakeEngine>,
    service: OcrService,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    fn new(engine: FakeEngine, backend: FakeBackend, tweak: impl FnOnce(&mut OcrConfig)) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        let mut config = OcrConfig::builder()
            .work_dir(dir.path().join("work"))
            .build()
            .unwrap();
        tweak(&mut config);
        let engine = Arc::new(engine);
        let service = OcrService::with_components(config, engine.clone(), Arc::new(backend));
        Self {
            dir,
            engine,
            service,
        }
    }

    fn simple() -> Self {
        Self::new(FakeEngine::default(), FakeBackend::default(), |_| {})
    }

    fn doc(&self, name: &str, pages: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        write_fake(&path, pages, false, "source");
        path
    }

    fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    /// Nothing published or staged in the output directory.
    fn outputs_are_empty(&self) -> bool {
        std::fs::read_dir(self.dir.path().join("out"))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    fn workspace_is_empty(&self) -> bool {
        std::fs::read_dir(self.dir.path().join("work"))
            .unwrap()
            .next()
            .is_none()
    }
}

async fn wait_for<F: Fn(&edgequake_pdfocr::JobStatusView) -> bool>(
    service: &OcrService,
    id: &edgequake_pdfocr::JobId,
    pred: F,
) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if pred(&service.status(id).await.unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sixty_pages_complete_in_three_ordered_chunks() {
    let h = Harness::simple();
    let input = h.doc("scan.pdf", 60);
    let output = h.out("scan_OCR.pdf");

    let id = h.service.submit(&input, &output).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
    assert_eq!(job.progress, 100);
    assert_eq!(job.total_pages, Some(60));
    assert_eq!(job.total_chunks, Some(3));
    assert_eq!(job.current_chunk, Some(3));
    assert_eq!(job.pages_processed, Some(60));
    assert_eq!(h.engine.calls(), vec![1, 2, 3]);

    let merged = std::fs::read_to_string(h.service.retrieve(&id).await.unwrap()).unwrap();
    assert_eq!(field(&merged, "pages"), Some("60"));
    assert_eq!(field(&merged, "ranges"), Some("0-25,25-50,50-60"));
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn small_document_is_one_chunk() {
    let h = Harness::simple();
    let id = h
        .service
        .submit(h.doc("a.pdf", 10), h.out("a_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();
    assert_eq!(job.total_chunks, Some(1));
    assert_eq!(h.engine.calls(), vec![1]);
}

#[tokio::test]
async fn many_pages_use_reduced_chunks() {
    let h = Harness::simple();
    let id = h
        .service
        .submit(h.doc("big.pdf", 200), h.out("big_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_chunks, Some(14));
    assert_eq!(job.pages_processed, Some(200));
}

#[tokio::test]
async fn progress_never_decreases_and_ends_at_100() {
    let h = Harness::new(
        FakeEngine {
            delay: Duration::from_millis(15),
            ..Default::default()
        },
        FakeBackend::default(),
        |c| c.pages_per_chunk = 5,
    );
    let id = h
        .service
        .submit(h.doc("p.pdf", 40), h.out("p_OCR.pdf"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let view = h.service.status(&id).await.unwrap();
        seen.push(view.progress);
        if view.status.is_terminal() {
            assert_eq!(view.status, JobStatus::Completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.iter().any(|p| (10..95).contains(p)), "{seen:?}");
}

#[tokio::test]
async fn failure_on_chunk_two_stops_the_job() {
    let h = Harness::new(
        FakeEngine {
            fail_on: Some(2),
            ..Default::default()
        },
        FakeBackend::default(),
        |_| {},
    );
    let output = h.out("f_OCR.pdf");
    let id = h.service.submit(h.doc("f.pdf", 60), &output).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.status, JobStatus::Error);
    let err = job.error.unwrap();
    assert_eq!(err.code, ErrorCode::EngineFailure);
    assert_eq!(err.diagnostic.as_deref(), Some("tesseract: boom"));
    assert!(err.message.contains("chunk 2"));
    assert!(!err.message.contains("tesseract: boom"));
    assert_eq!(h.engine.calls(), vec![1, 2]);

    assert!(!output.exists());
    assert!(matches!(
        h.service.retrieve(&id).await.unwrap_err(),
        PdfOcrError::NotReady { .. }
    ));
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn chunk_timeout_ends_the_job() {
    let h = Harness::new(
        FakeEngine {
            timeout_on: Some(3),
            ..Default::default()
        },
        FakeBackend::default(),
        |c| c.chunk_timeout_secs = 7,
    );
    let output = h.out("t_OCR.pdf");
    let id = h.service.submit(h.doc("t.pdf", 100), &output).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.status, JobStatus::Error);
    let err = job.error.unwrap();
    assert_eq!(err.code, ErrorCode::EngineTimeout);
    assert!(err.message.contains("7s"), "{}", err.message);
    assert_eq!(h.engine.calls(), vec![1, 2, 3]);

    assert!(!output.exists());
    assert!(matches!(
        h.service.retrieve(&id).await.unwrap_err(),
        PdfOcrError::NotReady { .. }
    ));
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn merge_page_mismatch_ends_the_job() {
    let h = Harness::new(
        FakeEngine::default(),
        FakeBackend {
            merge_drops_page: true,
            ..Default::default()
        },
        |_| {},
    );
    let output = h.out("m_OCR.pdf");
    let id = h.service.submit(h.doc("m.pdf", 60), &output).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();

    let err = job.error.unwrap();
    assert_eq!(err.code, ErrorCode::MergeFailure);
    assert!(err.message.contains("59"), "{}", err.message);
    assert_eq!(h.engine.calls(), vec![1, 2, 3]);

    assert!(!output.exists());
    assert!(h.outputs_are_empty());
    assert!(matches!(
        h.service.retrieve(&id).await.unwrap_err(),
        PdfOcrError::NotReady { .. }
    ));
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn merge_error_ends_the_job() {
    let h = Harness::new(
        FakeEngine::default(),
        FakeBackend {
            merge_errors: true,
            ..Default::default()
        },
        |_| {},
    );
    let output = h.out("x_OCR.pdf");
    let id = h.service.submit(h.doc("x.pdf", 30), &output).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.unwrap().code, ErrorCode::MergeFailure);
    assert!(h.outputs_are_empty());
    assert!(matches!(
        h.service.retrieve(&id).await.unwrap_err(),
        PdfOcrError::NotReady { .. }
    ));
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn unreadable_text_does_not_fail_recognition() {
    let h = Harness::new(
        FakeEngine::default(),
        FakeBackend {
            text_unreadable: true,
            ..Default::default()
        },
        |_| {},
    );
    let id = h
        .service
        .submit(h.doc("fonts.pdf", 10), h.out("fonts_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
    assert_eq!(h.engine.calls(), vec![1]);
}

#[tokio::test]
async fn too_many_pages_never_reaches_the_engine() {
    let h = Harness::simple();
    let id = h
        .service
        .submit(h.doc("huge.pdf", 400), h.out("huge_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.error.unwrap().code, ErrorCode::TooManyPages);
    assert_eq!(job.total_pages, Some(400));
    assert_eq!(job.total_chunks, None);
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn empty_document_never_reaches_the_engine() {
    let h = Harness::simple();
    let id = h
        .service
        .submit(h.doc("empty.pdf", 0), h.out("empty_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.error.unwrap().code, ErrorCode::EmptyDocument);
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn non_pdf_input_is_invalid() {
    let h = Harness::simple();
    let input = h.dir.path().join("notes.pdf");
    std::fs::write(&input, "just some text").unwrap();

    let id = h.service.submit(&input, h.out("n_OCR.pdf")).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();
    assert_eq!(job.error.unwrap().code, ErrorCode::InvalidDocument);
}

#[tokio::test]
async fn oversized_input_is_rejected() {
    let h = Harness::new(FakeEngine::default(), FakeBackend::default(), |c| {
        c.max_input_bytes = 8
    });
    let id = h
        .service
        .submit(h.doc("s.pdf", 3), h.out("s_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();
    assert_eq!(job.error.unwrap().code, ErrorCode::FileTooLarge);
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn missing_tools_are_reported_together() {
    let h = Harness::new(
        FakeEngine {
            missing: vec!["tesseract".into(), "gs".into()],
            ..Default::default()
        },
        FakeBackend {
            missing: true,
            ..Default::default()
        },
        |_| {},
    );
    let id = h
        .service
        .submit(h.doc("d.pdf", 5), h.out("d_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();

    let err = job.error.unwrap();
    assert_eq!(err.code, ErrorCode::DependencyMissing);
    assert!(err.message.contains("tesseract, gs, pdfium"), "{}", err.message);
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn two_submissions_are_independent() {
    let h = Harness::simple();
    let input = h.doc("same.pdf", 30);
    let out_a = h.out("a.pdf");
    let out_b = h.out("b.pdf");

    let a = h.service.submit(&input, &out_a).await.unwrap();
    let b = h.service.submit(&input, &out_b).await.unwrap();
    assert_ne!(a, b);

    let ja = h.service.wait(&a).await.unwrap();
    let jb = h.service.wait(&b).await.unwrap();
    assert_eq!(ja.status, JobStatus::Completed);
    assert_eq!(jb.status, JobStatus::Completed);
    assert_eq!(h.service.retrieve(&a).await.unwrap(), out_a);
    assert_eq!(h.service.retrieve(&b).await.unwrap(), out_b);
    assert!(out_a.exists() && out_b.exists());
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn cancel_running_job_stops_before_next_chunk() {
    let h = Harness::new(
        FakeEngine {
            delay: Duration::from_millis(150),
            ..Default::default()
        },
        FakeBackend::default(),
        |c| c.pages_per_chunk = 5,
    );
    let output = h.out("c_OCR.pdf");
    let id = h.service.submit(h.doc("c.pdf", 25), &output).await.unwrap();

    wait_for(&h.service, &id, |v| v.current_chunk == Some(1)).await;
    let view = h.service.cancel(&id).await.unwrap();
    assert_eq!(view.status, JobStatus::Processing);

    let job = h.service.wait(&id).await.unwrap();
    assert_eq!(job.error.unwrap().code, ErrorCode::Cancelled);
    assert!(h.engine.calls().len() < 5);
    assert!(!output.exists());
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn cancel_queued_job_is_immediate() {
    let h = Harness::new(
        FakeEngine {
            delay: Duration::from_millis(100),
            ..Default::default()
        },
        FakeBackend::default(),
        |c| c.max_concurrent_jobs = 1,
    );
    let first = h
        .service
        .submit(h.doc("1.pdf", 10), h.out("1_OCR.pdf"))
        .await
        .unwrap();
    wait_for(&h.service, &first, |v| v.status == JobStatus::Processing).await;

    let second = h
        .service
        .submit(h.doc("2.pdf", 10), h.out("2_OCR.pdf"))
        .await
        .unwrap();
    let view = h.service.cancel(&second).await.unwrap();
    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.error.unwrap().code, ErrorCode::Cancelled);

    assert_eq!(
        h.service.wait(&first).await.unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(h.engine.calls(), vec![1]);
    assert!(matches!(
        h.service.cancel(&second).await.unwrap_err(),
        PdfOcrError::JobFinalized { .. }
    ));
}

#[tokio::test]
async fn submissions_beyond_capacity_are_refused() {
    let h = Harness::new(
        FakeEngine {
            delay: Duration::from_millis(200),
            ..Default::default()
        },
        FakeBackend::default(),
        |c| {
            c.max_concurrent_jobs = 1;
            c.max_pending_jobs = 1;
        },
    );
    let input = h.doc("q.pdf", 5);
    let a = h.service.submit(&input, h.out("a.pdf")).await.unwrap();
    let b = h.service.submit(&input, h.out("b.pdf")).await.unwrap();

    let err = h.service.submit(&input, h.out("c.pdf")).await.unwrap_err();
    assert!(matches!(err, PdfOcrError::QueueFull { capacity: 2 }));
    assert_eq!(h.service.status(&b).await.unwrap().status, JobStatus::Queued);

    h.service.wait(&a).await.unwrap();
    h.service.wait(&b).await.unwrap();
}

#[tokio::test]
async fn delete_requires_terminal_state() {
    let h = Harness::new(
        FakeEngine {
            delay: Duration::from_millis(50),
            ..Default::default()
        },
        FakeBackend::default(),
        |_| {},
    );
    let id = h
        .service
        .submit(h.doc("del.pdf", 5), h.out("del_OCR.pdf"))
        .await
        .unwrap();
    assert!(matches!(
        h.service.delete(&id).await.unwrap_err(),
        PdfOcrError::JobActive { .. }
    ));

    h.service.wait(&id).await.unwrap();
    let removed = h.service.delete(&id).await.unwrap();
    assert_eq!(removed.status, JobStatus::Completed);
    assert!(removed.output_path.exists());
    assert!(matches!(
        h.service.status(&id).await.unwrap_err(),
        PdfOcrError::NotFound { .. }
    ));
}

#[tokio::test]
async fn engine_panic_becomes_internal_error() {
    let h = Harness::new(
        FakeEngine {
            panic_on: Some(1),
            ..Default::default()
        },
        FakeBackend::default(),
        |_| {},
    );
    let id = h
        .service
        .submit(h.doc("boom.pdf", 5), h.out("boom_OCR.pdf"))
        .await
        .unwrap();
    let job = h.service.wait(&id).await.unwrap();
    assert_eq!(job.error.unwrap().code, ErrorCode::Internal);
    assert!(h.workspace_is_empty());
}

#[tokio::test]
async fn documents_with_text_are_copied_when_reuse_is_enabled() {
    let h = Harness::new(FakeEngine::default(), FakeBackend::default(), |c| {
        c.existing_text = ExistingTextPolicy::ReuseWhenPresent
    });
    let input = h.dir.path().join("digital.pdf");
    write_fake(&input, 12, true, "source");
    let output = h.out("digital_OCR.pdf");

    let id = h.service.submit(&input, &output).await.unwrap();
    let job = h.service.wait(&id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_processed, Some(12));
    assert!(h.engine.calls().is_empty());
    assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(&output).unwrap());
}

#[tokio::test]
async fn status_of_unknown_job_is_not_found() {
    let h = Harness::simple();
    let err = h
        .service
        .status(&edgequake_pdfocr::JobId::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}
