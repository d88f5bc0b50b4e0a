//! OCR over PDF documents: pages rendered to JPEG, analysed concurrently,
//! results written as JSON.
//!
//! Workflow for every PDF in the samples directory:
//!
//! 1. render each page to `<pages>/<stem>_page_<n>.jpg` (n from 0)
//! 2. send every page image to the model through a [`FanOut`] capped at
//!    [`DemoConfig::concurrency`]
//! 3. write the per-page records, in page order, to
//!    `<results>/<stem>.json` or `<results>/structured_<stem>.json`
//!
//! [`validation`] shows how a malformed structured answer is reported.

use crate::DemoConfig;
use parley_rs::agent::{Agent, AgentConfig, Prompt};
use parley_rs::fanout::FanOut;
use parley_rs::schema::{OutputSchema, SchemaError};
use parley_rs::sink::JsonSink;
use parley_rs::{ChatBackend, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Limit for one page analysis, admission wait excluded.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(300);

const SYSTEM_PROMPT: &str = "You are an OCR expert specialized in the data extraction from \
     various types of documents. You are always precise and make sure that extraction is done \
     properly.";

const BASIC_PROMPT: &str = "Provided below you can find a document. \
     Perform a full-scale OCR process on it. Return its content in the Markdown but **without** \
     backticks used for usual code marking in the document itself. \
     Do your best to provide original format and try to retain as much of original structure as possible. \
     Use regular Markdown elements like tables, image descriptions, lists, headers and others. \
     Do not perform any additional actions other than recognition of the characters \
     in the document and translating it into a Markdown result.";

const STRUCTURED_PROMPT: &str = "You are an expert OCR and document analysis system. Provided below is a document. \
     Your task is to analyze the document and return a structured JSON response following the schema:\n\n\
     1. **file_type**: Identify the specific category of the document (e.g., invoice, internal_document, instruction).\n\
     2. **file_content_md**: Perform a full-scale OCR. Convert the document into Markdown, \
     retaining the original structure (tables, headers, lists).\n\
     3. **file_elements**: Provide a granular list of elements found. For each element, \
     specify its 'element_type' (e.g., table, image_description, paragraph) and its 'element_content'.\n\n\
     Strictly perform character recognition and structural mapping. Do not add commentary or perform \
     actions outside of translation into the requested schema.";

// ── Records ─────────────────────────────────────────────────────────

/// One element found on a page: a table, a paragraph, a logo, a header.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
pub struct FileElement {
    /// Type of the element found on the page
    #[serde(default)]
    pub element_type: String,
    /// Content of the element found on the page
    #[serde(default)]
    pub element_content: String,
}

/// Structured analysis of one page.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
pub struct PageAnalysis {
    /// Type name which can describe given file precisely, e.g.: invoice, internal_document, instruction, other
    #[serde(default)]
    pub file_type: String,
    /// Output of the OCR process, contents of the file in Markdown
    #[serde(default)]
    pub file_content_md: String,
    /// Elements the given page consists from: tables, images, paragraphs, graphs, flowcharts etc.
    #[serde(default)]
    pub file_elements: Vec<FileElement>,
}

/// What is written per page.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PageRecord {
    Text {
        filename: String,
        result: String,
    },
    Structured {
        filename: String,
        analysis_result: PageAnalysis,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Free Markdown text per page.
    Basic,
    /// [`PageAnalysis`] per page.
    Structured,
}

impl Mode {
    /// Result file prefix.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Mode::Basic => None,
            Mode::Structured => Some("structured"),
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Mode::Basic => BASIC_PROMPT,
            Mode::Structured => STRUCTURED_PROMPT,
        }
    }
}

// ── Files ───────────────────────────────────────────────────────────

/// Files in `dir` whose name ends with `extension` (case-insensitive),
/// sorted by name.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, Error> {
    let suffix = extension.to_ascii_lowercase();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if name.ends_with(&suffix) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Rendering ───────────────────────────────────────────────────────

pub type RenderFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<PathBuf>, Error>> + Send + 'a>>;

/// Turns a document into one JPEG per page.
pub trait PageRenderer: Send + Sync {
    /// Write `<out_dir>/<stem>_page_<n>.jpg` for every page, n from 0, and
    /// return the paths in page order.
    fn render<'a>(&'a self, pdf: &'a Path, out_dir: &'a Path) -> RenderFuture<'a>;
}

/// Renders with poppler's `pdftoppm`, which must be on `PATH`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    dpi: u32,
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self { dpi: 200 }
    }
}

impl PdftoppmRenderer {
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    async fn render_pages(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, Error> {
        let stem = file_stem(pdf);
        let scratch = out_dir.join(format!(".render-{stem}"));
        tokio::fs::create_dir_all(&scratch).await?;

        let output = Command::new("pdftoppm")
            .arg("-jpeg")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf)
            .arg(scratch.join("page"))
            .output()
            .await
            .map_err(|e| io::Error::new(e.kind(), format!("failed to run pdftoppm: {e}")))?;

        let result = if output.status.success() {
            collect_pages(&scratch, out_dir, &stem)
        } else {
            Err(io::Error::other(format!(
                "pdftoppm failed on {} ({}): {}",
                pdf.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into())
        };
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            debug!("Could not remove {}: {e}", scratch.display());
        }
        result
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render<'a>(&'a self, pdf: &'a Path, out_dir: &'a Path) -> RenderFuture<'a> {
        Box::pin(self.render_pages(pdf, out_dir))
    }
}

/// Move `pdftoppm` output (`<prefix>-<n>.jpg`, n from 1, zero-padded to
/// the page count's width) into `out_dir` under page-indexed names.
fn collect_pages(scratch: &Path, out_dir: &Path, stem: &str) -> Result<Vec<PathBuf>, Error> {
    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(scratch)? {
        let path = entry?.path();
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('-').next())
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(number) = number {
            numbered.push((number, path));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut pages = Vec::with_capacity(numbered.len());
    for (idx, (_, from)) in numbered.into_iter().enumerate() {
        let to = out_dir.join(format!("{stem}_page_{idx}.jpg"));
        std::fs::rename(&from, &to)?;
        pages.push(to);
    }
    Ok(pages)
}

// ── Analysis ────────────────────────────────────────────────────────

fn ocr_agent<'a>(backend: &'a dyn ChatBackend, model: &str) -> Agent<'a> {
    Agent::new(
        backend,
        AgentConfig::new(model)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.0)
            .with_max_tokens(8192),
    )
}

async fn analyze_page(agent: &Agent<'_>, mode: Mode, image: &Path) -> Result<PageRecord, Error> {
    let bytes = tokio::fs::read(image).await?;
    let prompt = Prompt::new(mode.prompt()).with_image("image/jpeg", &bytes);
    let filename = file_stem(image);

    let record = match mode {
        Mode::Basic => PageRecord::Text {
            filename,
            result: agent.run(prompt, &[]).await?.output,
        },
        Mode::Structured => PageRecord::Structured {
            filename,
            analysis_result: agent.run_output::<PageAnalysis>(prompt, &[]).await?.output,
        },
    };
    info!("File analyzed: {}", file_stem(image));
    Ok(record)
}

/// Analyse `images` concurrently; records come back in image order. The
/// first failing page fails the batch.
pub async fn analyze_pages(
    backend: &dyn ChatBackend,
    model: &str,
    mode: Mode,
    images: &[PathBuf],
    fan: &FanOut,
) -> Result<Vec<PageRecord>, Error> {
    let agent = ocr_agent(backend, model);
    fan.run(images, |_, image| {
        let agent = &agent;
        async move {
            analyze_page(agent, mode, image).await.inspect_err(|e| {
                warn!("Unexpected error while analysing {}: {e}", image.display());
            })
        }
    })
    .await
}

/// Render and analyse every PDF under `config.samples_dir`. Returns the
/// written result files.
pub async fn process_documents(
    backend: &dyn ChatBackend,
    config: &DemoConfig,
    mode: Mode,
    renderer: &dyn PageRenderer,
) -> Result<Vec<PathBuf>, Error> {
    let fan = FanOut::new(config.concurrency)?.with_timeout(PAGE_TIMEOUT);
    let sink = JsonSink::new(&config.results_dir);
    std::fs::create_dir_all(&config.pages_dir)?;

    let documents = list_files(&config.samples_dir, "pdf")?;
    info!(
        "Found {} PDF(s) in {}",
        documents.len(),
        config.samples_dir.display()
    );

    let mut written = Vec::with_capacity(documents.len());
    for pdf in &documents {
        let images = renderer.render(pdf, &config.pages_dir).await?;
        info!("{}: {} page(s)", pdf.display(), images.len());
        let records = analyze_pages(backend, config.model_name(), mode, &images, &fan).await?;
        written.push(sink.save(mode.prefix(), &file_stem(pdf), &records)?);
    }
    Ok(written)
}

// ── Validation ──────────────────────────────────────────────────────

/// Schema for structured page answers with every field required.
pub fn strict_page_schema() -> OutputSchema {
    OutputSchema::new(
        "PageAnalysis",
        json!({
            "type": "object",
            "properties": {
                "file_type": {"type": "string"},
                "file_content_md": {"type": "string"},
                "file_elements": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "element_type": {"type": "string"},
                            "element_content": {"type": "string"},
                        },
                        "required": ["element_type", "element_content"],
                    },
                },
            },
            "required": ["file_type", "file_content_md", "file_elements"],
        }),
    )
}

/// An answer with strings where element objects belong.
pub fn malformed_answer() -> serde_json::Value {
    json!({
        "file_type": "invoice",
        "file_content_md": "# Invoice Content",
        "file_elements": ["No elements found"],
    })
}

/// Validate [`malformed_answer`] and print every violation.
pub fn validation() -> Option<SchemaError> {
    info!("Attempting to validate model response...");
    let err = strict_page_schema().validate(&malformed_answer()).err()?;

    crate::heading("Validation error detected");
    println!("The answer was rejected because it does not match the schema.\n");
    for v in &err.violations {
        println!("Field: '{}'", v.path);
        println!("Error type: {}", v.keyword);
        println!("Reason: {}", v.message);
        println!("What the model actually sent: {}", v.received);
        crate::separator();
    }
    Some(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs::testing::ScriptedBackend;
    use parley_rs::ModelRef;

    /// Writes `pages` placeholder images per document.
    struct FakeRenderer {
        pages: usize,
    }

    impl PageRenderer for FakeRenderer {
        fn render<'a>(&'a self, pdf: &'a Path, out_dir: &'a Path) -> RenderFuture<'a> {
            Box::pin(async move {
                let stem = file_stem(pdf);
                let mut out = Vec::new();
                for idx in 0..self.pages {
                    let path = out_dir.join(format!("{stem}_page_{idx}.jpg"));
                    std::fs::write(&path, [0xFF, 0xD8, 0xFF, idx as u8])?;
                    out.push(path);
                }
                Ok(out)
            })
        }
    }

    fn config_in(root: &Path, concurrency: usize) -> DemoConfig {
        DemoConfig {
            model: ModelRef::parse("openai:gpt-4o"),
            samples_dir: root.join("samples"),
            pages_dir: root.join("pages"),
            results_dir: root.join("results"),
            concurrency,
        }
    }

    #[test]
    fn lists_only_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PDF", "a.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.pdf")).unwrap();
        let files = list_files(dir.path(), "pdf").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
    }

    #[test]
    fn pdftoppm_output_is_renamed_in_page_order() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        for n in ["01", "02", "10", "03", "04", "05", "06", "07", "08", "09"] {
            std::fs::write(scratch.join(format!("page-{n}.jpg")), n).unwrap();
        }
        let pages = collect_pages(&scratch, dir.path(), "faktura").unwrap();

        assert_eq!(pages.len(), 10);
        assert_eq!(pages[0], dir.path().join("faktura_page_0.jpg"));
        assert_eq!(std::fs::read_to_string(&pages[9]).unwrap(), "10");
        assert_eq!(std::fs::read_to_string(&pages[2]).unwrap(), "03");
    }

    #[tokio::test]
    async fn basic_mode_writes_one_file_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        std::fs::create_dir_all(&config.samples_dir).unwrap();
        std::fs::write(config.samples_dir.join("umowa.pdf"), b"%PDF").unwrap();

        let backend = ScriptedBackend::new()
            .reply("# Umowa\n\nStrona pierwsza")
            .reply("Strona druga: podpisy i pieczęć");
        let written = process_documents(&backend, &config, Mode::Basic, &FakeRenderer { pages: 2 })
            .await
            .unwrap();

        assert_eq!(written, vec![config.results_dir.join("umowa.json")]);
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert!(text.contains("Strona druga: podpisy i pieczęć"));
        let records: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(records[0]["filename"], "umowa_page_0");
        assert_eq!(records[1]["filename"], "umowa_page_1");
        assert_eq!(records[0]["result"], "# Umowa\n\nStrona pierwsza");

        // Each request carries the prompt and the page image.
        let sent = backend.requests();
        let body = serde_json::to_value(&sent[0].messages).unwrap();
        assert!(body.to_string().contains("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn structured_mode_uses_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 3);
        std::fs::create_dir_all(&config.samples_dir).unwrap();
        std::fs::write(config.samples_dir.join("invoice.pdf"), b"%PDF").unwrap();

        let answer = r##"{"file_type": "invoice", "file_content_md": "# Invoice", "file_elements": [{"element_type": "header", "element_content": "Invoice"}]}"##;
        let backend = ScriptedBackend::new().reply(answer).reply(answer).reply(answer);
        let written = process_documents(
            &backend,
            &config,
            Mode::Structured,
            &FakeRenderer { pages: 3 },
        )
        .await
        .unwrap();

        assert_eq!(
            written,
            vec![config.results_dir.join("structured_invoice.json")]
        );
        let records: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(records.as_array().unwrap().len(), 3);
        assert_eq!(records[2]["filename"], "invoice_page_2");
        assert_eq!(records[0]["analysis_result"]["file_type"], "invoice");
        assert_eq!(
            records[0]["analysis_result"]["file_elements"][0]["element_type"],
            "header"
        );
    }

    #[tokio::test]
    async fn failing_page_fails_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        std::fs::create_dir_all(&config.samples_dir).unwrap();
        std::fs::write(config.samples_dir.join("scan.pdf"), b"%PDF").unwrap();

        // One reply for two pages: the second call finds nothing queued.
        let backend = ScriptedBackend::new().reply("page one");
        let err = process_documents(&backend, &config, Mode::Basic, &FakeRenderer { pages: 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Item { index: 1, .. }));
        assert!(!config.results_dir.join("scan.json").exists());
    }

    #[test]
    fn malformed_elements_are_reported_per_item() {
        let err = validation().expect("malformed answer must fail");
        let v = err.at("/file_elements/0").expect("violation for the first element");
        assert_eq!(v.keyword, "type");
        assert_eq!(v.received, "No elements found");
    }

    #[test]
    fn well_formed_answer_passes_strict_schema() {
        let ok = serde_json::to_value(PageAnalysis {
            file_type: "invoice".into(),
            file_content_md: "# Invoice".into(),
            file_elements: vec![FileElement {
                element_type: "table".into(),
                element_content: "| a | b |".into(),
            }],
        })
        .unwrap();
        assert!(strict_page_schema().validate(&ok).is_ok());
    }
}
