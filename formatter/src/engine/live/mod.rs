//! Live automation backend.
//!
//! Every primitive is forwarded to an automation bridge running next to the
//! installed word processor. Ranges are tokens the bridge issues; this side
//! only checks they belong to the open document.

pub mod transport;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::action::{
    BookmarkText, ContentControlText, FieldUpdate, FindReplace, HeadersFooters, InsertImage,
    Numbering, PageSetup, ParagraphFormat, SectionBreak, TableFormat,
};
use crate::core::pages::PageRange;
use crate::core::raw_command::RawCommand;
use crate::core::selector::{RegexQuery, StructuralRange, TableQuery};
use crate::core::snapshot::Snapshot;
use crate::core::units::Length;
use crate::engine::{
    Capabilities, DocumentHandle, Engine, EngineResult, Issuer, ListLevelFormat, PageGeometry,
    ParagraphInfo, Range, Target, TextEdit,
};
use crate::error::EngineError;

pub use transport::{ProcessTransport, Request, Response, Transport};

const NAME: &str = "word";

/// How to reach the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOptions {
    pub command: Vec<String>,
    pub shutdown_grace: Duration,
}

/// Paragraph record as the bridge reports it.
#[derive(Debug, Deserialize)]
struct RemoteParagraph {
    range: String,
    index: usize,
    text: String,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    list_level: Option<u8>,
    page: u32,
}

pub struct LiveEngine {
    issuer: Issuer,
    transport: Box<dyn Transport>,
    grace: Duration,
    next_id: u64,
    document: Option<String>,
    shut_down: bool,
}

impl std::fmt::Debug for LiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveEngine")
            .field("document", &self.document)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl LiveEngine {
    /// Spawn the bridge process and perform the handshake.
    pub fn spawn(options: &LiveOptions) -> EngineResult<Self> {
        let transport = ProcessTransport::spawn(&options.command)?;
        Self::connect(Box::new(transport), options.shutdown_grace)
    }

    /// Handshake over an existing transport. A bridge that does not answer
    /// `hello` is unavailable, and is shut down before returning.
    pub fn connect(transport: Box<dyn Transport>, grace: Duration) -> EngineResult<Self> {
        let mut engine = Self {
            issuer: Issuer::new(),
            transport,
            grace,
            next_id: 1,
            document: None,
            shut_down: false,
        };
        match engine.call("hello", json!({})) {
            Ok(info) => {
                info!(bridge = %info, "automation bridge ready");
                Ok(engine)
            }
            Err(err) => {
                engine.shutdown();
                Err(EngineError::Unavailable(format!("bridge handshake failed: {err}")))
            }
        }
    }

    fn call(&mut self, op: &'static str, args: Value) -> EngineResult<Value> {
        if self.shut_down {
            return Err(EngineError::Bridge("engine is shut down".to_string()));
        }
        let request = Request {
            id: self.next_id,
            op: op.to_string(),
            args,
        };
        self.next_id += 1;
        debug!(id = request.id, op, "bridge request");
        let response = self.transport.exchange(&request)?;
        if response.ok {
            return Ok(response.result);
        }
        let (kind, message) = response
            .error
            .map_or_else(|| (String::new(), "unspecified failure".to_string()), |e| (e.kind, e.message));
        Err(match kind.as_str() {
            "not_supported" => EngineError::not_supported(NAME, op),
            "invalid_document" => EngineError::InvalidDocument(message),
            "foreign_range" => EngineError::ForeignRange,
            _ => EngineError::Failed(format!("{op}: {message}")),
        })
    }

    fn call_as<T: DeserializeOwned>(&mut self, op: &'static str, args: Value) -> EngineResult<T> {
        let value = self.call(op, args)?;
        serde_json::from_value(value)
            .map_err(|err| EngineError::Bridge(format!("{op}: unexpected result: {err}")))
    }

    fn count(&mut self, op: &'static str, args: Value) -> EngineResult<usize> {
        self.call_as(op, args)
    }

    /// Bridge token of the open document.
    fn token(&self, doc: &DocumentHandle) -> EngineResult<String> {
        self.issuer.check(doc)?;
        self.document
            .clone()
            .ok_or_else(|| EngineError::Failed("no document is open".to_string()))
    }

    fn range_tokens(&self, doc: &DocumentHandle, ranges: &[Range]) -> EngineResult<Vec<String>> {
        ranges
            .iter()
            .map(|range| match self.issuer.resolve(doc, range)? {
                Target::Remote(token) => Ok(token.clone()),
                _ => Err(EngineError::ForeignRange),
            })
            .collect()
    }

    fn range_token(&self, doc: &DocumentHandle, range: &Range) -> EngineResult<String> {
        self.range_tokens(doc, std::slice::from_ref(range))?
            .into_iter()
            .next()
            .ok_or(EngineError::ForeignRange)
    }

    fn select(&mut self, doc: &DocumentHandle, op: &'static str, query: Value) -> EngineResult<Vec<Range>> {
        let document = self.token(doc)?;
        let tokens: Vec<String> = self.call_as(op, json!({"document": document, "query": query}))?;
        Ok(tokens
            .into_iter()
            .map(|token| self.issuer.range(doc, Target::Remote(token)))
            .collect())
    }

    fn act(
        &mut self,
        doc: &DocumentHandle,
        op: &'static str,
        ranges: Option<&[Range]>,
        config: Value,
    ) -> EngineResult<usize> {
        let document = self.token(doc)?;
        let mut args = json!({"document": document, "config": config});
        if let Some(ranges) = ranges {
            args["ranges"] = json!(self.range_tokens(doc, ranges)?);
        }
        self.count(op, args)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> EngineResult<Value> {
    serde_json::to_value(value).map_err(|err| EngineError::Bridge(format!("encode arguments: {err}")))
}

impl Engine for LiveEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn open(&mut self, path: &Path) -> EngineResult<DocumentHandle> {
        if self.issuer.is_open() {
            return Err(EngineError::Failed("a document is already open".to_string()));
        }
        let token: String = self.call_as("open", json!({"path": path.to_string_lossy()}))?;
        self.document = Some(token);
        Ok(self.issuer.issue(path))
    }

    fn close(&mut self, doc: DocumentHandle) {
        if !self.issuer.release(&doc) {
            warn!(path = %doc.path().display(), "close called with a handle this engine does not own");
            return;
        }
        if let Some(token) = self.document.take()
            && let Err(err) = self.call("close", json!({"document": token}))
        {
            warn!(err = %err, path = %doc.path().display(), "bridge failed to close document");
        }
    }

    fn save_as(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()> {
        let document = self.token(doc)?;
        self.call("save_as", json!({"document": document, "path": path.to_string_lossy()}))?;
        Ok(())
    }

    fn export_pdf(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()> {
        let document = self.token(doc)?;
        self.call("export_pdf", json!({"document": document, "path": path.to_string_lossy()}))?;
        Ok(())
    }

    fn snapshot(&mut self, doc: &DocumentHandle) -> EngineResult<Snapshot> {
        let document = self.token(doc)?;
        self.call_as("snapshot", json!({"document": document}))
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.document = None;
        let quit = Request {
            id: self.next_id,
            op: "quit".to_string(),
            args: json!({}),
        };
        self.next_id += 1;
        self.transport.shutdown(&quit, self.grace);
        debug!("automation bridge shut down");
    }

    fn select_document(&mut self, doc: &DocumentHandle) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_document", Value::Null)
    }

    fn select_by_style(&mut self, doc: &DocumentHandle, styles: &[String]) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_by_style", json!(styles))
    }

    fn select_by_regex(&mut self, doc: &DocumentHandle, query: &RegexQuery) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_by_regex", to_value(query)?)
    }

    fn select_by_bookmark(&mut self, doc: &DocumentHandle, names: &[String]) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_by_bookmark", json!(names))
    }

    fn select_by_content_control(&mut self, doc: &DocumentHandle, titles: &[String]) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_by_content_control", json!(titles))
    }

    fn select_by_table(&mut self, doc: &DocumentHandle, query: &TableQuery) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_by_table", to_value(query)?)
    }

    fn select_by_range(&mut self, doc: &DocumentHandle, range: &StructuralRange) -> EngineResult<Vec<Range>> {
        self.select(doc, "select_by_range", to_value(range)?)
    }

    fn apply_paragraph_format(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        format: &ParagraphFormat,
    ) -> EngineResult<usize> {
        self.act(doc, "paragraph_format", Some(ranges), to_value(format)?)
    }

    fn apply_style(&mut self, doc: &DocumentHandle, ranges: &[Range], style: &str) -> EngineResult<usize> {
        self.act(doc, "style_apply", Some(ranges), json!({"name": style}))
    }

    fn apply_numbering(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        numbering: &Numbering,
    ) -> EngineResult<usize> {
        self.act(doc, "numbering", Some(ranges), to_value(numbering)?)
    }

    fn set_headers_footers(&mut self, doc: &DocumentHandle, config: &HeadersFooters) -> EngineResult<usize> {
        self.act(doc, "headers_footers", None, to_value(config)?)
    }

    fn update_fields(&mut self, doc: &DocumentHandle, config: &FieldUpdate) -> EngineResult<usize> {
        self.act(doc, "field_update", None, to_value(config)?)
    }

    fn find_replace(&mut self, doc: &DocumentHandle, config: &FindReplace) -> EngineResult<usize> {
        self.act(doc, "find_replace", None, to_value(config)?)
    }

    fn apply_page_setup(&mut self, doc: &DocumentHandle, config: &PageSetup) -> EngineResult<usize> {
        self.act(doc, "page_setup", None, to_value(config)?)
    }

    fn insert_section_break(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &SectionBreak,
    ) -> EngineResult<usize> {
        self.act(doc, "section_breaks", Some(ranges), to_value(config)?)
    }

    fn replace_bookmark_text(&mut self, doc: &DocumentHandle, config: &BookmarkText) -> EngineResult<usize> {
        self.act(doc, "bookmark_text", None, to_value(config)?)
    }

    fn replace_content_control_text(
        &mut self,
        doc: &DocumentHandle,
        config: &ContentControlText,
    ) -> EngineResult<usize> {
        self.act(doc, "content_control_text", None, to_value(config)?)
    }

    fn format_table(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &TableFormat,
    ) -> EngineResult<usize> {
        self.act(doc, "table_format", Some(ranges), to_value(config)?)
    }

    fn insert_image(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &InsertImage,
    ) -> EngineResult<usize> {
        self.act(doc, "insert_image", Some(ranges), to_value(config)?)
    }

    fn run_raw_commands(&mut self, doc: &DocumentHandle, commands: &[RawCommand]) -> EngineResult<usize> {
        self.act(doc, "raw_commands", None, to_value(&commands)?)
    }

    fn paragraphs(&mut self, doc: &DocumentHandle, pages: Option<PageRange>) -> EngineResult<Vec<ParagraphInfo>> {
        let document = self.token(doc)?;
        let remote: Vec<RemoteParagraph> = self.call_as(
            "paragraphs",
            json!({"document": document, "pages": pages.map(|range| range.to_string())}),
        )?;
        Ok(remote
            .into_iter()
            .map(|p| ParagraphInfo {
                range: self.issuer.range(doc, Target::Remote(p.range)),
                index: p.index,
                text: p.text,
                style: p.style,
                list_level: p.list_level,
                page: p.page,
            })
            .collect())
    }

    fn page_count(&mut self, doc: &DocumentHandle) -> EngineResult<u32> {
        let document = self.token(doc)?;
        self.call_as("page_count", json!({"document": document}))
    }

    fn page_geometry(&mut self, doc: &DocumentHandle) -> EngineResult<PageGeometry> {
        let document = self.token(doc)?;
        self.call_as("page_geometry", json!({"document": document}))
    }

    fn replace_text(&mut self, doc: &DocumentHandle, range: &Range, edit: &TextEdit) -> EngineResult<usize> {
        let document = self.token(doc)?;
        let range = self.range_token(doc, range)?;
        self.count(
            "replace_text",
            json!({"document": document, "range": range, "edit": to_value(edit)?}),
        )
    }

    fn insert_text_before(&mut self, doc: &DocumentHandle, range: &Range, text: &str) -> EngineResult<()> {
        let document = self.token(doc)?;
        let range = self.range_token(doc, range)?;
        self.call(
            "insert_text_before",
            json!({"document": document, "range": range, "text": text}),
        )?;
        Ok(())
    }

    fn convert_list_numbers_to_text(&mut self, doc: &DocumentHandle, ranges: &[Range]) -> EngineResult<usize> {
        self.act(doc, "convert_list_numbers_to_text", Some(ranges), Value::Null)
    }

    fn list_level_format(&mut self, doc: &DocumentHandle, range: &Range) -> EngineResult<Option<ListLevelFormat>> {
        let document = self.token(doc)?;
        let range = self.range_token(doc, range)?;
        self.call_as("list_level_format", json!({"document": document, "range": range}))
    }

    fn set_list_level_format(
        &mut self,
        doc: &DocumentHandle,
        range: &Range,
        format: &ListLevelFormat,
    ) -> EngineResult<()> {
        let document = self.token(doc)?;
        let range = self.range_token(doc, range)?;
        self.call(
            "set_list_level_format",
            json!({"document": document, "range": range, "format": to_value(format)?}),
        )?;
        Ok(())
    }

    fn set_list_level_number(&mut self, doc: &DocumentHandle, range: &Range, level: u8) -> EngineResult<()> {
        let document = self.token(doc)?;
        let range = self.range_token(doc, range)?;
        self.call(
            "set_list_level_number",
            json!({"document": document, "range": range, "level": level}),
        )?;
        Ok(())
    }

    fn ensure_paragraph_style(&mut self, doc: &DocumentHandle, name: &str, left_indent: Length) -> EngineResult<()> {
        let document = self.token(doc)?;
        self.call(
            "ensure_paragraph_style",
            json!({"document": document, "name": name, "left_indent": left_indent.points()}),
        )?;
        Ok(())
    }
}

impl Drop for LiveEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
