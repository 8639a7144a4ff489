//! OOXML zip container: raw entries plus relationship and content-type
//! bookkeeping for parts added during editing.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::engine::docx::xml::{self, Element};
use crate::error::EngineError;

pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const ROOT_RELS: &str = "_rels/.rels";

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_NUMBERING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
pub const REL_SETTINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
pub const REL_HEADER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const REL_FOOTER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
pub const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Raw package entries in archive order.
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<(String, Vec<u8>)>,
}

fn zip_error(err: zip::result::ZipError) -> EngineError {
    EngineError::InvalidDocument(format!("zip: {err}"))
}

impl Package {
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(zip_error)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(zip_error)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            entries.push((name, data));
        }
        debug!(path = %path.display(), entries = entries.len(), "read package");
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn put(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some((_, existing)) => *existing = data,
            None => self.entries.push((name.to_string(), data)),
        }
    }

    /// Parse an XML entry, if present.
    pub fn xml(&self, name: &str) -> Result<Option<Element>, EngineError> {
        let Some(data) = self.get(name) else {
            return Ok(None);
        };
        let text = std::str::from_utf8(data)
            .map_err(|err| EngineError::InvalidDocument(format!("{name}: {err}")))?;
        xml::parse(text).map(Some)
    }

    pub fn required_xml(&self, name: &str) -> Result<Element, EngineError> {
        self.xml(name)?
            .ok_or_else(|| EngineError::InvalidDocument(format!("missing part {name}")))
    }

    /// First free `<prefix><n><suffix>` entry name.
    pub fn unique_name(&self, prefix: &str, suffix: &str) -> String {
        (1..)
            .map(|n| format!("{prefix}{n}{suffix}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| format!("{prefix}new{suffix}"))
    }

    /// Write atomically (temp file + rename).
    pub fn write(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("docx.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = ZipWriter::new(file);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, data) in &self.entries {
                writer.start_file(name.as_str(), options).map_err(zip_error)?;
                writer.write_all(data)?;
            }
            writer.finish().map_err(zip_error)?;
        }
        fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), entries = self.entries.len(), "wrote package");
        Ok(())
    }
}

/// Rels file path for a part: `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target relative to the part that owns it.
pub fn resolve_target(owner_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match owner_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Target of the first relationship of `rel_type`.
pub fn find_relationship<'a>(rels: &'a Element, rel_type: &str) -> Option<&'a str> {
    rels.children_named("Relationship")
        .find(|rel| rel.attr("Type") == Some(rel_type))
        .and_then(|rel| rel.attr("Target"))
}

pub fn relationship_target<'a>(rels: &'a Element, id: &str) -> Option<&'a str> {
    rels.children_named("Relationship")
        .find(|rel| rel.attr("Id") == Some(id))
        .and_then(|rel| rel.attr("Target"))
}

/// Add a relationship and return its new id.
pub fn add_relationship(rels: &mut Element, rel_type: &str, target: &str) -> String {
    let id = (1..)
        .map(|n| format!("rId{n}"))
        .find(|candidate| {
            rels.children_named("Relationship")
                .all(|rel| rel.attr("Id") != Some(candidate.as_str()))
        })
        .unwrap_or_else(|| "rIdNew".to_string());
    rels.children.push(xml::Node::Element(
        Element::new("Relationship")
            .with_attr("Id", id.clone())
            .with_attr("Type", rel_type)
            .with_attr("Target", target),
    ));
    id
}

pub fn empty_rels() -> Element {
    Element::new("Relationships").with_attr("xmlns", RELS_NS)
}

/// Register a content-type override for a part name (`/word/header1.xml`).
pub fn add_override(content_types: &mut Element, part: &str, content_type: &str) {
    let part_name = format!("/{part}");
    let exists = content_types
        .children_named("Override")
        .any(|el| el.attr("PartName") == Some(part_name.as_str()));
    if !exists {
        content_types.children.push(xml::Node::Element(
            Element::new("Override")
                .with_attr("PartName", part_name)
                .with_attr("ContentType", content_type),
        ));
    }
}

/// Register a default content type for a file extension.
pub fn add_default(content_types: &mut Element, extension: &str, content_type: &str) {
    let exists = content_types
        .children_named("Default")
        .any(|el| el.attr("Extension").is_some_and(|ext| ext.eq_ignore_ascii_case(extension)));
    if !exists {
        content_types.children.insert(
            0,
            xml::Node::Element(
                Element::new("Default")
                    .with_attr("Extension", extension)
                    .with_attr("ContentType", content_type),
            ),
        );
    }
}
