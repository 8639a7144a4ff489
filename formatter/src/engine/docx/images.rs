//! Inline picture insertion.

use std::io::Cursor;

use image::ImageReader;

use crate::core::action::{ImageAnchor, InsertImage};
use crate::engine::docx::document::{DocxDocument, R_NS};
use crate::engine::docx::package::{self, REL_IMAGE};
use crate::engine::docx::sections::ensure_namespace;
use crate::engine::docx::xml::{Element, Node};
use crate::error::EngineError;

const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

const EMU_PER_POINT: f64 = 12_700.0;
/// At 96 dpi.
const EMU_PER_PIXEL: u64 = 9_525;

impl DocxDocument {
    /// Append the picture as a new run of the first selected paragraph.
    pub fn insert_image(&mut self, paths: &[Vec<usize>], config: &InsertImage) -> Result<usize, EngineError> {
        if config.anchor == ImageAnchor::Floating {
            return Err(EngineError::not_supported("docx", "floating images"));
        }
        let Some(target) = paths.first() else {
            return Ok(0);
        };
        let data = std::fs::read(&config.path)?;
        let reader = ImageReader::new(Cursor::new(&data)).with_guessed_format()?;
        let format = reader.format().ok_or_else(|| {
            EngineError::Failed(format!("{}: unrecognized image format", config.path.display()))
        })?;
        let (px_width, px_height) = reader
            .into_dimensions()
            .map_err(|err| EngineError::Failed(format!("{}: {err}", config.path.display())))?;
        let (cx, cy) = extent(px_width, px_height, config);

        let ext = format.extensions_str().first().copied().unwrap_or("png");
        let dir = self
            .main_part()
            .rsplit_once('/')
            .map_or(String::new(), |(dir, _)| format!("{dir}/"));
        let media = self
            .package()
            .unique_name(&format!("{dir}media/image"), &format!(".{ext}"));
        let target_name = media.strip_prefix(&dir).unwrap_or(&media).to_string();
        self.put_binary(&media, data);
        package::add_default(self.content_types_mut(), ext, format.to_mime_type());
        let rid = package::add_relationship(self.rels_mut(), REL_IMAGE, &target_name);

        let id = next_drawing_id(self.root());
        let file_name = config
            .path
            .file_name()
            .map_or_else(|| format!("image{id}.{ext}"), |name| name.to_string_lossy().into_owned());
        let run = Element::new("w:r").with_child(
            Element::new("w:drawing").with_child(inline_picture(id, &file_name, &rid, cx, cy)),
        );

        let root = self.root_mut();
        ensure_namespace(root, "xmlns:wp", WP_NS);
        ensure_namespace(root, "xmlns:r", R_NS);
        self.element_mut(target)?.children.push(Node::Element(run));
        Ok(1)
    }
}

/// Extent in EMU: explicit sizes win, a single explicit side keeps the
/// aspect ratio, otherwise pixels at 96 dpi.
fn extent(px_width: u32, px_height: u32, config: &InsertImage) -> (u64, u64) {
    let natural = (
        u64::from(px_width) * EMU_PER_PIXEL,
        u64::from(px_height) * EMU_PER_PIXEL,
    );
    let emu = |points: f64| (points * EMU_PER_POINT).round().max(1.0) as u64;
    let ratio = if px_width == 0 {
        1.0
    } else {
        f64::from(px_height) / f64::from(px_width)
    };
    match (config.width, config.height) {
        (Some(w), Some(h)) => (emu(w.points()), emu(h.points())),
        (Some(w), None) => (emu(w.points()), emu(w.points() * ratio)),
        (None, Some(h)) => (emu(h.points() / ratio.max(f64::EPSILON)), emu(h.points())),
        (None, None) => natural,
    }
}

fn next_drawing_id(root: &Element) -> u32 {
    let mut max = 0;
    root.walk(&mut |el| {
        if el.is("wp:docPr")
            && let Some(id) = el.attr("id").and_then(|id| id.parse::<u32>().ok())
        {
            max = max.max(id);
        }
    });
    max + 1
}

fn inline_picture(id: u32, name: &str, rid: &str, cx: u64, cy: u64) -> Element {
    let (cx, cy) = (cx.to_string(), cy.to_string());
    let blip_fill = Element::new("pic:blipFill")
        .with_child(Element::new("a:blip").with_attr("r:embed", rid))
        .with_child(Element::new("a:stretch").with_child(Element::new("a:fillRect")));
    let shape = Element::new("pic:spPr")
        .with_child(
            Element::new("a:xfrm")
                .with_child(Element::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                .with_child(
                    Element::new("a:ext")
                        .with_attr("cx", cx.clone())
                        .with_attr("cy", cy.clone()),
                ),
        )
        .with_child(
            Element::new("a:prstGeom")
                .with_attr("prst", "rect")
                .with_child(Element::new("a:avLst")),
        );
    let picture = Element::new("pic:pic")
        .with_attr("xmlns:pic", PIC_NS)
        .with_child(
            Element::new("pic:nvPicPr")
                .with_child(
                    Element::new("pic:cNvPr")
                        .with_attr("id", "0")
                        .with_attr("name", name),
                )
                .with_child(Element::new("pic:cNvPicPr")),
        )
        .with_child(blip_fill)
        .with_child(shape);

    Element::new("wp:inline")
        .with_attr("distT", "0")
        .with_attr("distB", "0")
        .with_attr("distL", "0")
        .with_attr("distR", "0")
        .with_child(Element::new("wp:extent").with_attr("cx", cx).with_attr("cy", cy))
        .with_child(
            Element::new("wp:docPr")
                .with_attr("id", id.to_string())
                .with_attr("name", format!("Picture {id}")),
        )
        .with_child(
            Element::new("wp:cNvGraphicFramePr").with_child(
                Element::new("a:graphicFrameLocks")
                    .with_attr("xmlns:a", A_NS)
                    .with_attr("noChangeAspect", "1"),
            ),
        )
        .with_child(
            Element::new("a:graphic").with_attr("xmlns:a", A_NS).with_child(
                Element::new("a:graphicData")
                    .with_attr("uri", PIC_NS)
                    .with_child(picture),
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::Length;
    use crate::test_support::{DocxBuilder, write_png};

    #[test]
    fn inline_png_is_embedded_in_first_paragraph() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = DocxBuilder::new()
            .paragraph("a")
            .paragraph("b")
            .write_to(dir.path(), "doc.docx");
        let png = write_png(dir.path(), "logo.png", 4, 2);
        let mut doc = DocxDocument::open(&path).expect("open");
        let paths = doc.paragraph_paths();
        let config = InsertImage {
            path: png,
            anchor: ImageAnchor::Inline,
            width: Some(Length::from_points(100.0)),
            height: None,
        };
        assert_eq!(doc.insert_image(&paths, &config).expect("insert"), 1);
        let snapshot = doc.snapshot();
        assert_eq!(snapshot.inline_shape_count, 1);
        assert_eq!(snapshot.paragraph_count, 2);
        assert!(doc.package().contains("word/media/image1.png"));

        let extent = doc
            .element(&paths[0])
            .expect("p")
            .children_named("w:r")
            .find_map(|run| run.child("w:drawing"))
            .and_then(|drawing| drawing.child("wp:inline"))
            .and_then(|inline| inline.child("wp:extent"))
            .expect("extent");
        assert_eq!(extent.attr("cx"), Some("1270000"));
        assert_eq!(extent.attr("cy"), Some("635000"));
    }

    #[test]
    fn floating_images_are_not_supported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = DocxBuilder::new().paragraph("a").write_to(dir.path(), "doc.docx");
        let mut doc = DocxDocument::open(&path).expect("open");
        let paths = doc.paragraph_paths();
        let config = InsertImage {
            path: dir.path().join("missing.png"),
            anchor: ImageAnchor::Floating,
            width: None,
            height: None,
        };
        let err = doc.insert_image(&paths, &config).expect_err("floating");
        assert!(err.is_not_supported());
    }
}
