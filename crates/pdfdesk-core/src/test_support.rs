//! PDF fixtures for tests
//!
//! Builds small, fully valid documents with lopdf so tests never depend on
//! files checked into the repository.

use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Create a PDF with `num_pages` Letter pages, page N showing the text "Page N"
pub fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    PdfBuilder::new().text_pages(num_pages).build()
}

/// Like [`create_test_pdf`], with the page text prefixed by `label`
/// (page N of label "A" shows "A-Page N")
pub fn create_labelled_pdf(num_pages: u32, label: &str) -> Vec<u8> {
    PdfBuilder::new().label(label).text_pages(num_pages).build()
}

/// Image XObject fixtures
#[derive(Debug, Clone, Copy)]
pub enum ImageFixture {
    /// Uncompressed 8-bit DeviceRGB samples
    RawRgb { width: u32, height: u32 },
    /// Flate-compressed 8-bit DeviceGray samples
    FlateGray { width: u32, height: u32 },
    /// Baseline JPEG (DCTDecode)
    Jpeg { width: u32, height: u32 },
    /// DeviceCMYK samples, which extraction does not decode
    Cmyk { width: u32, height: u32 },
    /// An RGB image drawn through a form XObject
    InForm { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
enum PageSpec {
    Text { size: (i64, i64), rotate: Option<i64> },
    Image(ImageFixture),
    Bulky { repeats: usize },
    Shown {
        encoding: Option<String>,
        operator: &'static str,
        operand: Object,
    },
}

/// Builder for multi-page fixture documents
#[derive(Debug, Clone, Default)]
pub struct PdfBuilder {
    label: String,
    pages: Vec<PageSpec>,
    title: Option<String>,
    nested: Option<(u32, i64)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for the text shown on text pages
    pub fn label(mut self, label: &str) -> Self {
        self.label = format!("{}-", label);
        self
    }

    pub fn text_pages(mut self, count: u32) -> Self {
        for _ in 0..count {
            self.pages.push(PageSpec::Text {
                size: (612, 792),
                rotate: None,
            });
        }
        self
    }

    pub fn page_with_size(mut self, width: i64, height: i64) -> Self {
        self.pages.push(PageSpec::Text {
            size: (width, height),
            rotate: None,
        });
        self
    }

    pub fn rotated_page(mut self, rotate: i64) -> Self {
        self.pages.push(PageSpec::Text {
            size: (612, 792),
            rotate: Some(rotate),
        });
        self
    }

    pub fn image_page(mut self, fixture: ImageFixture) -> Self {
        self.pages.push(PageSpec::Image(fixture));
        self
    }

    /// A page with a large, highly repetitive uncompressed content stream
    pub fn bulky_page(mut self, repeats: usize) -> Self {
        self.pages.push(PageSpec::Bulky { repeats });
        self
    }

    /// A page drawing `operand` with `operator` ("Tj" or "TJ") in a
    /// Helvetica font declaring `encoding`
    pub fn shown_text_page(mut self, encoding: Option<&str>, operator: &'static str, operand: Object) -> Self {
        self.pages.push(PageSpec::Shown {
            encoding: encoding.map(str::to_string),
            operator,
            operand,
        });
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Build a two-level page tree of `count` pages whose MediaBox (A4),
    /// Resources and Rotate live on the root Pages node only. Replaces any
    /// other pages added to the builder.
    pub fn inherited_attributes(mut self, count: u32, rotate: i64) -> Self {
        self.nested = Some((count, rotate));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let kids = match self.nested {
            Some((count, rotate)) => {
                let mid_id = doc.new_object_id();
                let mut page_refs = Vec::new();
                for n in 1..=count {
                    let content_id = add_text_content(&mut doc, &format!("{}Page {}", self.label, n));
                    let page_id = doc.add_object(dictionary! {
                        "Type" => "Page",
                        "Parent" => mid_id,
                        "Contents" => content_id,
                    });
                    page_refs.push(Object::Reference(page_id));
                }
                doc.objects.insert(
                    mid_id,
                    Object::Dictionary(dictionary! {
                        "Type" => "Pages",
                        "Parent" => pages_id,
                        "Kids" => page_refs,
                        "Count" => count as i64,
                    }),
                );

                let mut root = Dictionary::new();
                root.set("MediaBox", media_box(595, 842));
                root.set("Rotate", rotate);
                root.set("Resources", font_resources(font_id));
                (vec![Object::Reference(mid_id)], count as i64, root)
            }
            None => {
                let mut page_refs = Vec::new();
                for (index, spec) in self.pages.iter().enumerate() {
                    let page_id = add_page(&mut doc, pages_id, font_id, &self.label, index + 1, spec);
                    page_refs.push(Object::Reference(page_id));
                }
                let count = page_refs.len() as i64;
                (page_refs, count, Dictionary::new())
            }
        };

        let (kids, count, mut pages_dict) = kids;
        pages_dict.set("Type", "Pages");
        pages_dict.set("Kids", kids);
        pages_dict.set("Count", count);
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if let Some(title) = self.title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}

fn media_box(width: i64, height: i64) -> Object {
    Object::Array(vec![0.into(), 0.into(), width.into(), height.into()])
}

fn font_resources(font_id: ObjectId) -> Dictionary {
    dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    }
}

fn add_text_content(doc: &mut Document, text: &str) -> ObjectId {
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()))
}

fn add_page(
    doc: &mut Document,
    parent: ObjectId,
    font_id: ObjectId,
    label: &str,
    page_num: usize,
    spec: &PageSpec,
) -> ObjectId {
    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => parent,
    };

    match spec {
        PageSpec::Text { size, rotate } => {
            let content_id = add_text_content(doc, &format!("{}Page {}", label, page_num));
            page.set("Contents", content_id);
            page.set("MediaBox", media_box(size.0, size.1));
            page.set("Resources", font_resources(font_id));
            if let Some(rotate) = rotate {
                page.set("Rotate", *rotate);
            }
        }
        PageSpec::Bulky { repeats } => {
            let mut content = String::from("0.5 g\n");
            for i in 0..*repeats {
                content.push_str(&format!("{} {} 10 10 re f\n", (i % 50) * 10, (i / 50 % 70) * 10));
            }
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            page.set("Contents", content_id);
            page.set("MediaBox", media_box(612, 792));
            page.set("Resources", font_resources(font_id));
        }
        PageSpec::Shown {
            encoding,
            operator,
            operand,
        } => {
            let mut font = dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            };
            if let Some(encoding) = encoding {
                font.set("Encoding", Object::Name(encoding.as_bytes().to_vec()));
            }
            let font_id = doc.add_object(font);
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new(operator, vec![operand.clone()]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            page.set("Contents", content_id);
            page.set("MediaBox", media_box(612, 792));
            page.set("Resources", font_resources(font_id));
        }
        PageSpec::Image(fixture) => {
            let (name, xobject_id, width, height) = add_image_fixture(doc, *fixture);
            let draw = format!("q {} 0 0 {} 0 0 cm /{} Do Q", width, height, name);
            let content_id = doc.add_object(Stream::new(Dictionary::new(), draw.into_bytes()));
            page.set("Contents", content_id);
            page.set("MediaBox", media_box(width as i64, height as i64));
            page.set(
                "Resources",
                dictionary! {
                    "XObject" => dictionary! { name => xobject_id },
                },
            );
        }
    }

    doc.add_object(page)
}

/// Returns the resource name, the XObject id and its drawn size
fn add_image_fixture(doc: &mut Document, fixture: ImageFixture) -> (&'static str, ObjectId, u32, u32) {
    match fixture {
        ImageFixture::RawRgb { width, height } => {
            let id = doc.add_object(image_stream(width, height, "DeviceRGB", rgb_samples(width, height), None));
            ("Im1", id, width, height)
        }
        ImageFixture::FlateGray { width, height } => {
            let samples: Vec<u8> = (0..width * height).map(|i| (i % 256) as u8).collect();
            let compressed = deflate(&samples);
            let id = doc.add_object(image_stream(width, height, "DeviceGray", compressed, Some("FlateDecode")));
            ("Im1", id, width, height)
        }
        ImageFixture::Jpeg { width, height } => {
            let mut jpeg = Vec::new();
            JpegEncoder::new(&mut jpeg)
                .write_image(&rgb_samples(width, height), width, height, ExtendedColorType::Rgb8)
                .unwrap();
            let id = doc.add_object(image_stream(width, height, "DeviceRGB", jpeg, Some("DCTDecode")));
            ("Im1", id, width, height)
        }
        ImageFixture::Cmyk { width, height } => {
            let samples = vec![0x40; (width * height * 4) as usize];
            let id = doc.add_object(image_stream(width, height, "DeviceCMYK", samples, None));
            ("Im1", id, width, height)
        }
        ImageFixture::InForm { width, height } => {
            let image_id = doc.add_object(image_stream(width, height, "DeviceRGB", rgb_samples(width, height), None));
            let form = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => media_box(width as i64, height as i64),
                    "Resources" => dictionary! {
                        "XObject" => dictionary! { "Im1" => image_id },
                    },
                },
                format!("q {} 0 0 {} 0 0 cm /Im1 Do Q", width, height).into_bytes(),
            );
            let form_id = doc.add_object(form);
            ("Fm1", form_id, width, height)
        }
    }
}

fn image_stream(width: u32, height: u32, color_space: &str, data: Vec<u8>, filter: Option<&str>) -> Stream {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => 8,
    };
    if let Some(filter) = filter {
        dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    }
    Stream::new(dict, data).with_compression(false)
}

fn rgb_samples(width: u32, height: u32) -> Vec<u8> {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            samples.extend_from_slice(&[(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128]);
        }
    }
    samples
}

fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
