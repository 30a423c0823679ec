//! Page rotation
//!
//! Rotation only rewrites each affected page's `/Rotate` entry; content
//! streams are untouched.

use crate::document::{page_rotation, Document};
use crate::error::PdfDeskError;
use crate::selection::PageSelection;
use lopdf::Object;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Clockwise rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RotationAngle {
    #[serde(rename = "90")]
    Quarter,
    #[serde(rename = "180")]
    Half,
    #[serde(rename = "270")]
    ThreeQuarters,
}

impl RotationAngle {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Quarter => 90,
            Self::Half => 180,
            Self::ThreeQuarters => 270,
        }
    }
}

impl TryFrom<u16> for RotationAngle {
    type Error = PdfDeskError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            90 => Ok(Self::Quarter),
            180 => Ok(Self::Half),
            270 => Ok(Self::ThreeQuarters),
            other => Err(PdfDeskError::Validation(format!(
                "Rotation must be 90, 180 or 270 degrees, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RotationAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Which pages a rotation applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RotationScope {
    AllPages,
    Pages(PageSelection),
}

/// Rotate the pages in `scope` clockwise by `angle`, on top of any existing rotation
pub fn rotate_pages(
    document: &Document,
    scope: &RotationScope,
    angle: RotationAngle,
) -> Result<Document, PdfDeskError> {
    if let RotationScope::Pages(selection) = scope {
        selection.ensure_matches(document.page_count())?;
    }

    let mut doc = document.inner().clone();
    let mut rotated = 0;

    for (page_num, page_id) in doc.get_pages() {
        let selected = match scope {
            RotationScope::AllPages => true,
            RotationScope::Pages(selection) => selection.contains(page_num),
        };
        if !selected {
            continue;
        }

        let rotation = (page_rotation(&doc, page_id) + angle.degrees()) % 360;
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| PdfDeskError::Write(format!("Page {} is not a dictionary: {}", page_num, e)))?
            .set("Rotate", rotation as i64);
        rotated += 1;
    }

    info!(pages = rotated, degrees = angle.degrees(), "Rotated pages");
    Ok(Document::from_inner(doc))
}
