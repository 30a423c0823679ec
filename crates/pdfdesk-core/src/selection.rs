//! Page expression parsing
//!
//! Turns user-entered expressions like "1-3, 5, 8-10" or "all" into a
//! [`PageSelection`], and strict comma lists like "3,1,2" into a [`PageOrder`].
//! Page numbers are 1-indexed everywhere in this module.

use crate::error::PdfDeskError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use tracing::debug;

/// Deduplicated, ascending set of pages validated against one document's page count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSelection {
    pages: Vec<u32>,
    page_count: u32,
}

impl PageSelection {
    /// Every page of a document with `page_count` pages
    pub fn all(page_count: u32) -> Result<Self, PdfDeskError> {
        if page_count == 0 {
            return Err(selection_error(page_count));
        }
        Ok(Self {
            pages: (1..=page_count).collect(),
            page_count,
        })
    }

    /// Build a selection from explicit page numbers, rejecting any out-of-range page
    pub fn from_pages<I>(pages: I, page_count: u32) -> Result<Self, PdfDeskError>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut set = BTreeSet::new();
        for page in pages {
            if page == 0 || page > page_count {
                return Err(PdfDeskError::Validation(format!(
                    "Page {} is out of range (1-{})",
                    page, page_count
                )));
            }
            set.insert(page);
        }
        if set.is_empty() {
            return Err(selection_error(page_count));
        }
        Ok(Self {
            pages: set.into_iter().collect(),
            page_count,
        })
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    /// Page count of the document this selection was validated against
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always false for a constructed selection; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.binary_search(&page).is_ok()
    }

    /// True when every page of the document is selected
    pub fn covers_all(&self) -> bool {
        self.pages.len() == self.page_count as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    /// Selections are only meaningful for the document they were parsed against
    pub(crate) fn ensure_matches(&self, page_count: u32) -> Result<(), PdfDeskError> {
        if self.page_count != page_count {
            return Err(PdfDeskError::Validation(format!(
                "Page selection was made for a {}-page document, but this document has {} pages",
                self.page_count, page_count
            )));
        }
        Ok(())
    }
}

/// Explicit output ordering: a permutation of `1..=page_count`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageOrder {
    order: Vec<u32>,
}

impl PageOrder {
    pub fn identity(page_count: u32) -> Self {
        Self {
            order: (1..=page_count).collect(),
        }
    }

    pub fn pages(&self) -> &[u32] {
        &self.order
    }

    pub fn page_count(&self) -> u32 {
        self.order.len() as u32
    }

    pub fn is_identity(&self) -> bool {
        self.order.iter().zip(1..).all(|(&page, expected)| page == expected)
    }
}

/// Parse a page expression like "1-3, 5, 8-10" or "all" into a validated selection
///
/// Tokens that are not numbers, reversed ranges, and pages outside
/// `1..=page_count` are dropped individually. The expression fails only when
/// it is blank or nothing valid remains.
pub fn parse_page_selection(
    expression: &str,
    page_count: u32,
) -> Result<PageSelection, PdfDeskError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(PdfDeskError::Parse("Page input cannot be empty".into()));
    }

    let mut pages = BTreeSet::new();

    if expression.eq_ignore_ascii_case("all") {
        pages.extend(1..=page_count);
    } else {
        for token in expression.split(',') {
            match parse_token(token, page_count) {
                Some(range) => pages.extend(range),
                None => debug!(token = token.trim(), page_count, "Dropping page token"),
            }
        }
    }

    if pages.is_empty() {
        return Err(selection_error(page_count));
    }

    Ok(PageSelection {
        pages: pages.into_iter().collect(),
        page_count,
    })
}

/// A single page or an `a-b` range; `None` when the token contributes nothing
fn parse_token(token: &str, page_count: u32) -> Option<RangeInclusive<u32>> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let (start, end) = match token.split_once('-') {
        Some((start, end)) => (
            start.trim().parse::<u32>().ok()?,
            end.trim().parse::<u32>().ok()?,
        ),
        None => {
            let page = token.parse::<u32>().ok()?;
            (page, page)
        }
    };

    (start >= 1 && start <= end && end <= page_count).then_some(start..=end)
}

/// Parse a strict reorder expression like "3,1,2"
///
/// Only bare page numbers are accepted, and they must name every page of the
/// document exactly once.
pub fn parse_page_order(expression: &str, page_count: u32) -> Result<PageOrder, PdfDeskError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(PdfDeskError::Parse("Page order cannot be empty".into()));
    }

    let order = expression
        .split(',')
        .map(|token| {
            let token = token.trim();
            token.parse::<u32>().map_err(|_| {
                PdfDeskError::Parse(format!(
                    "'{}' is not a page number. Enter page numbers separated by commas (e.g. 3,1,2)",
                    token
                ))
            })
        })
        .collect::<Result<Vec<u32>, _>>()?;

    if order.len() != page_count as usize {
        return Err(PdfDeskError::Validation(format!(
            "You must specify exactly {} page numbers, got {}",
            page_count,
            order.len()
        )));
    }

    let mut seen = vec![false; page_count as usize];
    for &page in &order {
        if page == 0 || page > page_count {
            return Err(PdfDeskError::Validation(format!(
                "Page {} is out of range (1-{})",
                page, page_count
            )));
        }
        let slot = &mut seen[(page - 1) as usize];
        if *slot {
            return Err(PdfDeskError::Validation(format!(
                "Page {} appears more than once; use each page from 1 to {} exactly once",
                page, page_count
            )));
        }
        *slot = true;
    }

    Ok(PageOrder { order })
}

fn selection_error(page_count: u32) -> PdfDeskError {
    PdfDeskError::Validation(format!(
        "Invalid page format. Use numbers (1,3,5), ranges (1-5) or 'all', between 1 and {}",
        page_count
    ))
}
