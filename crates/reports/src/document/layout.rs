use super::font;

/// Page geometry and typography for the PDF report. Vertical positions are
/// measured from the top edge of the page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub row_height: f32,
    /// A row is moved to a new page when the cursor is past this line.
    pub page_break_y: f32,
    /// A light rule follows every n-th row of the document.
    pub separator_every: usize,
    pub body_font_size: f32,
    pub title_font_size: f32,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_width: 612.0,
            page_height: 792.0,
            margin: 50.0,
            row_height: 20.0,
            page_break_y: 700.0,
            separator_every: 5,
            body_font_size: 10.0,
            title_font_size: 18.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid page layout: {0}")]
pub struct LayoutError(&'static str);

const HOURS_COLUMN_OFFSET: f32 = 90.0;
const DESCRIPTION_COLUMN_OFFSET: f32 = 150.0;
const TITLE_GAP: f32 = 30.0;
const LINE_GAP: f32 = 15.0;
const HEADER_RULE_GAP: f32 = 10.0;
/// Vertical space taken by the column header and its rule.
const COLUMN_HEADER_HEIGHT: f32 = LINE_GAP + HEADER_RULE_GAP;
const MISSING_DESCRIPTION: &str = "-";

impl PageLayout {
    pub fn validate(&self) -> Result<(), LayoutError> {
        let positive = [
            self.page_width,
            self.page_height,
            self.row_height,
            self.body_font_size,
            self.title_font_size,
        ];
        if positive.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(LayoutError("dimensions and font sizes must be positive"));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(LayoutError("margin must not be negative"));
        }
        if self.page_width <= 2.0 * self.margin + DESCRIPTION_COLUMN_OFFSET {
            return Err(LayoutError("page is too narrow for the table columns"));
        }
        if !self.page_break_y.is_finite()
            || self.page_break_y < self.margin + COLUMN_HEADER_HEIGHT + self.row_height
        {
            return Err(LayoutError("page break must leave room for one row"));
        }
        if self.page_break_y + self.row_height > self.page_height - self.margin {
            return Err(LayoutError("rows past the page break would cross the bottom margin"));
        }
        if self.separator_every == 0 {
            return Err(LayoutError("separator interval must be at least 1"));
        }
        Ok(())
    }

    fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    fn description_width(&self) -> f32 {
        self.content_width() - DESCRIPTION_COLUMN_OFFSET
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        width: f32,
        gray: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub date: String,
    pub hours: String,
    pub description: Option<String>,
}

/// Lays out the document one row at a time so pages can be emitted as soon
/// as they are complete.
pub struct Paginator {
    layout: PageLayout,
    cursor: f32,
    rendered: usize,
    page: Page,
}

impl Paginator {
    /// Starts the first page with the title, statistics and table header.
    pub fn new(layout: PageLayout, title: &str, stats: &[String]) -> Self {
        let mut paginator = Self {
            layout,
            cursor: layout.margin,
            rendered: 0,
            page: Page::default(),
        };
        paginator.preamble(title, stats);
        paginator
    }

    fn preamble(&mut self, title: &str, stats: &[String]) {
        let layout = self.layout;
        let title = font::fit_to_width(title, layout.title_font_size, layout.content_width());
        let title_width = font::text_width(&title, layout.title_font_size);
        self.text(
            (layout.page_width - title_width) / 2.0,
            layout.title_font_size,
            title,
        );
        self.cursor += TITLE_GAP;

        for line in stats {
            self.text(layout.margin, layout.body_font_size, line.clone());
            self.cursor += LINE_GAP;
        }
        self.cursor += LINE_GAP;
        self.column_header();
    }

    /// Column titles and the rule under them. Starts every page's table.
    fn column_header(&mut self) {
        let layout = self.layout;
        let size = layout.body_font_size;
        self.text(layout.margin, size, "Date".to_string());
        self.text(layout.margin + HOURS_COLUMN_OFFSET, size, "Hours".to_string());
        self.text(
            layout.margin + DESCRIPTION_COLUMN_OFFSET,
            size,
            "Description".to_string(),
        );
        self.cursor += LINE_GAP;
        self.rule(1.0, 0.0);
        self.cursor += HEADER_RULE_GAP;
    }

    /// Places one row. Returns the previous page when the row had to start a
    /// new one; the new page opens with the column header.
    pub fn push_row(&mut self, row: &TableRow) -> Option<Page> {
        let finished = if self.cursor > self.layout.page_break_y {
            self.cursor = self.layout.margin;
            let finished = std::mem::take(&mut self.page);
            self.column_header();
            Some(finished)
        } else {
            None
        };

        let layout = self.layout;
        let size = layout.body_font_size;
        let description = match row.description.as_deref() {
            Some(text) if !text.is_empty() => {
                font::fit_to_width(text, size, layout.description_width())
            }
            _ => MISSING_DESCRIPTION.to_string(),
        };
        self.text(layout.margin, size, row.date.clone());
        self.text(layout.margin + HOURS_COLUMN_OFFSET, size, row.hours.clone());
        self.text(layout.margin + DESCRIPTION_COLUMN_OFFSET, size, description);
        self.page.rows += 1;
        self.rendered += 1;
        self.cursor += layout.row_height;

        // Decorative only; the next row does its own break check.
        if self.rendered % layout.separator_every == 0 {
            self.cursor -= layout.row_height / 4.0;
            self.rule(0.5, 0.75);
            self.cursor += layout.row_height / 4.0;
        }

        finished
    }

    pub fn finish(self) -> Page {
        self.page
    }

    fn text(&mut self, x: f32, size: f32, text: String) {
        self.page.ops.push(DrawOp::Text {
            x,
            y: self.cursor,
            size,
            text,
        });
    }

    fn rule(&mut self, width: f32, gray: f32) {
        self.page.ops.push(DrawOp::Rule {
            x1: self.layout.margin,
            x2: self.layout.page_width - self.layout.margin,
            y: self.cursor,
            width,
            gray,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<TableRow> {
        (0..n)
            .map(|i| TableRow {
                date: format!("2024-01-{:02}", i % 28 + 1),
                hours: "1.00".to_string(),
                description: (i % 3 != 0).then(|| format!("task {i}")),
            })
            .collect()
    }

    fn paginate(layout: PageLayout, n: usize) -> Vec<Page> {
        let stats = vec!["Total Hours: 1.00".to_string()];
        let mut paginator = Paginator::new(layout, "Time Report: Acme", &stats);
        let mut pages = Vec::new();
        for row in rows(n) {
            pages.extend(paginator.push_row(&row));
        }
        pages.push(paginator.finish());
        pages
    }

    fn rules(page: &Page) -> usize {
        page.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Rule { .. }))
            .count()
    }

    #[test]
    fn default_layout_is_valid() {
        assert_eq!(PageLayout::default().validate(), Ok(()));
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        let base = PageLayout::default();
        let cases = [
            PageLayout {
                separator_every: 0,
                ..base
            },
            PageLayout {
                page_break_y: 730.0,
                ..base
            },
            PageLayout {
                page_break_y: 40.0,
                ..base
            },
            PageLayout {
                row_height: 0.0,
                ..base
            },
            PageLayout {
                page_width: 200.0,
                ..base
            },
        ];
        for layout in cases {
            assert!(layout.validate().is_err(), "{layout:?} should be rejected");
        }
    }

    #[test]
    fn short_report_fits_one_page() {
        let pages = paginate(PageLayout::default(), 3);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].rows, 3);
    }

    #[test]
    fn zero_rows_still_produce_a_page() {
        let pages = paginate(PageLayout::default(), 0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].rows, 0);
        assert_eq!(rules(&pages[0]), 1, "header rule only");
    }

    #[test]
    fn crossing_the_threshold_starts_new_pages_without_losing_rows() {
        let layout = PageLayout::default();
        let pages = paginate(layout, 120);

        assert!(pages.len() > 1);
        assert_eq!(pages.iter().map(|p| p.rows).sum::<usize>(), 120);

        for page in &pages {
            for op in &page.ops {
                if let DrawOp::Text { y, .. } = op {
                    assert!(*y <= layout.page_break_y, "text placed at {y}");
                    assert!(*y + layout.row_height <= layout.page_height - layout.margin);
                }
            }
        }
        for page in &pages[1..] {
            let first_y = page.ops.iter().find_map(|op| match op {
                DrawOp::Text { y, .. } => Some(*y),
                _ => None,
            });
            assert_eq!(first_y, Some(layout.margin));
        }
    }

    #[test]
    fn separators_never_open_empty_pages() {
        for n in 1..=90 {
            let pages = paginate(PageLayout::default(), n);
            for page in &pages[1..] {
                assert!(page.rows > 0, "{n} rows produced an empty trailing page");
            }
        }
    }

    #[test]
    fn separator_follows_every_fifth_row_document_wide() {
        let pages = paginate(PageLayout::default(), 60);
        // One header rule per page, the rest are separators.
        let separators = pages.iter().map(rules).sum::<usize>() - pages.len();
        assert_eq!(separators, 12);
    }

    #[test]
    fn every_page_repeats_the_column_header() {
        let layout = PageLayout::default();
        let pages = paginate(layout, 120);
        assert!(pages.len() > 1);

        for page in &pages[1..] {
            let header = page
                .ops
                .iter()
                .filter_map(|op| match op {
                    DrawOp::Text { y, text, .. } if *y == layout.margin => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>();
            assert_eq!(header, ["Date", "Hours", "Description"]);
            assert!(matches!(
                page.ops.get(3),
                Some(DrawOp::Rule { y, .. }) if *y == layout.margin + LINE_GAP
            ));
        }
    }

    #[test]
    fn missing_description_renders_dash() {
        let mut paginator = Paginator::new(PageLayout::default(), "t", &[]);
        paginator.push_row(&TableRow {
            date: "2024-01-17".to_string(),
            hours: "4.00".to_string(),
            description: None,
        });
        let page = paginator.finish();

        let last = page.ops.last().cloned();
        assert!(matches!(last, Some(DrawOp::Text { text, .. }) if text == "-"));
    }
}
