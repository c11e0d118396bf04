use scraper::html::Select;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Serialized content of one shadow root, keyed by a description of its host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowRootCapture {
    pub host: String,
    pub html: String,
    #[serde(default)]
    pub shadow_roots: Vec<ShadowRootCapture>,
}

/// Raw page content as returned by the browser driver: the main document plus
/// every nested frame and shadow root, each serialized on its own.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageCapture {
    pub url: String,
    pub html: String,
    #[serde(default)]
    pub frames: Vec<PageCapture>,
    #[serde(default)]
    pub shadow_roots: Vec<ShadowRootCapture>,
}

impl PageCapture {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            frames: Vec::new(),
            shadow_roots: Vec::new(),
        }
    }

    pub fn with_frame(mut self, frame: PageCapture) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_shadow_root(mut self, host: impl Into<String>, html: impl Into<String>) -> Self {
        self.shadow_roots.push(ShadowRootCapture {
            host: host.into(),
            html: html.into(),
            shadow_roots: Vec::new(),
        });
        self
    }

    /// Inline frames and shadow roots recursively into one markup string.
    pub fn flatten(&self) -> String {
        let mut out = String::with_capacity(self.html.len());
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut String) {
        out.push_str(&self.html);
        for shadow in &self.shadow_roots {
            flatten_shadow(shadow, out);
        }
        for frame in &self.frames {
            out.push_str("<div data-pagepilot-frame=\"");
            out.push_str(&escape_attr(&frame.url));
            out.push_str("\">");
            frame.flatten_into(out);
            out.push_str("</div>");
        }
    }
}

fn flatten_shadow(shadow: &ShadowRootCapture, out: &mut String) {
    out.push_str("<div data-pagepilot-shadow-host=\"");
    out.push_str(&escape_attr(&shadow.host));
    out.push_str("\">");
    out.push_str(&shadow.html);
    for nested in &shadow.shadow_roots {
        flatten_shadow(nested, out);
    }
    out.push_str("</div>");
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// One parsed tree covering the main document, frames and shadow content.
///
/// Taken once per classification and shared by every check so selector
/// results stay mutually consistent. Not `Send`; build and drop it between
/// await points.
pub struct FlattenedSnapshot {
    document: Html,
}

impl FlattenedSnapshot {
    pub fn from_capture(capture: &PageCapture) -> Self {
        Self::from_html(&capture.flatten())
    }

    pub fn from_html(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    pub fn select<'a, 'b>(&'a self, selector: &'b Selector) -> Select<'a, 'b> {
        self.document.select(selector)
    }
}

pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
