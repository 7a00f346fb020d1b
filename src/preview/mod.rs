//! Sandboxed preview document rendering.
//!
//! Rendering is a pure function from a [`SourceBundle`] to a self-contained
//! HTML document string: style embedded inline in the head, markup as body
//! content, script as an inline executable script. The host assigns the
//! document wholesale to a sandboxed rendering surface (e.g. an iframe
//! `srcdoc`) carrying [`PreviewDocument::sandbox_attributes`], so that:
//! - the script executes in the document's own global scope, never the host's;
//! - errors and navigation inside the document never reach the host;
//! - every re-render fully replaces the previous document, leaving no residual
//!   DOM or global state between revisions.
//!
//! The document embeds the user's code directly, so rendering works offline
//! with no network fetch.

use crate::buffer::SourceBundle;

/// Sandbox attribute set the host must apply to the rendering surface.
///
/// `allow-scripts` without `allow-same-origin` gives the embedded script its
/// own opaque origin and global scope, isolated from the host application.
const SANDBOX_ATTRIBUTES: &str = "allow-scripts";

/// File name used for the standalone export
const EXPORT_FILE_NAME: &str = "index.html";

/// A fully rendered, self-contained preview document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    source: String,
}

impl PreviewDocument {
    /// The complete HTML document source
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Consume the document, yielding its source
    pub fn into_string(self) -> String {
        self.source
    }

    /// Sandbox attributes the host must apply to its rendering surface
    pub fn sandbox_attributes(&self) -> &'static str {
        SANDBOX_ATTRIBUTES
    }
}

/// A standalone export of the current project content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    /// Suggested download file name
    pub file_name: String,
    /// Complete HTML document contents
    pub contents: String,
}

/// Render a bundle into a sandboxed preview document.
///
/// Pure: no I/O, no retained state, and the input is never mutated. Calling
/// it twice with the same bundle yields identical documents.
pub fn render(bundle: &SourceBundle) -> PreviewDocument {
    PreviewDocument {
        source: document_source(bundle),
    }
}

/// Build a standalone HTML file from a bundle, suitable for download.
///
/// The contents are the same self-contained document used by the preview.
pub fn export_document(bundle: &SourceBundle) -> ExportFile {
    ExportFile {
        file_name: EXPORT_FILE_NAME.to_string(),
        contents: document_source(bundle),
    }
}

fn document_source(bundle: &SourceBundle) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Document</title>
<style>
{style}
</style>
</head>
<body>
{markup}
<script type="text/javascript">
{script}
</script>
</body>
</html>
"#,
        style = bundle.style,
        markup = bundle.markup,
        script = bundle.script,
    )
}
