//! What to do with a response once its headers have arrived.

use url::Url;

pub const PASSBOOK_MIME_TYPE: &str = "application/vnd.apple.pkpass";
const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub url: Option<Url>,
    pub mime_type: Option<String>,
    pub content_disposition: Option<String>,
    /// Whether the web view can render this MIME type itself.
    pub can_show_mime_type: bool,
    pub is_for_main_frame: bool,
}

impl NavigationResponse {
    pub fn new(url: Url, mime_type: &str) -> Self {
        Self {
            url: Some(url),
            mime_type: Some(mime_type.to_owned()),
            content_disposition: None,
            can_show_mime_type: true,
            is_for_main_frame: true,
        }
    }

    /// MIME type without parameters, lowercased.
    pub fn essence(&self) -> Option<String> {
        let mime = self.mime_type.as_deref()?;
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
    }

    pub fn is_attachment(&self) -> bool {
        self.content_disposition
            .as_deref()
            .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("attachment"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Passbook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    ShowInline,
    Download,
    HandOffToViewer(Viewer),
}

/// Decides between showing, downloading, or handing off a response.
pub fn resolve_response(response: &NavigationResponse, pending_download: bool) -> ResponseDisposition {
    let essence = response.essence();
    let forced_download = pending_download
        || response.is_attachment()
        || (response.content_disposition.is_none()
            && essence.as_deref() == Some(OCTET_STREAM_MIME_TYPE));

    if essence.as_deref() == Some(PASSBOOK_MIME_TYPE) && !forced_download {
        return ResponseDisposition::HandOffToViewer(Viewer::Passbook);
    }

    if forced_download || !response.can_show_mime_type {
        return ResponseDisposition::Download;
    }

    ResponseDisposition::ShowInline
}
